use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prompts longer than this are truncated when deriving a project name.
pub const PROMPT_TITLE_LIMIT: usize = 30;
pub const UNTITLED_NAME: &str = "Untitled Project";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn fresh_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One conversation entry. Append-only once pushed onto a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: now_ms(),
            image,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: now_ms(),
            image: None,
        }
    }
}

/// One generated component version. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedComponent {
    pub id: String,
    pub prompt: String,
    pub code: String,
    pub description: String,
    pub version: u32,
    pub timestamp: i64,
}

/// A persisted bundle of conversation, version history, and the pointer to
/// the currently selected version. `current_index` is `None` until the
/// first artifact lands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub last_modified: i64,
    #[serde(default)]
    pub history: Vec<GeneratedComponent>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub current_index: Option<usize>,
}

impl Project {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: UNTITLED_NAME.to_string(),
            last_modified: now_ms(),
            history: Vec::new(),
            messages: Vec::new(),
            current_index: None,
        }
    }

    /// Version number the next artifact will carry.
    pub fn next_version(&self) -> u32 {
        self.history.len() as u32 + 1
    }

    pub fn current(&self) -> Option<&GeneratedComponent> {
        self.current_index.and_then(|idx| self.history.get(idx))
    }

    /// Display name derived from the latest artifact's prompt. Pure; the
    /// stored `name` field is only ever the cached result of this.
    pub fn display_name(&self) -> String {
        let Some(latest) = self.history.last() else {
            return UNTITLED_NAME.to_string();
        };
        let mut name: String = latest.prompt.chars().take(PROMPT_TITLE_LIMIT).collect();
        if latest.prompt.chars().count() > PROMPT_TITLE_LIMIT {
            name.push_str("...");
        }
        name
    }

    /// Recompute derived fields. Called at the persistence choke point,
    /// never piecemeal.
    pub fn refresh_derived(&mut self, now: i64) {
        self.name = self.display_name();
        self.last_modified = now;
    }
}

/// GitHub export settings. Persisted separately from projects, not
/// versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub path: String,
    pub commit_message: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            path: "components/generated_ui.json".to_string(),
            commit_message: "feat: add generated component".to_string(),
        }
    }
}

impl GithubConfig {
    /// Token and repository are the minimum needed to attempt an upload.
    pub fn is_ready(&self) -> bool {
        !self.token.trim().is_empty() && !self.repo.trim().is_empty()
    }
}
