use crate::event::AppEvent;
use crate::project::{GeneratedComponent, GithubConfig};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::mpsc;
use thiserror::Error;
use tokio::runtime::Handle;

const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    #[error("GitHub settings are incomplete")]
    MissingConfig,
    #[error("GitHub request failed: {0}")]
    Transport(String),
    #[error("GitHub rejected the upload: {0}")]
    Rejected(String),
}

/// One entry from the user's repository listing, enough to fill the
/// settings picker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepoSummary {
    pub name: String,
    pub full_name: String,
    pub owner: RepoOwner,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RepoOwner {
    pub login: String,
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub config: GithubConfig,
    pub artifact: GeneratedComponent,
}

pub fn contents_url(config: &GithubConfig) -> String {
    format!(
        "{API_BASE}/repos/{}/{}/contents/{}",
        config.owner, config.repo, config.path
    )
}

pub fn commit_message(config: &GithubConfig, artifact: &GeneratedComponent) -> String {
    if config.commit_message.trim().is_empty() {
        format!("Add v{} of component", artifact.version)
    } else {
        config.commit_message.clone()
    }
}

/// File-upsert body: base64 content, commit message, target branch.
pub fn upload_body(config: &GithubConfig, artifact: &GeneratedComponent) -> Value {
    json!({
        "message": commit_message(config, artifact),
        "content": STANDARD.encode(artifact.code.as_bytes()),
        "branch": config.branch,
    })
}

async fn publish_once(
    http: &reqwest::Client,
    request: &PublishRequest,
) -> Result<(), ExportError> {
    if !request.config.is_ready() {
        return Err(ExportError::MissingConfig);
    }

    let response = http
        .put(contents_url(&request.config))
        .header("Authorization", format!("token {}", request.config.token))
        .header("User-Agent", "maquette")
        .json(&upload_body(&request.config, &request.artifact))
        .send()
        .await
        .map_err(|err| ExportError::Transport(err.to_string()))?;

    if response.status().is_success() {
        Ok(())
    } else {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        Err(ExportError::Rejected(format!("{status}: {detail}")))
    }
}

/// Convenience lookup for the settings modal; failures degrade to an
/// empty list.
async fn list_repos_once(http: &reqwest::Client, token: &str) -> Vec<RepoSummary> {
    let response = match http
        .get(format!("{API_BASE}/user/repos?sort=updated&per_page=100"))
        .header("Authorization", format!("token {token}"))
        .header("User-Agent", "maquette")
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "repo listing failed");
            return Vec::new();
        }
    };

    if !response.status().is_success() {
        tracing::debug!(status = %response.status(), "repo listing rejected");
        return Vec::new();
    }

    response.json().await.unwrap_or_default()
}

/// GitHub client mirroring the generation client's dispatch shape:
/// spawn on the shared runtime, report back over the app event channel.
#[derive(Clone)]
pub struct GithubExporter {
    http: reqwest::Client,
    tx: mpsc::Sender<AppEvent>,
    runtime: Handle,
}

impl GithubExporter {
    pub fn new(runtime: Handle, tx: mpsc::Sender<AppEvent>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tx,
            runtime,
        }
    }

    pub fn request_publish(&self, request: PublishRequest) {
        let tx = self.tx.clone();
        let http = self.http.clone();
        self.runtime.spawn(async move {
            let result = publish_once(&http, &request).await;
            let _ = tx.send(AppEvent::ExportFinished { result });
        });
    }

    pub fn request_repo_list(&self, token: String) {
        let tx = self.tx.clone();
        let http = self.http.clone();
        self.runtime.spawn(async move {
            let repos = list_repos_once(&http, &token).await;
            let _ = tx.send(AppEvent::ReposListed { repos });
        });
    }
}
