use crate::event::AppEvent;
use crate::export::github::PublishRequest;
use crate::gen::{GenerationRequest, SuggestionRequest, MAX_SUGGESTIONS};
use crate::project::{fresh_id, now_ms, GeneratedComponent, GithubConfig, Message, Project};
use crate::store::{Store, ACTIVE_PROJECT_KEY, GITHUB_CONFIG_KEY, PROJECTS_KEY};
use std::time::{Duration, Instant};

/// Cosmetic phase labels rotated while a generation is in flight. They
/// carry no semantic state.
pub const GENERATION_PHASES: [&str; 4] = [
    "Reading the brief...",
    "Choosing components...",
    "Laying out the structure...",
    "Polishing spacing and tone...",
];
pub const PHASE_ROTATION: Duration = Duration::from_millis(2500);
pub const EXPORT_LABEL: &str = "Syncing to GitHub...";

#[derive(Debug, Clone, PartialEq)]
pub enum AppStatus {
    Idle,
    Generating,
    Exporting,
    Error(String),
}

/// Drives the rotating progress label. Purely presentational; must be
/// stopped on every exit from Generating so no periodic activity leaks.
#[derive(Debug, Default)]
pub struct ProgressTicker {
    started: Option<Instant>,
}

impl ProgressTicker {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        self.started = None;
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    pub fn label(&self) -> Option<&'static str> {
        let started = self.started?;
        let index = (started.elapsed().as_millis() / PHASE_ROTATION.as_millis()) as usize
            % GENERATION_PHASES.len();
        Some(GENERATION_PHASES[index])
    }
}

/// Outcome of asking to start a GitHub export.
#[derive(Debug, Clone)]
pub enum ExportStart {
    /// Another operation is running; try again later.
    Busy,
    /// Token, repository, or a selected artifact is missing; the UI
    /// should open the settings modal instead.
    NeedsConfig,
    Request(PublishRequest),
}

#[derive(Debug, Clone)]
struct Inflight {
    project_id: String,
    prompt: String,
}

/// The session orchestrator: owns all tracked state, the status machine,
/// and the single persistence choke point. Network work happens
/// elsewhere; this type only hands out request payloads and consumes
/// completion events, which keeps the whole machine testable against a
/// temp-dir store and hand-made events.
pub struct Workbench {
    store: Store,
    projects: Vec<Project>,
    active: Project,
    github: GithubConfig,
    status: AppStatus,
    ticker: ProgressTicker,
    suggestions: Vec<String>,
    inflight: Option<Inflight>,
    notes: Vec<String>,
}

impl Workbench {
    pub fn new(store: Store) -> Self {
        let projects: Vec<Project> = store.load(PROJECTS_KEY, Vec::new());
        let github = store.load(GITHUB_CONFIG_KEY, GithubConfig::default());
        let stored_id = store.load_raw(ACTIVE_PROJECT_KEY, "");
        let active_id = if stored_id.is_empty() {
            fresh_id()
        } else {
            stored_id
        };
        let active = projects
            .iter()
            .find(|project| project.id == active_id)
            .cloned()
            .unwrap_or_else(|| Project::new(active_id));

        let mut bench = Self {
            store,
            projects,
            active,
            github,
            status: AppStatus::Idle,
            ticker: ProgressTicker::default(),
            suggestions: Vec::new(),
            inflight: None,
            notes: Vec::new(),
        };
        bench.save_active_id();
        bench
    }

    pub fn active(&self) -> &Project {
        &self.active
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn status(&self) -> &AppStatus {
        &self.status
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn github(&self) -> &GithubConfig {
        &self.github
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.status, AppStatus::Generating | AppStatus::Exporting)
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker.is_running()
    }

    /// Label for the busy overlay, if any operation is running.
    pub fn progress_label(&self) -> Option<&'static str> {
        match self.status {
            AppStatus::Generating => self.ticker.label(),
            AppStatus::Exporting => Some(EXPORT_LABEL),
            _ => None,
        }
    }

    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.notes.push(format!("[{}] {message}", now_ms()));
    }

    /// The Error status is dismissed by the next user action.
    fn clear_error(&mut self) {
        if matches!(self.status, AppStatus::Error(_)) {
            self.status = AppStatus::Idle;
        }
    }

    /// Append the user message, enter Generating, and hand back the
    /// request to dispatch. The message lands (and persists) before any
    /// network round trip; the returned history snapshot excludes it.
    pub fn send_message(&mut self, text: &str, image: Option<String>) -> Option<GenerationRequest> {
        self.clear_error();
        if self.is_busy() {
            return None;
        }
        let prompt = text.trim().to_string();
        if prompt.is_empty() {
            return None;
        }

        let history = self.active.messages.clone();
        self.active
            .messages
            .push(Message::user(prompt.clone(), image.clone()));
        self.persist();

        self.suggestions.clear();
        self.status = AppStatus::Generating;
        self.ticker.start();
        self.inflight = Some(Inflight {
            project_id: self.active.id.clone(),
            prompt: prompt.clone(),
        });

        Some(GenerationRequest {
            project_id: self.active.id.clone(),
            prompt,
            history,
            image,
        })
    }

    /// Consume a completion event. Returns a follow-up suggestion request
    /// after a successful generation; fetching it never gates the Idle
    /// transition.
    pub fn apply_event(&mut self, event: AppEvent) -> Option<SuggestionRequest> {
        match event {
            AppEvent::GenerationFinished { project_id, result } => {
                let inflight = match self.inflight.take() {
                    Some(inflight)
                        if inflight.project_id == project_id && self.active.id == project_id =>
                    {
                        inflight
                    }
                    other => {
                        self.inflight = other;
                        self.note(format!(
                            "discarded generation result for inactive project {project_id}"
                        ));
                        return None;
                    }
                };

                match result {
                    Ok(reply) => {
                        let artifact = GeneratedComponent {
                            id: fresh_id(),
                            prompt: inflight.prompt,
                            code: reply.code.clone(),
                            description: reply.description.clone(),
                            version: self.active.next_version(),
                            timestamp: now_ms(),
                        };
                        self.active.history.push(artifact);
                        // A new version always takes focus.
                        self.active.current_index = Some(self.active.history.len() - 1);
                        self.active
                            .messages
                            .push(Message::assistant(reply.description.clone()));
                        self.ticker.stop();
                        self.status = AppStatus::Idle;
                        self.persist();
                        Some(SuggestionRequest {
                            project_id,
                            description: reply.description,
                            code: reply.code,
                        })
                    }
                    Err(err) => {
                        self.ticker.stop();
                        self.status = AppStatus::Error(err.to_string());
                        self.note(format!("generation failed: {err}"));
                        None
                    }
                }
            }
            AppEvent::SuggestionsReady {
                project_id,
                suggestions,
            } => {
                if project_id == self.active.id {
                    self.suggestions = suggestions
                        .into_iter()
                        .take(MAX_SUGGESTIONS)
                        .collect();
                } else {
                    tracing::debug!(%project_id, "dropped suggestions for inactive project");
                }
                None
            }
            AppEvent::ExportFinished { result } => {
                if !matches!(self.status, AppStatus::Exporting) {
                    self.note("dropped export result arriving outside an export");
                    return None;
                }
                match result {
                    Ok(()) => {
                        self.status = AppStatus::Idle;
                        self.note("export finished");
                    }
                    Err(err) => {
                        self.status = AppStatus::Error(err.to_string());
                        self.note(format!("export failed: {err}"));
                    }
                }
                None
            }
            AppEvent::ReposListed { .. } => None,
        }
    }

    /// Selecting a version moves the pointer; history never mutates.
    pub fn select_version(&mut self, index: usize) {
        self.clear_error();
        if index < self.active.history.len() {
            self.active.current_index = Some(index);
            self.persist();
        }
    }

    pub fn new_project(&mut self) {
        self.open_project(fresh_id());
    }

    pub fn select_project(&mut self, id: &str) {
        if id != self.active.id {
            self.open_project(id.to_string());
        }
    }

    fn open_project(&mut self, id: String) {
        self.clear_error();
        if self.is_busy() {
            // The tagged in-flight result will be discarded on arrival.
            self.ticker.stop();
            self.status = AppStatus::Idle;
            self.inflight = None;
            self.note("abandoned in-flight request after project switch");
        }
        self.suggestions.clear();
        self.active = self
            .projects
            .iter()
            .find(|project| project.id == id)
            .cloned()
            .unwrap_or_else(|| Project::new(id));
        self.save_active_id();
    }

    pub fn set_github_config(&mut self, config: GithubConfig) {
        self.github = config;
        if let Err(err) = self.store.save(GITHUB_CONFIG_KEY, &self.github) {
            self.note(format!("failed to persist GitHub settings: {err}"));
        }
    }

    pub fn begin_github_export(&mut self) -> ExportStart {
        self.clear_error();
        if self.is_busy() {
            return ExportStart::Busy;
        }
        let Some(artifact) = self.active.current().cloned() else {
            return ExportStart::NeedsConfig;
        };
        if !self.github.is_ready() {
            return ExportStart::NeedsConfig;
        }
        self.status = AppStatus::Exporting;
        ExportStart::Request(PublishRequest {
            config: self.github.clone(),
            artifact,
        })
    }

    fn save_active_id(&mut self) {
        if let Err(err) = self.store.save_raw(ACTIVE_PROJECT_KEY, &self.active.id) {
            self.note(format!("failed to persist active project id: {err}"));
        }
    }

    /// The single persistence choke point: derived fields are recomputed
    /// here and nowhere else, then the whole project list is written.
    fn persist(&mut self) {
        self.active.refresh_derived(now_ms());
        match self
            .projects
            .iter_mut()
            .find(|project| project.id == self.active.id)
        {
            Some(slot) => *slot = self.active.clone(),
            None => self.projects.push(self.active.clone()),
        }
        if let Err(err) = self.store.save(PROJECTS_KEY, &self.projects) {
            self.note(format!("failed to persist projects: {err}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::{GenerateError, GeneratedReply};
    use crate::project::{Role, UNTITLED_NAME};

    fn bench(dir: &tempfile::TempDir) -> Workbench {
        Workbench::new(Store::at(dir.path()))
    }

    fn finish_ok(bench: &mut Workbench, code: &str, description: &str) -> Option<SuggestionRequest> {
        let project_id = bench.active().id.clone();
        bench.apply_event(AppEvent::GenerationFinished {
            project_id,
            result: Ok(GeneratedReply {
                code: code.to_string(),
                description: description.to_string(),
            }),
        })
    }

    #[test]
    fn successful_generation_appends_artifact_and_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        let request = bench
            .send_message("Build a button", None)
            .expect("idle bench should accept a message");
        assert!(request.history.is_empty());
        assert_eq!(request.prompt, "Build a button");
        assert_eq!(bench.status(), &AppStatus::Generating);
        assert!(bench.ticker_running());
        assert!(bench.progress_label().is_some());

        let follow_up = finish_ok(&mut bench, "const Component=()=>null;", "A button");
        assert!(follow_up.is_some());

        let active = bench.active();
        assert_eq!(active.history.len(), 1);
        assert_eq!(active.history[0].version, 1);
        assert_eq!(active.current_index, Some(0));
        assert_eq!(active.messages.len(), 2);
        assert_eq!(active.messages[0].role, Role::User);
        assert_eq!(active.messages[1].role, Role::Assistant);
        assert_eq!(active.messages[1].content, "A button");
        assert_eq!(bench.status(), &AppStatus::Idle);
        assert!(!bench.ticker_running());
    }

    #[test]
    fn failed_generation_keeps_user_message_and_enters_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        bench.send_message("Build a button", None).unwrap();
        let project_id = bench.active().id.clone();
        let follow_up = bench.apply_event(AppEvent::GenerationFinished {
            project_id,
            result: Err(GenerateError::Transport("connection refused".to_string())),
        });
        assert!(follow_up.is_none());

        let active = bench.active();
        assert!(active.history.is_empty());
        assert_eq!(active.current_index, None);
        assert_eq!(active.messages.len(), 1);
        assert!(matches!(bench.status(), AppStatus::Error(_)));
        assert!(!bench.ticker_running());
    }

    #[test]
    fn versions_count_up_and_focus_follows() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        for round in 1..=3u32 {
            bench
                .send_message(&format!("iteration {round}"), None)
                .expect("bench should be idle between rounds");
            finish_ok(&mut bench, "{}", "done");
            let active = bench.active();
            assert_eq!(active.history.len(), round as usize);
            assert_eq!(active.history[round as usize - 1].version, round);
            assert_eq!(active.current_index, Some(round as usize - 1));
        }
    }

    #[test]
    fn sends_are_refused_while_busy() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        bench.send_message("first", None).unwrap();
        assert!(bench.send_message("second", None).is_none());
        assert_eq!(bench.active().messages.len(), 1);
        assert!(matches!(bench.begin_github_export(), ExportStart::Busy));
    }

    #[test]
    fn project_switch_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        bench.send_message("Build a pricing table", None).unwrap();
        finish_ok(&mut bench, "{\"schema_version\":1}", "A pricing table");
        let first = bench.active().clone();

        bench.new_project();
        assert_ne!(bench.active().id, first.id);
        assert!(bench.active().messages.is_empty());
        assert!(bench.active().history.is_empty());

        bench.select_project(&first.id);
        let restored = bench.active();
        assert_eq!(restored.messages, first.messages);
        assert_eq!(restored.history, first.history);
        assert_eq!(restored.current_index, first.current_index);
    }

    #[test]
    fn restart_restores_last_open_project() {
        let dir = tempfile::tempdir().unwrap();
        let first_id;
        {
            let mut bench = bench(&dir);
            bench.send_message("Build a hero", None).unwrap();
            finish_ok(&mut bench, "{}", "A hero");
            first_id = bench.active().id.clone();
        }
        let bench = Workbench::new(Store::at(dir.path()));
        assert_eq!(bench.active().id, first_id);
        assert_eq!(bench.active().history.len(), 1);
    }

    #[test]
    fn unwritten_projects_are_not_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);
        // A fresh project with no state changes never enters the list.
        bench.new_project();
        bench.new_project();
        assert!(bench.projects().is_empty());

        bench.send_message("now it counts", None).unwrap();
        assert_eq!(bench.projects().len(), 1);
    }

    #[test]
    fn stale_generation_result_is_discarded_after_switch() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        bench.send_message("for project A", None).unwrap();
        let first_id = bench.active().id.clone();

        bench.new_project();
        assert_eq!(bench.status(), &AppStatus::Idle);
        assert!(!bench.ticker_running());

        let follow_up = bench.apply_event(AppEvent::GenerationFinished {
            project_id: first_id.clone(),
            result: Ok(GeneratedReply {
                code: "{}".to_string(),
                description: "late".to_string(),
            }),
        });
        assert!(follow_up.is_none());
        assert!(bench.active().history.is_empty());
        assert!(bench.active().messages.is_empty());

        // The original project keeps only its user message.
        bench.select_project(&first_id);
        assert!(bench.active().history.is_empty());
        assert_eq!(bench.active().messages.len(), 1);
    }

    #[test]
    fn error_state_is_dismissed_by_the_next_action() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        bench.send_message("will fail", None).unwrap();
        let project_id = bench.active().id.clone();
        bench.apply_event(AppEvent::GenerationFinished {
            project_id,
            result: Err(GenerateError::MalformedResponse("shape".to_string())),
        });
        assert!(matches!(bench.status(), AppStatus::Error(_)));

        bench.send_message("try again", None).unwrap();
        assert_eq!(bench.status(), &AppStatus::Generating);
    }

    #[test]
    fn derived_name_tracks_latest_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);

        bench
            .send_message(
                "A very long prompt exceeding thirty characters for sure",
                None,
            )
            .unwrap();
        finish_ok(&mut bench, "{}", "done");
        assert_eq!(bench.active().name, "A very long prompt exceeding t...");

        let listed = bench
            .projects()
            .iter()
            .find(|p| p.id == bench.active().id)
            .unwrap();
        assert_eq!(listed.name, bench.active().name);
    }

    #[test]
    fn untouched_project_is_untitled() {
        let dir = tempfile::tempdir().unwrap();
        let bench = bench(&dir);
        assert_eq!(bench.active().name, UNTITLED_NAME);
    }

    #[test]
    fn export_needs_config_or_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);
        assert!(matches!(bench.begin_github_export(), ExportStart::NeedsConfig));

        bench.send_message("Build a card", None).unwrap();
        finish_ok(&mut bench, "{}", "A card");
        assert!(matches!(bench.begin_github_export(), ExportStart::NeedsConfig));

        bench.set_github_config(GithubConfig {
            token: "ghp_x".to_string(),
            owner: "demo".to_string(),
            repo: "playground".to_string(),
            ..GithubConfig::default()
        });
        let ExportStart::Request(request) = bench.begin_github_export() else {
            panic!("export should start once configured");
        };
        assert_eq!(request.artifact.version, 1);
        assert_eq!(bench.status(), &AppStatus::Exporting);

        bench.apply_event(AppEvent::ExportFinished { result: Ok(()) });
        assert_eq!(bench.status(), &AppStatus::Idle);
    }

    #[test]
    fn export_failure_enters_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);
        bench.send_message("Build a card", None).unwrap();
        finish_ok(&mut bench, "{}", "A card");
        bench.set_github_config(GithubConfig {
            token: "ghp_x".to_string(),
            owner: "demo".to_string(),
            repo: "playground".to_string(),
            ..GithubConfig::default()
        });
        bench.begin_github_export();
        bench.apply_event(AppEvent::ExportFinished {
            result: Err(crate::export::github::ExportError::Transport(
                "offline".to_string(),
            )),
        });
        assert!(matches!(bench.status(), AppStatus::Error(_)));
    }

    #[test]
    fn suggestions_are_project_scoped_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);
        let active_id = bench.active().id.clone();

        bench.apply_event(AppEvent::SuggestionsReady {
            project_id: "someone-else".to_string(),
            suggestions: vec!["nope".to_string()],
        });
        assert!(bench.suggestions().is_empty());

        bench.apply_event(AppEvent::SuggestionsReady {
            project_id: active_id,
            suggestions: vec![
                "a".to_string(),
                "b".to_string(),
                "c".to_string(),
                "d".to_string(),
            ],
        });
        assert_eq!(bench.suggestions().to_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn selecting_a_version_moves_only_the_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = bench(&dir);
        for round in 0..2 {
            bench.send_message(&format!("round {round}"), None).unwrap();
            finish_ok(&mut bench, "{}", "done");
        }
        let history = bench.active().history.clone();

        bench.select_version(0);
        assert_eq!(bench.active().current_index, Some(0));
        assert_eq!(bench.active().history, history);

        bench.select_version(99);
        assert_eq!(bench.active().current_index, Some(0));
    }

    #[test]
    fn ticker_rotates_through_fixed_phases() {
        let mut ticker = ProgressTicker::default();
        assert!(ticker.label().is_none());
        ticker.start();
        assert_eq!(ticker.label(), Some(GENERATION_PHASES[0]));
        ticker.stop();
        assert!(!ticker.is_running());
        assert!(ticker.label().is_none());
    }
}
