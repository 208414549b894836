use crate::export::github::{ExportError, RepoSummary};
use crate::gen::{GenerateError, GeneratedReply};

/// Completion events delivered from the async clients to the UI thread.
/// Generation and suggestion events carry the project id active when the
/// request was submitted; the orchestrator discards results whose project
/// is no longer open.
#[derive(Debug, Clone)]
pub enum AppEvent {
    GenerationFinished {
        project_id: String,
        result: Result<GeneratedReply, GenerateError>,
    },
    SuggestionsReady {
        project_id: String,
        suggestions: Vec<String>,
    },
    ReposListed {
        repos: Vec<RepoSummary>,
    },
    ExportFinished {
        result: Result<(), ExportError>,
    },
}
