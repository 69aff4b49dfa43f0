use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type SessionId = u64;

/// One planned web search. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchItem {
    pub query: String,
    #[serde(default)]
    pub reason: String,
}

impl SearchItem {
    pub fn new(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            reason: reason.into(),
        }
    }
}

/// Typed interpretation of one record received from the research service.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The service entered or reported on a stage (`planning`, `searching`, ...).
    Status {
        stage: String,
        message: Option<String>,
    },
    /// The ordered search plan. Delivered at most once per session.
    Plan {
        items: Vec<SearchItem>,
        message: Option<String>,
    },
    SearchStarted {
        index: usize,
        item: SearchItem,
        message: Option<String>,
    },
    SearchCompleted {
        index: usize,
        completed: usize,
        message: Option<String>,
    },
    /// One planned search failed. Never fatal to the session.
    SearchFailed { index: usize, error: String },
    Complete {
        query: Option<String>,
        result: Value,
    },
    Failed { message: String },
}

impl ProgressEvent {
    /// Builds the local failure event used for transport-level problems, so
    /// callers see a single failure shape regardless of cause.
    pub fn failed(message: impl Into<String>) -> Self {
        ProgressEvent::Failed {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Failed { .. }
        )
    }

    /// Short variant name for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Status { .. } => "status",
            ProgressEvent::Plan { .. } => "plan",
            ProgressEvent::SearchStarted { .. } => "search_started",
            ProgressEvent::SearchCompleted { .. } => "search_completed",
            ProgressEvent::SearchFailed { .. } => "search_failed",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Failed { .. } => "failed",
        }
    }
}
