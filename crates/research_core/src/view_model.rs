use serde_json::Value;

use crate::session::{Phase, SearchFailure, SessionState};
use crate::{HealthState, SearchItem, SessionId};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub health: HealthState,
    pub session: Option<SessionView>,
    pub can_retry: bool,
    pub last_query: Option<String>,
    pub input_error: Option<String>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub session_id: SessionId,
    pub query: String,
    pub phase: Phase,
    pub stage: Option<String>,
    pub plan: Vec<SearchItem>,
    pub current_search_index: usize,
    pub completed_count: usize,
    pub last_message: Option<String>,
    pub failures: Vec<SearchFailure>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl SessionView {
    pub(crate) fn from_session(session_id: SessionId, session: &SessionState) -> Self {
        Self {
            session_id,
            query: session.query().to_string(),
            phase: session.phase(),
            stage: session.current_stage().map(ToOwned::to_owned),
            plan: session.plan().to_vec(),
            current_search_index: session.current_search_index(),
            completed_count: session.completed_count(),
            last_message: session.last_message().map(ToOwned::to_owned),
            failures: session.search_failures().to_vec(),
            result: session.result().cloned(),
            error: session.error().map(ToOwned::to_owned),
        }
    }

    /// One-line progress summary, e.g. `searching: search 2 of 5 (1 completed)`.
    pub fn progress_label(&self) -> String {
        let phase = self.phase.label();
        match self.phase {
            Phase::Searching if !self.plan.is_empty() => {
                let mut label = if self.current_search_index == 0 {
                    format!("{phase}: {} searches planned", self.plan.len())
                } else {
                    format!(
                        "{phase}: search {} of {}",
                        self.current_search_index,
                        self.plan.len()
                    )
                };
                if self.completed_count > 0 {
                    label.push_str(&format!(" ({} completed)", self.completed_count));
                }
                if !self.failures.is_empty() {
                    label.push_str(&format!(" ({} failed)", self.failures.len()));
                }
                label
            }
            _ => match &self.stage {
                Some(stage) if !stage.eq_ignore_ascii_case(phase) => format!("{phase} ({stage})"),
                _ => phase.to_string(),
            },
        }
    }

    /// Search item currently being executed, if the index points into the plan.
    ///
    /// Indexes reported by the service are one-based positions.
    pub fn current_item(&self) -> Option<&SearchItem> {
        self.current_search_index
            .checked_sub(1)
            .and_then(|idx| self.plan.get(idx))
    }
}
