use crate::{ProgressEvent, SessionId};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User submitted a research query.
    QuerySubmitted(String),
    /// User asked to run the last failed query again.
    RetryClicked,
    /// User abandoned the in-flight session.
    CancelClicked,
    /// User asked for a fresh reachability check.
    RecheckHealthClicked,
    /// Restore the retry target saved by a previous run.
    RestoreLastQuery(String),
    /// Engine delivered a classified event for a session.
    SessionEvent {
        session_id: SessionId,
        event: ProgressEvent,
    },
    /// Engine finished a health check.
    HealthChecked { online: bool },
    /// Engine activity with nothing to fold, such as a diagnostic or a
    /// finished session task.
    NoOp,
}
