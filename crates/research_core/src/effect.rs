use crate::SessionId;

/// Side effects requested by [`crate::update`]; executed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Issue the research request for a freshly created session.
    StartResearch { session_id: SessionId, query: String },
    /// Abandon an in-flight session and release its transport.
    CancelResearch { session_id: SessionId },
    /// Check service reachability once.
    CheckHealth,
    /// Remember `query` as the target of a later manual retry.
    PersistLastQuery { query: Option<String> },
}
