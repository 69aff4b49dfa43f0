use crate::session::{normalize_query, Applied, Outcome, QueryError, SessionState};
use crate::view_model::{AppViewModel, SessionView};
use crate::{ProgressEvent, SessionId};

/// Reachability of the research service as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// Caller-level state: at most one current session plus retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    health: HealthState,
    session: Option<(SessionId, SessionState)>,
    next_session_id: SessionId,
    last_query: Option<String>,
    input_error: Option<String>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            health: self.health,
            session: self
                .session
                .as_ref()
                .map(|(id, session)| SessionView::from_session(*id, session)),
            can_retry: self.can_retry(),
            last_query: self.last_query.clone(),
            input_error: self.input_error.clone(),
            dirty: self.dirty,
        }
    }

    pub fn health(&self) -> HealthState {
        self.health
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref().map(|(_, session)| session)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|(id, _)| *id)
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.session()
            .is_some_and(|session| session.phase().is_in_flight())
    }

    /// A retry is offered only after a failed session, or when a failed
    /// query was restored from a previous run and nothing is in flight.
    pub fn can_retry(&self) -> bool {
        if self.last_query.is_none() {
            return false;
        }
        match self.session() {
            Some(session) => session.outcome() == Some(Outcome::Failure),
            None => true,
        }
    }

    /// Returns and clears the dirty flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_input_error(&mut self, error: Option<QueryError>) {
        let error = error.map(|err| err.to_string());
        if self.input_error != error {
            self.input_error = error;
            self.mark_dirty();
        }
    }

    /// Creates and starts a new session. The previous session, if any, is
    /// replaced; its late events no longer match the current id.
    pub(crate) fn begin_session(&mut self, raw_query: &str) -> Result<(SessionId, String), QueryError> {
        let query = normalize_query(raw_query)?;
        let mut session = SessionState::new(&query)?;
        session.start();
        self.next_session_id += 1;
        let session_id = self.next_session_id;
        self.session = Some((session_id, session));
        self.last_query = Some(query.clone());
        self.input_error = None;
        self.mark_dirty();
        Ok((session_id, query))
    }

    pub(crate) fn clear_session(&mut self) -> Option<SessionId> {
        let (session_id, _) = self.session.take()?;
        self.mark_dirty();
        Some(session_id)
    }

    pub(crate) fn restore_last_query(&mut self, query: String) {
        if let Ok(query) = normalize_query(&query) {
            self.last_query = Some(query);
            self.mark_dirty();
        }
    }

    /// Folds an engine event into the current session. Returns `None` when the
    /// event belongs to a stale or unknown session.
    pub(crate) fn apply_session_event(
        &mut self,
        session_id: SessionId,
        event: &ProgressEvent,
    ) -> Option<Applied> {
        let (current_id, session) = self.session.as_mut()?;
        if *current_id != session_id {
            return None;
        }
        let applied = session.apply(event);
        if !applied.is_ignored() {
            self.mark_dirty();
        }
        Some(applied)
    }

    pub(crate) fn set_health(&mut self, online: bool) {
        let health = if online {
            HealthState::Online
        } else {
            HealthState::Offline
        };
        if self.health != health {
            self.health = health;
            self.mark_dirty();
        }
    }
}
