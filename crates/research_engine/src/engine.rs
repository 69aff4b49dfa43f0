use std::collections::HashMap;
use std::sync::Arc;

use research_core::{ProgressEvent, QueryError, SessionId};
use research_logging::{research_debug, research_info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::session::{ResearchSession, RunOutcome, SessionSubscriber, StreamMode};
use crate::{Diagnostic, DiagnosticSink, HealthMonitor, ResearchService};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Query(#[from] QueryError),
    /// The id belongs to a session that has not reported `SessionFinished` yet.
    #[error("session {0} is already running")]
    AlreadyRunning(SessionId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Session {
        session_id: SessionId,
        event: ProgressEvent,
    },
    Diagnostic {
        session_id: SessionId,
        diagnostic: Diagnostic,
    },
    /// The session task is over and its transport released.
    SessionFinished {
        session_id: SessionId,
        cancelled: bool,
    },
    Health {
        online: bool,
    },
}

/// Executes session and health work on the tokio runtime and reports back
/// through a single ordered event channel.
pub struct EngineHandle {
    service: Arc<dyn ResearchService>,
    health: HealthMonitor,
    mode: StreamMode,
    event_tx: mpsc::UnboundedSender<EngineEvent>,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    sessions: HashMap<SessionId, CancellationToken>,
}

impl EngineHandle {
    pub fn new(service: Arc<dyn ResearchService>, mode: StreamMode) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            health: HealthMonitor::new(service.clone()),
            service,
            mode,
            event_tx,
            event_rx,
            sessions: HashMap::new(),
        }
    }

    pub fn start_session(&mut self, session_id: SessionId, query: &str) -> Result<(), StartError> {
        if self.sessions.contains_key(&session_id) {
            return Err(StartError::AlreadyRunning(session_id));
        }
        let session = ResearchSession::new(query)?.with_mode(self.mode);
        let cancel = CancellationToken::new();
        self.sessions.insert(session_id, cancel.clone());

        let service = self.service.clone();
        let event_tx = self.event_tx.clone();
        let subscriber: Arc<dyn SessionSubscriber> = Arc::new(EngineSubscriber {
            session_id,
            tx: event_tx.clone(),
        });
        research_info!("Starting session {} ({:?})", session_id, self.mode);
        tokio::spawn(async move {
            let outcome = session.run(service.as_ref(), subscriber, &cancel).await;
            let _ = event_tx.send(EngineEvent::SessionFinished {
                session_id,
                cancelled: matches!(outcome, RunOutcome::Cancelled),
            });
        });
        Ok(())
    }

    /// Cancels a running session. Unknown or finished ids are ignored.
    ///
    /// The id stays reserved until its `SessionFinished` event is received.
    pub fn cancel(&mut self, session_id: SessionId) {
        if let Some(token) = self.sessions.get(&session_id) {
            if !token.is_cancelled() {
                research_info!("Cancelling session {}", session_id);
                token.cancel();
            }
        }
    }

    pub fn check_health(&self) {
        let health = self.health.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let online = health.check().await;
            let _ = event_tx.send(EngineEvent::Health { online });
        });
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Waits for the next engine event.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        let event = self.event_rx.recv().await?;
        if let EngineEvent::SessionFinished { session_id, .. } = &event {
            self.sessions.remove(session_id);
        }
        Some(event)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        for (session_id, token) in self.sessions.drain() {
            research_debug!("Engine dropped; cancelling session {}", session_id);
            token.cancel();
        }
    }
}

struct EngineSubscriber {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl DiagnosticSink for EngineSubscriber {
    fn report(&self, diagnostic: Diagnostic) {
        let _ = self.tx.send(EngineEvent::Diagnostic {
            session_id: self.session_id,
            diagnostic,
        });
    }
}

impl SessionSubscriber for EngineSubscriber {
    fn on_event(&self, event: &ProgressEvent) {
        let _ = self.tx.send(EngineEvent::Session {
            session_id: self.session_id,
            event: event.clone(),
        });
    }
}
