use std::path::PathBuf;
use std::time::Duration;

use research_core::{Effect, Msg, ProgressEvent, SessionId};
use research_engine::{Diagnostic, EngineEvent, EngineHandle, StartError};
use research_logging::{research_debug, research_info, research_warn};

use super::persistence;

/// Executes effects produced by `update` and turns engine events back into
/// messages.
pub struct EffectRunner {
    engine: EngineHandle,
    state_dir: PathBuf,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, state_dir: PathBuf) -> Self {
        Self { engine, state_dir }
    }

    /// Runs `effects` in order. Returns messages that must be fed back
    /// immediately, such as a failure for a session that could not start.
    pub fn run(&mut self, effects: Vec<Effect>) -> Vec<Msg> {
        let mut feedback = Vec::new();
        for effect in effects {
            match effect {
                Effect::StartResearch { session_id, query } => {
                    research_info!(
                        "StartResearch session_id={} query_len={}",
                        session_id,
                        query.len()
                    );
                    match self.engine.start_session(session_id, &query) {
                        Ok(()) => {}
                        // The session under this id keeps running and reports for itself.
                        Err(err @ StartError::AlreadyRunning(_)) => {
                            research_warn!("Session {} not restarted: {}", session_id, err);
                        }
                        Err(err) => {
                            research_warn!("Session {} could not start: {}", session_id, err);
                            feedback.push(Msg::SessionEvent {
                                session_id,
                                event: ProgressEvent::failed(err.to_string()),
                            });
                        }
                    }
                }
                Effect::CancelResearch { session_id } => self.engine.cancel(session_id),
                Effect::CheckHealth => self.engine.check_health(),
                Effect::PersistLastQuery { query } => {
                    persistence::persist_last_query(&self.state_dir, query.as_deref());
                }
            }
        }
        feedback
    }

    /// Next message from the engine, or `None` when the engine is gone.
    pub async fn next_msg(&mut self) -> Option<Msg> {
        let event = self.engine.recv().await?;
        Some(match event {
            EngineEvent::Session { session_id, event } => Msg::SessionEvent { session_id, event },
            EngineEvent::Health { online } => Msg::HealthChecked { online },
            EngineEvent::Diagnostic {
                session_id,
                diagnostic,
            } => {
                log_diagnostic(session_id, &diagnostic);
                Msg::NoOp
            }
            EngineEvent::SessionFinished {
                session_id,
                cancelled,
            } => {
                research_debug!("Session {} finished (cancelled={})", session_id, cancelled);
                Msg::NoOp
            }
        })
    }

    /// Waits until a cancelled session has released its transport.
    pub async fn wait_finished(&mut self, session_id: SessionId, limit: Duration) {
        let wait = async {
            while let Some(event) = self.engine.recv().await {
                if matches!(event, EngineEvent::SessionFinished { session_id: id, .. } if id == session_id)
                {
                    return;
                }
            }
        };
        if tokio::time::timeout(limit, wait).await.is_err() {
            research_warn!("Session {} did not finish within {:?}", session_id, limit);
        }
    }
}

fn log_diagnostic(session_id: SessionId, diagnostic: &Diagnostic) {
    match diagnostic {
        Diagnostic::Ignored { .. } | Diagnostic::SearchFailed { .. } => research_debug!("Session {}: {}", session_id, diagnostic),
        _ => research_warn!("Session {}: {}", session_id, diagnostic),
    }
}
