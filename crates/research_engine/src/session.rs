use std::sync::Arc;

use research_core::{Applied, ProgressEvent, QueryError, SessionState};
use research_logging::{research_debug, research_info, research_warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classify::classify;
use crate::decoder::StreamDecoder;
use crate::{Diagnostic, DiagnosticSink, ResearchService};

const STREAM_ENDED_EARLY: &str = "research stream ended before a final result";

/// Receives what a running session observes, in arrival order.
pub trait SessionSubscriber: DiagnosticSink {
    fn on_event(&self, event: &ProgressEvent);
}

/// How the session talks to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamMode {
    /// `POST /research/stream`, incremental events.
    #[default]
    Streaming,
    /// `POST /research`, a single terminal event.
    SingleShot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Settled(SessionState),
    Cancelled,
}

/// Drives one query from request to terminal outcome.
pub struct ResearchSession {
    state: SessionState,
    mode: StreamMode,
}

impl ResearchSession {
    /// Fails fast on a blank query.
    pub fn new(query: &str) -> Result<Self, QueryError> {
        Ok(Self {
            state: SessionState::new(query)?,
            mode: StreamMode::default(),
        })
    }

    pub fn with_mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn query(&self) -> &str {
        self.state.query()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Creates a session for `query` and runs it on the tokio runtime.
    pub fn start(
        service: Arc<dyn ResearchService>,
        query: &str,
    ) -> Result<SessionHandle, QueryError> {
        Ok(Self::new(query)?.spawn(service))
    }

    /// Runs this session on the tokio runtime, delivering events through the
    /// returned handle.
    pub fn spawn(self, service: Arc<dyn ResearchService>) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let subscriber: Arc<dyn SessionSubscriber> = Arc::new(ChannelSubscriber::new(tx));
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(service.as_ref(), subscriber, &token).await });
        SessionHandle {
            events: rx,
            cancel,
            join: Some(join),
        }
    }

    /// Runs the session to its terminal event, or until `cancel` fires.
    ///
    /// Cancellation drops the in-flight request and decoder, releasing the
    /// transport, and nothing further reaches `subscriber`.
    pub async fn run(
        mut self,
        service: &dyn ResearchService,
        subscriber: Arc<dyn SessionSubscriber>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        self.state.start();
        research_info!(
            "Research session started (mode={:?}, query_len={})",
            self.mode,
            self.state.query().len()
        );

        let settled = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            settled = self.drive(service, &subscriber, cancel) => settled,
        };

        if settled {
            RunOutcome::Settled(self.state)
        } else {
            research_info!("Research session cancelled in phase {}", self.state.phase().label());
            RunOutcome::Cancelled
        }
    }

    /// Returns false once `cancel` has fired. Records framed from one chunk
    /// arrive without suspending, so the token is checked before every
    /// dispatch. Returning drops the decoder and releases the response body.
    async fn drive(
        &mut self,
        service: &dyn ResearchService,
        subscriber: &Arc<dyn SessionSubscriber>,
        cancel: &CancellationToken,
    ) -> bool {
        let query = self.state.query().to_string();

        if self.mode == StreamMode::SingleShot {
            let event = match service.research(&query).await {
                Ok(envelope) => envelope.into_event(),
                Err(err) => ProgressEvent::failed(err.to_string()),
            };
            return self.dispatch_unless_cancelled(event, subscriber.as_ref(), cancel);
        }

        let stream = match service.open_stream(&query).await {
            Ok(stream) => stream,
            Err(err) => {
                research_warn!("Failed to open research stream: {}", err);
                let event = ProgressEvent::failed(err.to_string());
                return self.dispatch_unless_cancelled(event, subscriber.as_ref(), cancel);
            }
        };

        let diagnostics: Arc<dyn DiagnosticSink> = Arc::new(ForwardDiagnostics {
            subscriber: subscriber.clone(),
            cancel: cancel.clone(),
        });
        let mut decoder = StreamDecoder::new(stream).with_diagnostics(diagnostics);
        loop {
            let event = match decoder.next_record().await {
                Ok(Some(record)) => match classify(&record) {
                    Ok(event) => event,
                    Err(miss) => {
                        if cancel.is_cancelled() {
                            return false;
                        }
                        research_warn!("Skipping unclassifiable record: {}", miss);
                        subscriber.report(Diagnostic::Unclassified(miss));
                        continue;
                    }
                },
                Ok(None) => {
                    if !cancel.is_cancelled() {
                        research_warn!("{}", STREAM_ENDED_EARLY);
                    }
                    ProgressEvent::failed(STREAM_ENDED_EARLY)
                }
                Err(err) => ProgressEvent::failed(err.to_string()),
            };
            let terminal = event.is_terminal();
            if !self.dispatch_unless_cancelled(event, subscriber.as_ref(), cancel) {
                return false;
            }
            if terminal || self.state.is_settled() {
                return true;
            }
        }
    }

    fn dispatch_unless_cancelled(
        &mut self,
        event: ProgressEvent,
        subscriber: &dyn SessionSubscriber,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() {
            research_debug!("Dropping {} event after cancellation", event.kind());
            return false;
        }
        self.dispatch(event, subscriber);
        true
    }

    fn dispatch(&mut self, event: ProgressEvent, subscriber: &dyn SessionSubscriber) {
        match self.state.apply(&event) {
            Applied::Ignored(reason) => {
                research_debug!("Ignoring {} event: {}", event.kind(), reason);
                subscriber.report(Diagnostic::Ignored { event, reason });
            }
            applied => {
                if let ProgressEvent::SearchFailed { index, error } = &event {
                    research_warn!("Search {} failed: {}", index, error);
                    subscriber.report(Diagnostic::SearchFailed {
                        index: *index,
                        error: error.clone(),
                    });
                }
                subscriber.on_event(&event);
                if let Applied::Settled(outcome) = applied {
                    research_info!("Research session settled: {:?}", outcome);
                }
            }
        }
    }
}

struct ForwardDiagnostics {
    subscriber: Arc<dyn SessionSubscriber>,
    cancel: CancellationToken,
}

impl DiagnosticSink for ForwardDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        if !self.cancel.is_cancelled() {
            self.subscriber.report(diagnostic);
        }
    }
}

/// Forwards events into a tokio channel. Diagnostics are only logged.
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl DiagnosticSink for ChannelSubscriber {
    fn report(&self, diagnostic: Diagnostic) {
        research_debug!("Session diagnostic: {}", diagnostic);
    }
}

impl SessionSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &ProgressEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Caller side of a spawned session. Dropping it cancels the session.
pub struct SessionHandle {
    events: mpsc::UnboundedReceiver<ProgressEvent>,
    cancel: CancellationToken,
    join: Option<JoinHandle<RunOutcome>>,
}

impl SessionHandle {
    /// Next classified event, or `None` once the session is over or cancelled.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Abandons the session. Buffered events are discarded.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.events.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for the session task and returns its final state.
    pub async fn settled(mut self) -> RunOutcome {
        let Some(join) = self.join.take() else {
            return RunOutcome::Cancelled;
        };
        match join.await {
            Ok(outcome) => outcome,
            Err(err) => {
                research_warn!("Research session task ended abnormally: {}", err);
                RunOutcome::Cancelled
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.cancel.cancel();
        }
    }
}
