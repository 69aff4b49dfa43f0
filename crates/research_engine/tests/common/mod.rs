#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use bytes::Bytes;
use research_core::ProgressEvent;
use research_engine::{
    ByteStream, Diagnostic, DiagnosticSink, FailureKind, HealthStatus, ResearchResponse,
    ResearchService, SessionSubscriber, TransportError,
};
use tokio::sync::mpsc;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(research_logging::initialize_for_tests);
}

/// Subscriber that keeps everything it is told.
#[derive(Default)]
pub struct RecordingSubscriber {
    events: Mutex<Vec<ProgressEvent>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl RecordingSubscriber {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().unwrap().clone()
    }
}

impl DiagnosticSink for RecordingSubscriber {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().unwrap().push(diagnostic);
    }
}

impl SessionSubscriber for RecordingSubscriber {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Sets a flag when the stream it lives in is dropped.
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// In-process service whose stream body is fed chunk by chunk by the test.
pub struct ChannelService {
    body: Mutex<Option<mpsc::UnboundedReceiver<Result<Bytes, TransportError>>>>,
    open_error: Option<TransportError>,
    released: Arc<AtomicBool>,
    opened: AtomicUsize,
    healthy: bool,
}

pub struct BodyFeed {
    tx: mpsc::UnboundedSender<Result<Bytes, TransportError>>,
}

impl BodyFeed {
    /// Returns false once the service side has released the stream.
    pub fn send(&self, chunk: &str) -> bool {
        self.tx
            .send(Ok(Bytes::copy_from_slice(chunk.as_bytes())))
            .is_ok()
    }

    pub fn fail(&self, message: &str) -> bool {
        self.tx
            .send(Err(TransportError::new(FailureKind::Body, message)))
            .is_ok()
    }
}

impl ChannelService {
    pub fn new() -> (Arc<Self>, BodyFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Arc::new(Self {
            body: Mutex::new(Some(rx)),
            open_error: None,
            released: Arc::new(AtomicBool::new(false)),
            opened: AtomicUsize::new(0),
            healthy: true,
        });
        (service, BodyFeed { tx })
    }

    /// A service whose body is exactly `chunks`, already complete.
    pub fn scripted(chunks: &[&str]) -> Arc<Self> {
        let (service, feed) = Self::new();
        for chunk in chunks {
            feed.send(chunk);
        }
        service
    }

    pub fn refusing(error: TransportError) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);
        Arc::new(Self {
            body: Mutex::new(Some(rx)),
            open_error: Some(error),
            released: Arc::new(AtomicBool::new(false)),
            opened: AtomicUsize::new(0),
            healthy: false,
        })
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ResearchService for ChannelService {
    async fn open_stream(&self, _query: &str) -> Result<ByteStream, TransportError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        let rx = self
            .body
            .lock()
            .unwrap()
            .take()
            .expect("stream opened twice");
        let guard = ReleaseGuard(self.released.clone());
        let stream = futures_util::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            let item = rx.recv().await?;
            Some((item, (rx, guard)))
        });
        Ok(Box::pin(stream))
    }

    async fn research(&self, query: &str) -> Result<ResearchResponse, TransportError> {
        if let Some(err) = &self.open_error {
            return Err(err.clone());
        }
        Ok(ResearchResponse {
            success: true,
            query: Some(query.to_string()),
            result: Some(serde_json::json!({"report": "single shot"})),
            error: None,
            message: None,
        })
    }

    async fn health(&self) -> Result<HealthStatus, TransportError> {
        if self.healthy {
            Ok(HealthStatus {
                status: "ok".into(),
                service: Some("fake".into()),
            })
        } else {
            Err(TransportError::new(FailureKind::Network, "connection refused"))
        }
    }
}

/// One wire-format record: an event label line, a data line, a blank line.
pub fn sse(label: &str, json: &str) -> String {
    format!("event: {label}\ndata: {json}\n\n")
}
