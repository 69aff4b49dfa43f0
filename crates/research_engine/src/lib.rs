//! Research engine: stream decoding, classification and session IO.
mod classify;
mod decoder;
mod engine;
mod health;
mod service;
mod session;
mod types;

pub use classify::{classify, ClassificationMiss};
pub use decoder::{FramingError, FramingErrorReason, LineFramer, StreamDecoder};
pub use engine::{EngineEvent, EngineHandle, StartError};
pub use health::HealthMonitor;
pub use service::{ReqwestService, ResearchService, ServiceSettings};
pub use session::{
    ChannelSubscriber, ResearchSession, RunOutcome, SessionHandle, SessionSubscriber, StreamMode,
};
pub use types::{
    ByteStream, Diagnostic, DiagnosticSink, FailureKind, HealthStatus, Record, ResearchResponse,
    TransportError,
};
