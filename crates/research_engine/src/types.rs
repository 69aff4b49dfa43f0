use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use research_core::{IgnoreReason, ProgressEvent};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::classify::ClassificationMiss;
use crate::decoder::FramingError;

/// One decoded logical payload from the event stream.
pub type Record = Map<String, Value>;

/// Chunked body of a streaming research response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    /// The response body broke off or could not be read.
    Body,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Body => write!(f, "response body error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Non-fatal observations made while decoding and folding a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Framing(FramingError),
    Unclassified(ClassificationMiss),
    SearchFailed { index: usize, error: String },
    Ignored { event: ProgressEvent, reason: IgnoreReason },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Framing(err) => write!(f, "framing: {err}"),
            Diagnostic::Unclassified(miss) => write!(f, "unclassified record: {miss}"),
            Diagnostic::SearchFailed { index, error } => {
                write!(f, "search {index} failed: {error}")
            }
            Diagnostic::Ignored { event, reason } => {
                write!(f, "ignored {} event: {reason}", event.kind())
            }
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// Envelope of the non-streaming `POST /research` call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResearchResponse {
    pub success: bool,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub(crate) const DEFAULT_FAILURE_MESSAGE: &str = "research failed";

impl ResearchResponse {
    /// Converts the envelope into the same terminal event the stream would end with.
    pub fn into_event(self) -> ProgressEvent {
        if self.success {
            ProgressEvent::Complete {
                query: self.query,
                result: self.result.unwrap_or(Value::Null),
            }
        } else {
            ProgressEvent::failed(
                self.message
                    .or(self.error)
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            )
        }
    }
}
