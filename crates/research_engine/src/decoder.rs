//! Line framing for the research event stream.
//!
//! The service writes `event: <label>` / `data: <json>` line pairs separated
//! by blank lines. Only `data: ` lines carry records; event labels are read
//! and dropped because events are classified by payload shape.
//!
//! Framing works on raw bytes: a line is decoded as text only once its
//! terminating `\n` has arrived, so the records produced never depend on how
//! the transport split the byte stream.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use research_logging::{research_debug, research_trace, research_warn};
use serde_json::Value;

use crate::{Diagnostic, DiagnosticSink, Record, TransportError};

const DATA_PREFIX: &str = "data: ";
const EVENT_PREFIX: &str = "event: ";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} in line {line:?}")]
pub struct FramingError {
    pub line: String,
    pub reason: FramingErrorReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingErrorReason {
    InvalidJson(String),
    NotAnObject,
}

impl fmt::Display for FramingErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingErrorReason::InvalidJson(message) => write!(f, "invalid json ({message})"),
            FramingErrorReason::NotAnObject => write!(f, "payload is not a json object"),
        }
    }
}

/// Synchronous framing core: feed chunks, get every record completed by them.
#[derive(Debug, Default)]
pub struct LineFramer {
    carry: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and frames every line it terminates. The trailing
    /// unterminated line stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Record, FramingError>> {
        let old_len = self.carry.len();
        self.carry.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut search_from = old_len;
        while let Some(pos) = self.carry[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + pos;
            if let Some(frame) = frame_line(&self.carry[start..end]) {
                frames.push(frame);
            }
            start = end + 1;
            search_from = start;
        }
        self.carry.drain(..start);
        frames
    }

    /// Ends the stream. A trailing partial line cannot be a complete record
    /// and is discarded; returns how many bytes were dropped.
    pub fn finish(&mut self) -> usize {
        let discarded = self.carry.len();
        if discarded > 0 {
            research_debug!("Discarding {} bytes of unterminated trailing line", discarded);
        }
        self.carry.clear();
        discarded
    }

    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }
}

fn frame_line(raw: &[u8]) -> Option<Result<Record, FramingError>> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if let Some(payload) = line.strip_prefix(DATA_PREFIX) {
        return Some(parse_record(payload));
    }
    if let Some(label) = line.strip_prefix(EVENT_PREFIX) {
        research_trace!("Stream event label {:?}", label);
    }
    None
}

fn parse_record(payload: &str) -> Result<Record, FramingError> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(_) => Err(FramingError {
            line: payload.to_string(),
            reason: FramingErrorReason::NotAnObject,
        }),
        Err(err) => Err(FramingError {
            line: payload.to_string(),
            reason: FramingErrorReason::InvalidJson(err.to_string()),
        }),
    }
}

/// Lazy record reader over a chunked byte stream.
///
/// One decoder serves one request. Once the transport ends or fails it is
/// dropped, and the decoder only ever yields `None` afterwards.
pub struct StreamDecoder<S> {
    stream: Option<S>,
    framer: LineFramer,
    pending: VecDeque<Result<Record, FramingError>>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    chunks: usize,
    bytes: usize,
    records: usize,
}

impl<S> StreamDecoder<S>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            framer: LineFramer::new(),
            pending: VecDeque::new(),
            diagnostics: None,
            chunks: 0,
            bytes: 0,
            records: 0,
        }
    }

    /// Routes framing errors to `sink` in addition to the log.
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Returns the next complete record, pulling chunks from the transport
    /// only when nothing framed is pending. `Ok(None)` marks end-of-stream.
    pub async fn next_record(&mut self) -> Result<Option<Record>, TransportError> {
        loop {
            while let Some(frame) = self.pending.pop_front() {
                match frame {
                    Ok(record) => {
                        self.records += 1;
                        return Ok(Some(record));
                    }
                    Err(err) => self.report_framing(err),
                }
            }

            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            match stream.next().await {
                Some(Ok(chunk)) => {
                    self.chunks += 1;
                    self.bytes += chunk.len();
                    let frames = self.framer.push(&chunk);
                    self.pending.extend(frames);
                }
                Some(Err(err)) => {
                    research_warn!(
                        "Transport failed after {} chunks ({} bytes): {}",
                        self.chunks,
                        self.bytes,
                        err
                    );
                    self.release();
                    return Err(err);
                }
                None => {
                    self.framer.finish();
                    research_debug!(
                        "Stream ended after {} chunks, {} bytes, {} records",
                        self.chunks,
                        self.bytes,
                        self.records
                    );
                    self.release();
                }
            }
        }
    }

    /// Adapts the decoder into a `Stream` of records. A transport error is
    /// yielded once and ends the stream.
    pub fn into_records(self) -> impl Stream<Item = Result<Record, TransportError>> {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut decoder = state?;
            match decoder.next_record().await {
                Ok(Some(record)) => Some((Ok(record), Some(decoder))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// True once the underlying transport has been dropped.
    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }

    fn release(&mut self) {
        self.stream = None;
    }

    fn report_framing(&self, err: FramingError) {
        research_warn!("Skipping malformed record: {}", err);
        if let Some(sink) = &self.diagnostics {
            sink.report(Diagnostic::Framing(err));
        }
    }
}
