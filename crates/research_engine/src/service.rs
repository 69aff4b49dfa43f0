use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use research_logging::{research_debug, research_info};
use serde_json::json;
use url::Url;

use crate::{
    ByteStream, FailureKind, HealthStatus, ResearchResponse, TransportError,
};

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Applies to `POST /research` and `GET /health`. The event stream itself
    /// has no intrinsic timeout.
    pub request_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// The research service as seen by the client.
#[async_trait::async_trait]
pub trait ResearchService: Send + Sync {
    /// `POST /research/stream`: returns the chunked event stream once the
    /// service has answered with a success status.
    async fn open_stream(&self, query: &str) -> Result<ByteStream, TransportError>;

    /// `POST /research`: single-shot research returning the final envelope.
    async fn research(&self, query: &str) -> Result<ResearchResponse, TransportError>;

    /// `GET /health`.
    async fn health(&self) -> Result<HealthStatus, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestService {
    settings: ServiceSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestService {
    pub fn new(settings: ServiceSettings) -> Result<Self, TransportError> {
        let mut base = Url::parse(settings.base_url.trim())
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(TransportError::new(
                FailureKind::InvalidUrl,
                format!("{} cannot be used as a base url", settings.base_url),
            ));
        }
        // Endpoints are joined relative to the base path.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| TransportError::new(FailureKind::Network, err.to_string()))?;

        Ok(Self {
            settings,
            base,
            client,
        })
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|err| TransportError::new(FailureKind::InvalidUrl, err.to_string()))
    }
}

#[async_trait::async_trait]
impl ResearchService for ReqwestService {
    async fn open_stream(&self, query: &str) -> Result<ByteStream, TransportError> {
        let url = self.endpoint("research/stream")?;
        research_info!("Opening research stream at {} (query_len={})", url, query.len());

        let response = self
            .client
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_body_error));
        Ok(Box::pin(stream))
    }

    async fn research(&self, query: &str) -> Result<ResearchResponse, TransportError> {
        let url = self.endpoint("research")?;
        research_info!("Requesting research at {} (query_len={})", url, query.len());

        let response = self
            .client
            .post(url)
            .timeout(self.settings.request_timeout)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_body_error)?;
        // Failure envelopes are returned as-is, whatever the status code.
        match serde_json::from_str::<ResearchResponse>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => Err(status_error(status, &body)),
            Err(err) => Err(TransportError::new(
                FailureKind::Body,
                format!("unexpected research response: {err}"),
            )),
        }
    }

    async fn health(&self) -> Result<HealthStatus, TransportError> {
        let url = self.endpoint("health")?;
        let response = self
            .client
            .get(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        let health = response.json::<HealthStatus>().await.map_err(map_body_error)?;
        research_debug!("Health check answered status={}", health.status);
        Ok(health)
    }
}

/// Builds the error for a non-success status, preferring the message of a
/// JSON failure envelope when the body carries one.
fn status_error(status: StatusCode, body: &str) -> TransportError {
    let message = serde_json::from_str::<ResearchResponse>(body)
        .ok()
        .and_then(|envelope| envelope.message.or(envelope.error))
        .unwrap_or_else(|| status.to_string());
    TransportError::new(FailureKind::HttpStatus(status.as_u16()), message)
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return TransportError::new(FailureKind::InvalidUrl, err.to_string());
    }
    TransportError::new(FailureKind::Network, err.to_string())
}

fn map_body_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::new(FailureKind::Timeout, err.to_string());
    }
    TransportError::new(FailureKind::Body, err.to_string())
}
