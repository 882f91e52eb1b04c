//! transport.rs
//! Fetches one JSON payload per poll cycle.
//! - `TransportClient` is the seam the poll loop depends on; tests and `--demo` plug in their own
//! - `HttpTransport` issues `GET base_url + endpoint` with a per-request timeout

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a cycle produced no payload. Every variant is recovered by skipping the cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("malformed JSON: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Transport(e.to_string()),
        }
    }
}

#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn fetch_json(&self, endpoint: &str) -> Result<Value, FetchError>;
}

/// reqwest-backed transport against the dashboard backend.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl TransportClient for HttpTransport {
    async fn fetch_json(&self, endpoint: &str) -> Result<Value, FetchError> {
        let url = self.url(endpoint);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
