//! HTTP transport for JSON-RPC calls.
//!
//! [`Transport`] is the seam the provider talks through. [`HttpTransport`]
//! POSTs over reqwest; tests substitute scripted transports.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::TransportError;

/// Connection timeout for node requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status and body of an HTTP reply, whatever the status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as JSON to `url`.
    async fn post(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError>;
}

/// reqwest-backed transport with a reusable connection pool.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .build()
            .unwrap_or_default();
        Self { http_client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError> {
        let response = self
            .http_client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(HttpReply { status, body })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Unreachable(format!("request timed out: {e}"))
    } else if e.is_connect() {
        TransportError::Unreachable(format!("connection failed: {e}"))
    } else {
        TransportError::Request(e.to_string())
    }
}
