//! HTTP transport for the chat-completions image endpoints.
//!
//! Wraps a [`reqwest::Client`] configured with the per-request timeout.
//! Any response that arrives is handed back verbatim; status and body
//! interpretation happen in `genbatch_core::response`.

use std::time::Duration;

use async_trait::async_trait;
use genbatch_core::retry::DEFAULT_REQUEST_TIMEOUT;
use genbatch_core::{Credential, GenerationError, GenerationRequest, RawResponse, Transport};

/// Errors from setting up the upstream layer.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The HTTP client could not be constructed (TLS backend, etc.).
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// HTTP client shared by every worker of a batch.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    /// Create a transport reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling with the result downloader).
    ///
    /// `timeout` is only used in error messages; the client's own
    /// configuration decides when requests are abandoned.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn network_error(&self, e: reqwest::Error) -> GenerationError {
        let detail = if e.is_timeout() {
            format!("request timed out after {}s", self.timeout.as_secs())
        } else if e.is_connect() {
            format!("connection failed: {e}")
        } else {
            e.to_string()
        };
        GenerationError::Network { detail }
    }
}

#[async_trait]
impl Transport for UpstreamClient {
    async fn send(
        &self,
        url: &str,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<RawResponse, GenerationError> {
        tracing::debug!(
            url,
            model = %request.model,
            images = request.image_count(),
            credential = %credential,
            "Sending generation request",
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(credential.expose())
            .json(request)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.network_error(e))?;

        tracing::debug!(url, status, bytes = body.len(), "Upstream responded");
        Ok(RawResponse::new(status, body))
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::with_client(reqwest::Client::new(), DEFAULT_REQUEST_TIMEOUT)
    }
}
