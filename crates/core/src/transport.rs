//! Seams to the outside world: the upstream HTTP transport and the sink
//! that persists generated images.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::request::GenerationRequest;
use crate::response::RawResponse;
use crate::types::{Credential, JobId};

/// Sends one generation request upstream.
///
/// Implementations return the raw status and body for any response that
/// arrived, and [`GenerationError::Network`] when none did (including
/// timeouts). Status interpretation is left to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        credential: &Credential,
        request: &GenerationRequest,
    ) -> Result<RawResponse, GenerationError>;
}

/// Errors from persisting a generated image.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Download failed: {0}")]
    Download(String),

    #[error("Download returned HTTP {0}")]
    Status(u16),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persists the image behind a successful result URL.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Store the image for `job_id` and return where it was written.
    async fn save(&self, job_id: &JobId, url: &str) -> Result<PathBuf, SinkError>;
}
