//! Wire-format request construction.
//!
//! [`RequestBuilder`] turns a [`Job`] into the chat-completions payload the
//! upstream expects: a fixed system message followed by a user message
//! whose first part is the prompt and whose remaining parts are the
//! reference images in job order.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::error::GenerationError;
use crate::job::{ImageReference, Job};
use crate::platform::ModelTable;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on generated tokens per request.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Sampling temperature sent with every request.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// System message prepended to every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI image generator. Generate high-quality \
images based on user text descriptions. Always provide the generated image URL in the response.";

/// MIME type used when neither the file name nor the bytes identify one.
pub const FALLBACK_MIME: &str = "image/png";

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

/// The JSON body POSTed to the upstream endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    /// Number of image parts in the user message.
    pub fn image_count(&self) -> usize {
        self.messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Parts(parts) => Some(parts),
                MessageContent::Text(_) => None,
            })
            .flatten()
            .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Generation parameters shared by every job of a dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Builds [`GenerationRequest`]s from jobs.
#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    table: ModelTable,
    params: GenerationParams,
}

impl RequestBuilder {
    pub fn new(table: ModelTable, params: GenerationParams) -> Self {
        Self { table, params }
    }

    pub fn table(&self) -> &ModelTable {
        &self.table
    }

    /// Build the payload for `job`.
    ///
    /// Only an empty prompt fails. References that cannot be resolved
    /// (unreadable files, empty URLs) are skipped with a warning.
    pub async fn build(&self, job: &Job) -> Result<GenerationRequest, GenerationError> {
        if job.prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }

        let mut parts = vec![ContentPart::Text {
            text: job.prompt.clone(),
        }];
        for reference in &job.references {
            if let Some(url) = resolve_reference(reference).await {
                parts.push(ContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                });
            }
        }

        Ok(GenerationRequest {
            model: self.table.resolve(job.platform, job.model).to_string(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: MessageContent::Text(self.params.system_prompt.clone()),
                },
                ChatMessage {
                    role: Role::User,
                    content: MessageContent::Parts(parts),
                },
            ],
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
        })
    }
}

/// Resolve a reference to the URL placed in the payload.
async fn resolve_reference(reference: &ImageReference) -> Option<String> {
    match reference {
        ImageReference::Inline { name, data } => {
            if data.is_empty() {
                tracing::warn!(reference = %name, "Skipping empty inline reference image");
                return None;
            }
            tracing::debug!(reference = %name, bytes = data.len(), "Adding inline reference image");
            Some(data_uri(sniff_mime(data), data))
        }
        ImageReference::LocalFile { name, path } => match tokio::fs::read(path).await {
            Ok(data) => {
                let mime = mime_for_path(path).unwrap_or_else(|| sniff_mime(&data));
                tracing::debug!(reference = %name, path = %path.display(), "Adding local reference image");
                Some(data_uri(mime, &data))
            }
            Err(e) => {
                tracing::warn!(
                    reference = %name,
                    path = %path.display(),
                    error = %e,
                    "Skipping unreadable reference image",
                );
                None
            }
        },
        ImageReference::Remote { name, url } => {
            if url.trim().is_empty() {
                tracing::warn!(reference = %name, "Skipping reference image with empty URL");
                return None;
            }
            tracing::debug!(reference = %name, url = %url, "Adding remote reference image");
            Some(url.clone())
        }
    }
}

/// `data:{mime};base64,{payload}`.
pub fn data_uri(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(data))
}

/// MIME type implied by a file extension, if recognised.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    image::ImageFormat::from_path(path)
        .ok()
        .map(|format| format.to_mime_type())
}

/// MIME type sniffed from magic bytes, defaulting to [`FALLBACK_MIME`].
pub fn sniff_mime(data: &[u8]) -> &'static str {
    image::guess_format(data)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
}
