//! Interpretation of a raw upstream response into an image URL or a
//! retryable failure.

use serde_json::Value;

use crate::error::{body_excerpt, GenerationError};
use crate::extract::{extract_image_url, Extracted};

/// Status and body of an upstream HTTP exchange, as returned by a
/// [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response carrying `content` in the chat-completions envelope.
    pub fn ok_with_content(content: &str) -> Self {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        });
        Self::new(200, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Text the upstream produced, read from `choices[0].message.content`.
///
/// A body that is not JSON, or whose content field is missing or not a
/// string, is a retryable [`GenerationError::NoImageFound`].
pub fn response_text(body: &str) -> Result<String, GenerationError> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .ok_or_else(|| GenerationError::NoImageFound {
            body_excerpt: body_excerpt(body),
        })
}

/// Turn a response into the extracted image link or the failure to retry.
pub fn interpret_response(response: &RawResponse) -> Result<Extracted, GenerationError> {
    if !response.is_success() {
        return Err(GenerationError::Http {
            status: response.status,
            body_excerpt: body_excerpt(&response.body),
        });
    }
    let text = response_text(&response.body)?;
    extract_image_url(&text).ok_or_else(|| GenerationError::NoImageFound {
        body_excerpt: body_excerpt(&text),
    })
}
