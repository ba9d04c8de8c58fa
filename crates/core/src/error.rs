use serde::Serialize;

use crate::types::JobId;

/// Errors raised by domain validation and state bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: &'static str,
        to: &'static str,
    },

    #[error("Unknown {kind} '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

/// How a [`GenerationError`] is treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected before dispatch; never retried.
    Validation,
    /// A single attempt failed; retried up to the job's budget.
    Transient,
    /// The job is over; never retried automatically.
    Terminal,
}

/// Why an attempt, or a whole job, did not produce an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("Credential must not be empty")]
    EmptyCredential,

    /// Connection, TLS, DNS or timeout failure before a response arrived.
    #[error("Network error: {detail}")]
    Network { detail: String },

    /// Upstream answered with a non-2xx status.
    #[error("Upstream returned HTTP {status}: {body_excerpt}")]
    Http { status: u16, body_excerpt: String },

    /// A 2xx response whose text carries no recognisable image link.
    #[error("No image URL found in response: {body_excerpt}")]
    NoImageFound { body_excerpt: String },

    #[error("Request failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GenerationError>,
    },

    #[error("Batch was cancelled before the job completed")]
    Cancelled,
}

impl GenerationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyPrompt | Self::EmptyCredential => ErrorClass::Validation,
            Self::Network { .. } | Self::Http { .. } | Self::NoImageFound { .. } => {
                ErrorClass::Transient
            }
            Self::RetriesExhausted { .. } | Self::Cancelled => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// HTTP status of the underlying failure, looking through
    /// [`GenerationError::RetriesExhausted`].
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.upstream_status(),
            _ => None,
        }
    }
}

/// Maximum number of characters of an upstream body kept in errors.
pub const BODY_EXCERPT_CHARS: usize = 500;

/// Truncate `body` to [`BODY_EXCERPT_CHARS`] characters on a char boundary.
pub fn body_excerpt(body: &str) -> String {
    match body.char_indices().nth(BODY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_follow_taxonomy() {
        assert_eq!(GenerationError::EmptyPrompt.class(), ErrorClass::Validation);
        assert_eq!(
            GenerationError::Network {
                detail: "reset".into()
            }
            .class(),
            ErrorClass::Transient
        );
        assert_eq!(GenerationError::Cancelled.class(), ErrorClass::Terminal);
        assert!(!GenerationError::EmptyCredential.is_retryable());
    }

    #[test]
    fn upstream_status_looks_through_exhaustion() {
        let err = GenerationError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GenerationError::Http {
                status: 429,
                body_excerpt: "slow down".into(),
            }),
        };
        assert_eq!(err.upstream_status(), Some(429));
        assert_eq!(GenerationError::Cancelled.upstream_status(), None);
    }

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let body = "图".repeat(BODY_EXCERPT_CHARS + 10);
        let excerpt = body_excerpt(&body);
        assert!(excerpt.ends_with("..."));
        assert_eq!(excerpt.chars().count(), BODY_EXCERPT_CHARS + 3);
    }

    #[test]
    fn core_errors_render() {
        let err = CoreError::InvalidTransition {
            job_id: "7".into(),
            from: "succeeded",
            to: "in_flight",
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition for job 7: succeeded -> in_flight"
        );
        let err = CoreError::UnknownVariant {
            kind: "platform",
            value: "midjourney".into(),
        };
        assert_eq!(err.to_string(), "Unknown platform 'midjourney'");
    }

    #[test]
    fn short_body_kept_verbatim() {
        assert_eq!(body_excerpt("bad gateway"), "bad gateway");
    }
}
