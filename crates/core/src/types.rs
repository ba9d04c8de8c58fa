//! Shared identifier and secret types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// User-visible job identifier (typically the prompt's row number).
pub type JobId = String;

/// Dispatcher-assigned identifier, unique per submission within a batch.
pub type Ticket = u64;

/// Number of leading characters of a credential that may appear in logs.
const CREDENTIAL_VISIBLE_CHARS: usize = 4;

/// An opaque bearer secret.
///
/// `Debug` and `Display` print a masked form so that a credential never
/// reaches a log line in full. Use [`Credential::expose`] only when
/// building the `Authorization` header.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// First few characters followed by an ellipsis, e.g. `sk-a…`.
    pub fn masked(&self) -> String {
        let visible: String = self.0.chars().take(CREDENTIAL_VISIBLE_CHARS).collect();
        format!("{visible}…")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.masked()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl Serialize for Credential {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.masked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_masked() {
        let cred = Credential::new("sk-abcdef123456");
        assert_eq!(format!("{cred}"), "sk-a…");
        assert_eq!(format!("{cred:?}"), "Credential(\"sk-a…\")");
        assert_eq!(cred.expose(), "sk-abcdef123456");
    }

    #[test]
    fn whitespace_only_is_empty() {
        assert!(Credential::new("   ").is_empty());
        assert!(!Credential::new("k").is_empty());
    }

    #[test]
    fn serializes_masked() {
        let json = serde_json::to_string(&Credential::new("secret-value")).unwrap();
        assert_eq!(json, "\"secr…\"");
    }
}
