//! Upstream platforms, image models and the platform × model lookup table.
//!
//! The wire model string sent to the upstream API depends on both the
//! platform and the selected image model. [`ModelTable`] holds that
//! mapping explicitly; combinations missing from the table resolve to
//! [`DEFAULT_WIRE_MODEL`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Wire model used when a platform × model pair is not in the table.
pub const DEFAULT_WIRE_MODEL: &str = "sora";

/// Chat-completions endpoint of the Yunwu platform.
pub const YUNWU_ENDPOINT: &str = "https://yunwu.ai/v1/chat/completions";

/// Chat-completions endpoint of the APICore platform.
pub const APICORE_ENDPOINT: &str = "https://api.apicore.ai/v1/chat/completions";

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// A supported upstream back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Yunwu,
    ApiCore,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Yunwu, Platform::ApiCore];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yunwu => "yunwu",
            Self::ApiCore => "apicore",
        }
    }

    /// Default chat-completions endpoint for this platform.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Yunwu => YUNWU_ENDPOINT,
            Self::ApiCore => APICORE_ENDPOINT,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yunwu" | "云雾" => Ok(Self::Yunwu),
            "apicore" | "api_core" => Ok(Self::ApiCore),
            other => Err(CoreError::UnknownVariant {
                kind: "platform",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ImageModel
// ---------------------------------------------------------------------------

/// A user-selectable image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageModel {
    Sora,
    NanoBanana,
}

impl ImageModel {
    pub const ALL: [ImageModel; 2] = [ImageModel::Sora, ImageModel::NanoBanana];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sora => "sora",
            Self::NanoBanana => "nano-banana",
        }
    }
}

impl fmt::Display for ImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageModel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sora" => Ok(Self::Sora),
            "nano-banana" | "nano_banana" | "fal-ai/nano-banana" => Ok(Self::NanoBanana),
            other => Err(CoreError::UnknownVariant {
                kind: "image model",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ModelTable
// ---------------------------------------------------------------------------

/// Explicit platform × model → wire model string mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTable {
    entries: HashMap<(Platform, ImageModel), String>,
}

impl ModelTable {
    /// A table with no entries; every lookup falls back to the default.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace a mapping.
    pub fn with_entry(
        mut self,
        platform: Platform,
        model: ImageModel,
        wire: impl Into<String>,
    ) -> Self {
        self.entries.insert((platform, model), wire.into());
        self
    }

    /// Wire string for a pair, if one is mapped.
    pub fn get(&self, platform: Platform, model: ImageModel) -> Option<&str> {
        self.entries.get(&(platform, model)).map(String::as_str)
    }

    /// Wire string for a pair, falling back to [`DEFAULT_WIRE_MODEL`].
    pub fn resolve(&self, platform: Platform, model: ImageModel) -> &str {
        self.get(platform, model).unwrap_or(DEFAULT_WIRE_MODEL)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModelTable {
    /// The mapping used by both supported platforms.
    fn default() -> Self {
        Self::empty()
            .with_entry(Platform::Yunwu, ImageModel::Sora, "sora")
            .with_entry(Platform::Yunwu, ImageModel::NanoBanana, "fal-ai/nano-banana")
            .with_entry(Platform::ApiCore, ImageModel::Sora, "sora")
            .with_entry(Platform::ApiCore, ImageModel::NanoBanana, "fal-ai/nano-banana")
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Per-platform endpoint URLs, overridable for proxies and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    overrides: HashMap<Platform, String>,
}

impl Endpoints {
    /// Route every platform to the same URL.
    pub fn uniform(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            overrides: Platform::ALL.iter().map(|p| (*p, url.clone())).collect(),
        }
    }

    pub fn with_override(mut self, platform: Platform, url: impl Into<String>) -> Self {
        self.overrides.insert(platform, url.into());
        self
    }

    pub fn url_for(&self, platform: Platform) -> &str {
        self.overrides
            .get(&platform)
            .map(String::as_str)
            .unwrap_or_else(|| platform.endpoint())
    }
}
