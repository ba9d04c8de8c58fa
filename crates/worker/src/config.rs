use std::path::PathBuf;
use std::time::Duration;

use genbatch_core::job::DEFAULT_MAX_RETRIES;
use genbatch_core::retry::DEFAULT_REQUEST_TIMEOUT;
use genbatch_core::{Credential, ImageModel, Platform};
use genbatch_pipeline::DEFAULT_CONCURRENCY;

/// Errors from reading the worker configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Batch worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub platform: Platform,
    pub model: ImageModel,
    /// API key used for `sora` jobs.
    pub sora_api_key: Credential,
    /// API key used for `nano-banana` jobs.
    pub nano_banana_api_key: Credential,
    /// Worker slots (default: `5`).
    pub thread_count: usize,
    /// Retries per job after the first attempt (default: `3`).
    pub retry_count: u32,
    /// One prompt per line.
    pub prompts_file: PathBuf,
    /// Where downloaded images are written (default: `output`).
    pub output_dir: PathBuf,
    /// Directory of reference images, matched to prompts by file stem.
    pub reference_dir: Option<PathBuf>,
    /// Style text appended to every prompt.
    pub style: Option<String>,
    /// Aspect ratio appended to every prompt, e.g. `16:9`.
    pub image_ratio: Option<String>,
    pub request_timeout: Duration,
    /// Send every request here instead of the platform's endpoint.
    pub upstream_url: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default   |
    /// |------------------------|-----------|
    /// | `API_PLATFORM`         | `yunwu`   |
    /// | `IMAGE_MODEL`          | `sora`    |
    /// | `SORA_API_KEY`         | (empty)   |
    /// | `NANO_BANANA_API_KEY`  | (empty)   |
    /// | `THREAD_COUNT`         | `5`       |
    /// | `RETRY_COUNT`          | `3`       |
    /// | `PROMPTS_FILE`         | required  |
    /// | `OUTPUT_DIR`           | `output`  |
    /// | `REFERENCE_DIR`        | unset     |
    /// | `STYLE`                | unset     |
    /// | `IMAGE_RATIO`          | unset     |
    /// | `REQUEST_TIMEOUT_SECS` | `300`     |
    /// | `UPSTREAM_URL`         | unset     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let platform = parse_or(&var, "API_PLATFORM", Platform::Yunwu)?;
        let model = parse_or(&var, "IMAGE_MODEL", ImageModel::Sora)?;
        let thread_count = parse_or(&var, "THREAD_COUNT", DEFAULT_CONCURRENCY)?;
        let retry_count = parse_or(&var, "RETRY_COUNT", DEFAULT_MAX_RETRIES)?;
        let request_timeout = parse_or(&var, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT.as_secs())
            .map(Duration::from_secs)?;

        if thread_count == 0 {
            return Err(ConfigError::Invalid {
                var: "THREAD_COUNT",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let prompts_file = var("PROMPTS_FILE")
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("PROMPTS_FILE"))?;

        Ok(Self {
            platform,
            model,
            sora_api_key: Credential::new(var("SORA_API_KEY").unwrap_or_default()),
            nano_banana_api_key: Credential::new(var("NANO_BANANA_API_KEY").unwrap_or_default()),
            thread_count,
            retry_count,
            prompts_file,
            output_dir: var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            reference_dir: var("REFERENCE_DIR").map(PathBuf::from),
            style: var("STYLE"),
            image_ratio: var("IMAGE_RATIO"),
            request_timeout,
            upstream_url: var("UPSTREAM_URL"),
        })
    }

    /// The API key for `model`.
    pub fn credential_for(&self, model: ImageModel) -> &Credential {
        match model {
            ImageModel::Sora => &self.sora_api_key,
            ImageModel::NanoBanana => &self.nano_banana_api_key,
        }
    }
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: key,
            reason: e.to_string(),
            value,
        }),
    }
}
