//! The unit of work and its life-cycle state machine.
//!
//! A [`Job`] is immutable input. Its progress is tracked by a
//! [`JobStatus`], owned by whichever worker runs the job, which only
//! accepts moves permitted by [`JobState::can_transition_to`]:
//!
//! ```text
//! Pending -> InFlight -> (RetryWaiting -> InFlight)* -> Succeeded | Failed
//! ```
//!
//! `Pending -> Failed` covers validation rejection and cancellation before
//! start; `RetryWaiting -> Failed` covers cancellation observed after a
//! backoff wait.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::{CoreError, GenerationError};
use crate::platform::{ImageModel, Platform};
use crate::types::{Credential, JobId};

/// Retry budget used when the caller does not choose one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// ImageReference
// ---------------------------------------------------------------------------

/// A reference image attached to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    /// Raw image bytes held in memory (e.g. a dropped file).
    Inline { name: String, data: Vec<u8> },
    /// An image on the local filesystem, read when the request is built.
    LocalFile { name: String, path: PathBuf },
    /// An image the upstream fetches itself.
    Remote { name: String, url: String },
}

impl ImageReference {
    pub fn name(&self) -> &str {
        match self {
            Self::Inline { name, .. } | Self::LocalFile { name, .. } | Self::Remote { name, .. } => {
                name
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One prompt's generation request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub prompt: String,
    pub references: Vec<ImageReference>,
    pub platform: Platform,
    pub model: ImageModel,
    pub max_retries: u32,
    pub credential: Credential,
}

impl Job {
    /// A job with no references, the default platform/model and retry budget.
    pub fn new(id: impl Into<JobId>, prompt: impl Into<String>, credential: Credential) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            references: Vec::new(),
            platform: Platform::Yunwu,
            model: ImageModel::Sora,
            max_retries: DEFAULT_MAX_RETRIES,
            credential,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_model(mut self, model: ImageModel) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_reference(mut self, reference: ImageReference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_references(mut self, references: impl IntoIterator<Item = ImageReference>) -> Self {
        self.references.extend(references);
        self
    }

    /// Reject jobs that must never reach the network.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        if self.credential.is_empty() {
            return Err(GenerationError::EmptyCredential);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Snapshot of where a job is in its life-cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    /// Attempt number, 1-based.
    InFlight { attempt: u32 },
    /// Waiting before retry number `retry` (1-based).
    RetryWaiting { retry: u32, remaining_secs: u64 },
    Succeeded { url: String },
    Failed { error: GenerationError },
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight { .. } => "in_flight",
            Self::RetryWaiting { .. } => "retry_waiting",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    /// Whether the life-cycle permits moving from `self` to `next`.
    ///
    /// Attempt and retry counters must advance by exactly one: a retry
    /// follows the attempt with the same number, and the next attempt is
    /// numbered one past the retry it waited for.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, InFlight { attempt }) => *attempt == 1,
            (Pending, Failed { .. }) => true,
            (InFlight { attempt }, RetryWaiting { retry, .. }) => retry == attempt,
            (InFlight { .. }, Succeeded { .. } | Failed { .. }) => true,
            (RetryWaiting { retry, .. }, InFlight { attempt }) => *attempt == retry + 1,
            (RetryWaiting { .. }, Failed { .. }) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Mutable status of one job, enforcing the life-cycle.
#[derive(Debug, Clone)]
pub struct JobStatus {
    job_id: JobId,
    max_retries: u32,
    state: JobState,
}

impl JobStatus {
    pub fn new(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            max_retries: job.max_retries,
            state: JobState::Pending,
        }
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Move to `next`, or fail without changing anything.
    ///
    /// Besides the life-cycle rules, a retry number above the job's
    /// `max_retries` is rejected.
    pub fn advance(&mut self, next: JobState) -> Result<&JobState, CoreError> {
        let within_budget = match &next {
            JobState::RetryWaiting { retry, .. } => *retry <= self.max_retries,
            _ => true,
        };
        if !within_budget || !self.state.can_transition_to(&next) {
            return Err(CoreError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn job() -> Job {
        Job::new("1", "a red fox", Credential::new("key")).with_max_retries(2)
    }

    #[test]
    fn new_job_uses_defaults() {
        let job = Job::new("7", "cat", Credential::new("k"));
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(job.platform, Platform::Yunwu);
        assert_eq!(job.model, ImageModel::Sora);
        assert!(job.references.is_empty());
    }

    #[test]
    fn validate_rejects_blank_prompt_and_credential() {
        let blank = Job::new("1", "  ", Credential::new("k"));
        assert_eq!(blank.validate(), Err(GenerationError::EmptyPrompt));
        let no_key = Job::new("1", "cat", Credential::new(""));
        assert_eq!(no_key.validate(), Err(GenerationError::EmptyCredential));
        assert!(job().validate().is_ok());
    }

    #[test]
    fn happy_path_with_retries() {
        let mut status = JobStatus::new(&job());
        status.advance(JobState::InFlight { attempt: 1 }).unwrap();
        status
            .advance(JobState::RetryWaiting {
                retry: 1,
                remaining_secs: 30,
            })
            .unwrap();
        status.advance(JobState::InFlight { attempt: 2 }).unwrap();
        status
            .advance(JobState::Succeeded {
                url: "http://x/img.png".into(),
            })
            .unwrap();
        assert!(status.state().is_terminal());
    }

    #[test]
    fn terminal_state_is_final() {
        let mut status = JobStatus::new(&job());
        status.advance(JobState::InFlight { attempt: 1 }).unwrap();
        status
            .advance(JobState::Failed {
                error: GenerationError::Cancelled,
            })
            .unwrap();
        let err = status.advance(JobState::InFlight { attempt: 2 }).unwrap_err();
        assert_matches!(err, CoreError::InvalidTransition { from: "failed", .. });
    }

    #[test]
    fn retry_beyond_budget_is_rejected() {
        let mut status = JobStatus::new(&job());
        status.advance(JobState::InFlight { attempt: 1 }).unwrap();
        status
            .advance(JobState::RetryWaiting {
                retry: 1,
                remaining_secs: 30,
            })
            .unwrap();
        status.advance(JobState::InFlight { attempt: 2 }).unwrap();
        status
            .advance(JobState::RetryWaiting {
                retry: 2,
                remaining_secs: 60,
            })
            .unwrap();
        status.advance(JobState::InFlight { attempt: 3 }).unwrap();
        assert!(status
            .advance(JobState::RetryWaiting {
                retry: 3,
                remaining_secs: 90,
            })
            .is_err());
    }

    #[test]
    fn skipped_states_are_rejected() {
        assert!(!JobState::Pending.can_transition_to(&JobState::Succeeded { url: "u".into() }));
        assert!(!JobState::InFlight { attempt: 1 }.can_transition_to(&JobState::InFlight { attempt: 2 }));
        assert!(!JobState::RetryWaiting {
            retry: 1,
            remaining_secs: 0
        }
        .can_transition_to(&JobState::InFlight { attempt: 3 }));
        assert!(!JobState::Pending.can_transition_to(&JobState::InFlight { attempt: 2 }));
    }

    #[test]
    fn reference_name_covers_every_variant() {
        let refs = [
            ImageReference::Inline {
                name: "a".into(),
                data: vec![],
            },
            ImageReference::LocalFile {
                name: "b".into(),
                path: "b.png".into(),
            },
            ImageReference::Remote {
                name: "c".into(),
                url: "http://c".into(),
            },
        ];
        let names: Vec<&str> = refs.iter().map(ImageReference::name).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
