//! The event envelope delivered for every job status change.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use genbatch_core::{GenerationError, JobId, JobState, Ticket};
use serde::Serialize;
use uuid::Uuid;

/// What happened to a job.
///
/// Most variants are life-cycle transitions (see [`JobEventKind::state`]).
/// `Countdown` reports progress inside `RetryWaiting`; `ResultSaved` and
/// `ResultSaveFailed` report what the result sink did after success and
/// never change the job's terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// Accepted by the dispatcher, waiting for a worker slot.
    Queued,

    /// An attempt is starting (1-based).
    InFlight { attempt: u32 },

    /// The last attempt failed; retry `retry` of `max_retries` starts
    /// after `delay_secs`.
    RetryWaiting {
        retry: u32,
        max_retries: u32,
        delay_secs: u64,
        error: GenerationError,
    },

    /// Still waiting for retry `retry`.
    Countdown { retry: u32, remaining_secs: u64 },

    Succeeded { url: String },

    Failed { error: GenerationError },

    ResultSaved { path: PathBuf },

    ResultSaveFailed { url: String, detail: String },
}

impl JobEventKind {
    /// The state this event moves the job into, if it is a transition.
    pub fn state(&self) -> Option<JobState> {
        match self {
            Self::Queued => Some(JobState::Pending),
            Self::InFlight { attempt } => Some(JobState::InFlight { attempt: *attempt }),
            Self::RetryWaiting {
                retry, delay_secs, ..
            } => Some(JobState::RetryWaiting {
                retry: *retry,
                remaining_secs: *delay_secs,
            }),
            Self::Succeeded { url } => Some(JobState::Succeeded { url: url.clone() }),
            Self::Failed { error } => Some(JobState::Failed {
                error: error.clone(),
            }),
            Self::Countdown { .. } | Self::ResultSaved { .. } | Self::ResultSaveFailed { .. } => {
                None
            }
        }
    }

    pub fn is_transition(&self) -> bool {
        self.state().is_some()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    /// Short stable name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight { .. } => "in_flight",
            Self::RetryWaiting { .. } => "retry_waiting",
            Self::Countdown { .. } => "countdown",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::ResultSaved { .. } => "result_saved",
            Self::ResultSaveFailed { .. } => "result_save_failed",
        }
    }
}

/// One event for one job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEvent {
    /// Batch the submission belongs to.
    pub batch_id: Uuid,
    /// Unique per submission; the same job submitted twice gets two tickets.
    pub ticket: Ticket,
    /// Caller's identifier for the job.
    pub job_id: JobId,
    pub kind: JobEventKind,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(batch_id: Uuid, ticket: Ticket, job_id: impl Into<JobId>, kind: JobEventKind) -> Self {
        Self {
            batch_id,
            ticket,
            job_id: job_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}
