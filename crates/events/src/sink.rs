//! Destinations for job events besides the batch's own event stream.

use crate::event::{JobEvent, JobEventKind};

/// Receives every event of a batch, in emission order.
///
/// Delivery happens on the batch's aggregator task, so implementations
/// must not block.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &JobEvent);
}

impl<F> EventSink for F
where
    F: Fn(&JobEvent) + Send + Sync,
{
    fn deliver(&self, event: &JobEvent) {
        self(event)
    }
}

/// Writes events to the `tracing` log.
///
/// Failures are logged at `error`, retries and save failures at `warn`,
/// countdown ticks at `debug` and everything else at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn deliver(&self, event: &JobEvent) {
        let job_id = event.job_id.as_str();
        let ticket = event.ticket;
        match &event.kind {
            JobEventKind::Queued => {
                tracing::debug!(job_id, ticket, "Job queued");
            }
            JobEventKind::InFlight { attempt } => {
                tracing::info!(job_id, ticket, attempt, "Generation attempt started");
            }
            JobEventKind::RetryWaiting {
                retry,
                max_retries,
                delay_secs,
                error,
            } => {
                tracing::warn!(
                    job_id,
                    ticket,
                    retry,
                    max_retries,
                    delay_secs,
                    error = %error,
                    "Attempt failed, retrying after backoff",
                );
            }
            JobEventKind::Countdown {
                retry,
                remaining_secs,
            } => {
                tracing::debug!(job_id, ticket, retry, remaining_secs, "Waiting to retry");
            }
            JobEventKind::Succeeded { url } => {
                tracing::info!(job_id, ticket, url = %url, "Image generated");
            }
            JobEventKind::Failed { error } => {
                tracing::error!(job_id, ticket, error = %error, "Job failed");
            }
            JobEventKind::ResultSaved { path } => {
                tracing::info!(job_id, ticket, path = %path.display(), "Image saved");
            }
            JobEventKind::ResultSaveFailed { url, detail } => {
                tracing::warn!(job_id, ticket, url = %url, error = %detail, "Failed to save image");
            }
        }
    }
}
