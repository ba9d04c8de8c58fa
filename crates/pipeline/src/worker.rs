//! One job's attempt/retry loop.
//!
//! A [`GenerationWorker`] drives a single job submission from `Pending`
//! to a terminal state, reporting every step as a [`JobEvent`]:
//!
//! ```text
//! jitter -> InFlight{n} -> send -> interpret
//!     ok   -> Succeeded
//!     err  -> RetryWaiting{n} -> countdown -> InFlight{n+1} ...
//!          -> Failed(RetriesExhausted) once the budget is spent
//! ```
//!
//! The worker never returns an error: every failure ends up in a
//! `Failed` event.

use std::sync::Arc;
use std::time::Duration;

use genbatch_core::response::interpret_response;
use genbatch_core::{
    Endpoints, GenerationError, Job, JobId, JobState, JobStatus, RequestBuilder, ResultSink,
    RetryPolicy, Ticket, Transport,
};
use genbatch_events::{JobEvent, JobEventKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runs jobs against a [`Transport`] and reports their progress.
///
/// Cheap to clone; every clone shares the transport, the cancellation
/// token and the event channel.
#[derive(Clone)]
pub struct GenerationWorker {
    batch_id: Uuid,
    transport: Arc<dyn Transport>,
    builder: Arc<RequestBuilder>,
    policy: RetryPolicy,
    endpoints: Arc<Endpoints>,
    result_sink: Option<Arc<dyn ResultSink>>,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<JobEvent>,
}

impl GenerationWorker {
    pub fn new(
        batch_id: Uuid,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<JobEvent>,
    ) -> Self {
        Self {
            batch_id,
            transport,
            builder: Arc::new(RequestBuilder::default()),
            policy: RetryPolicy::default(),
            endpoints: Arc::new(Endpoints::default()),
            result_sink: None,
            cancel: CancellationToken::new(),
            events,
        }
    }

    pub fn with_request_builder(mut self, builder: Arc<RequestBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Arc<Endpoints>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_result_sink(mut self, sink: Option<Arc<dyn ResultSink>>) -> Self {
        self.result_sink = sink;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn has_result_sink(&self) -> bool {
        self.result_sink.is_some()
    }

    /// Drive `job` to a terminal state and return it.
    pub async fn run(&self, ticket: Ticket, job: &Job) -> JobState {
        let mut status = JobStatus::new(job);

        if let Err(error) = job.validate() {
            return self.fail(&mut status, ticket, &job.id, error);
        }
        let request = match self.builder.build(job).await {
            Ok(request) => request,
            Err(error) => return self.fail(&mut status, ticket, &job.id, error),
        };
        let url = self.endpoints.url_for(job.platform);

        let mut attempt: u32 = 1;
        loop {
            tokio::time::sleep(self.policy.jitter()).await;
            if self.cancel.is_cancelled() {
                return self.fail(&mut status, ticket, &job.id, GenerationError::Cancelled);
            }

            self.transition(&mut status, ticket, &job.id, JobEventKind::InFlight { attempt });

            let outcome = match self.transport.send(url, &job.credential, &request).await {
                Ok(response) => interpret_response(&response),
                Err(error) => Err(error),
            };

            let error = match outcome {
                Ok(extracted) => {
                    tracing::debug!(
                        job_id = %job.id,
                        ticket,
                        attempt,
                        rule = ?extracted.rule,
                        "Image URL extracted",
                    );
                    self.transition(
                        &mut status,
                        ticket,
                        &job.id,
                        JobEventKind::Succeeded { url: extracted.url },
                    );
                    return status.state().clone();
                }
                Err(error) => error,
            };

            if attempt > job.max_retries {
                let exhausted = GenerationError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                };
                return self.fail(&mut status, ticket, &job.id, exhausted);
            }

            let retry = attempt;
            let delay = self.policy.delay_for(retry);
            self.transition(
                &mut status,
                ticket,
                &job.id,
                JobEventKind::RetryWaiting {
                    retry,
                    max_retries: job.max_retries,
                    delay_secs: delay.as_secs(),
                    error,
                },
            );
            self.wait_out(ticket, &job.id, retry, delay).await;
            attempt += 1;
        }
    }

    /// Fail a job that never got a slot (validation or cancellation).
    pub fn reject(&self, ticket: Ticket, job: &Job, error: GenerationError) -> JobState {
        let mut status = JobStatus::new(job);
        self.fail(&mut status, ticket, &job.id, error)
    }

    /// Hand a successful result to the result sink, if there is one.
    ///
    /// The outcome is reported as `ResultSaved` or `ResultSaveFailed`;
    /// neither changes the job's terminal state.
    pub async fn save_result(&self, ticket: Ticket, job_id: &JobId, url: &str) {
        let Some(sink) = &self.result_sink else {
            return;
        };
        let kind = match sink.save(job_id, url).await {
            Ok(path) => JobEventKind::ResultSaved { path },
            Err(e) => JobEventKind::ResultSaveFailed {
                url: url.to_string(),
                detail: e.to_string(),
            },
        };
        self.emit(ticket, job_id, kind);
    }

    /// Sleep through the backoff delay, reporting the remaining time.
    ///
    /// Cancellation does not cut the wait short; it is observed before
    /// the next attempt.
    async fn wait_out(&self, ticket: Ticket, job_id: &JobId, retry: u32, delay: Duration) {
        for remaining in self.policy.countdown(delay) {
            self.emit(
                ticket,
                job_id,
                JobEventKind::Countdown {
                    retry,
                    remaining_secs: remaining.as_secs(),
                },
            );
            let step = if self.policy.countdown_interval.is_zero() {
                remaining
            } else {
                remaining.min(self.policy.countdown_interval)
            };
            tokio::time::sleep(step).await;
        }
    }

    fn fail(
        &self,
        status: &mut JobStatus,
        ticket: Ticket,
        job_id: &JobId,
        error: GenerationError,
    ) -> JobState {
        self.transition(status, ticket, job_id, JobEventKind::Failed { error });
        status.state().clone()
    }

    fn transition(&self, status: &mut JobStatus, ticket: Ticket, job_id: &JobId, kind: JobEventKind) {
        if let Some(next) = kind.state() {
            if let Err(e) = status.advance(next) {
                tracing::error!(job_id = %job_id, ticket, error = %e, "Dropping invalid job event");
                return;
            }
        }
        self.emit(ticket, job_id, kind);
    }

    fn emit(&self, ticket: Ticket, job_id: &JobId, kind: JobEventKind) {
        // Only fails once the aggregator is gone, i.e. nobody is listening.
        let _ = self
            .events
            .send(JobEvent::new(self.batch_id, ticket, job_id.clone(), kind));
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use genbatch_core::{Credential, GenerationRequest, RawResponse};

    use super::*;

    /// Replays canned responses, then keeps failing with HTTP 500.
    struct Scripted(Mutex<VecDeque<RawResponse>>);

    impl Scripted {
        fn new(responses: impl IntoIterator<Item = RawResponse>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(responses.into_iter().collect())))
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(
            &self,
            _url: &str,
            _credential: &Credential,
            _request: &GenerationRequest,
        ) -> Result<RawResponse, GenerationError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| RawResponse::new(500, "boom")))
        }
    }

    fn worker(transport: Arc<dyn Transport>) -> (GenerationWorker, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (GenerationWorker::new(Uuid::nil(), transport, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> Vec<JobEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success() {
        let (worker, mut rx) = worker(Scripted::new([RawResponse::ok_with_content(
            "![图片](https://cdn.example/a.png)",
        )]));
        let job = Job::new("1", "a cat", Credential::new("k"));

        let state = worker.run(0, &job).await;

        assert_eq!(
            state,
            JobState::Succeeded {
                url: "https://cdn.example/a.png".into()
            }
        );
        assert_eq!(
            drain(&mut rx),
            [
                JobEventKind::InFlight { attempt: 1 },
                JobEventKind::Succeeded {
                    url: "https://cdn.example/a.png".into()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_with_last_error() {
        let (worker, mut rx) = worker(Scripted::new([]));
        let job = Job::new("1", "a cat", Credential::new("k")).with_max_retries(1);

        let state = worker.run(0, &job).await;

        assert_matches!(
            state,
            JobState::Failed {
                error: GenerationError::RetriesExhausted { attempts: 2, ref last }
            } if matches!(**last, GenerationError::Http { status: 500, .. })
        );

        let kinds = drain(&mut rx);
        let transitions: Vec<&str> = kinds
            .iter()
            .filter(|k| k.is_transition())
            .map(|k| k.name())
            .collect();
        assert_eq!(transitions, ["in_flight", "retry_waiting", "in_flight", "failed"]);

        let countdown: Vec<u64> = kinds
            .iter()
            .filter_map(|k| match k {
                JobEventKind::Countdown { remaining_secs, .. } => Some(*remaining_secs),
                _ => None,
            })
            .collect();
        assert_eq!(countdown, [30, 25, 20, 15, 10, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_job_is_rejected_without_sending() {
        let (worker, mut rx) = worker(Scripted::new([]));
        let job = Job::new("1", "", Credential::new("k"));

        let state = worker.run(0, &job).await;

        assert_eq!(
            state,
            JobState::Failed {
                error: GenerationError::EmptyPrompt
            }
        );
        assert_eq!(
            drain(&mut rx),
            [JobEventKind::Failed {
                error: GenerationError::EmptyPrompt
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_attempt() {
        let (worker, mut rx) = worker(Scripted::new([RawResponse::ok_with_content(
            "https://cdn.example/a.png",
        )]));
        let cancel = CancellationToken::new();
        let worker = worker.with_cancel(cancel.clone());
        cancel.cancel();

        let state = worker
            .run(0, &Job::new("1", "a cat", Credential::new("k")))
            .await;

        assert_eq!(
            state,
            JobState::Failed {
                error: GenerationError::Cancelled
            }
        );
        assert_eq!(drain(&mut rx).len(), 1);
    }
}
