//! Bounded-concurrency batch dispatcher.
//!
//! [`BatchDispatcher::submit`] starts three kinds of Tokio tasks per
//! batch:
//!
//! - a **feeder** that takes submissions off a FIFO queue, waits for a
//!   slot on the batch semaphore and spawns a worker task holding it;
//! - one **worker** task per running job, which keeps its slot until the
//!   job is terminal (backoff included);
//! - an **aggregator**, the single writer of the batch's progress counts,
//!   which forwards every event to the caller's stream (unless disabled
//!   with [`BatchDispatcher::without_event_stream`]) and the optional
//!   external [`EventSink`].

use std::sync::Arc;

use genbatch_core::{
    Endpoints, GenerationError, Job, JobState, RequestBuilder, ResultSink, RetryPolicy, Ticket,
    Transport,
};
use genbatch_events::{BatchProgress, EventSink, JobEvent, ProgressTracker};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::handle::{BatchHandle, EventStream};
use crate::worker::GenerationWorker;

/// Upper bound on worker slots per batch.
pub const MAX_CONCURRENCY: usize = 2000;

/// Worker slots used when the caller does not choose.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Clamp a requested slot count into `1..=MAX_CONCURRENCY`.
pub fn clamp_concurrency(requested: usize) -> usize {
    let clamped = requested.clamp(1, MAX_CONCURRENCY);
    if clamped != requested {
        tracing::warn!(requested, clamped, "Concurrency out of range, clamping");
    }
    clamped
}

/// A job waiting in the batch queue.
pub(crate) struct Submission {
    pub ticket: Ticket,
    pub job: Job,
}

/// Starts batches of jobs against one transport.
///
/// The dispatcher itself holds only configuration; all per-batch state
/// lives in the returned [`BatchHandle`] and its tasks.
pub struct BatchDispatcher {
    transport: Arc<dyn Transport>,
    builder: Arc<RequestBuilder>,
    policy: RetryPolicy,
    endpoints: Arc<Endpoints>,
    event_sink: Option<Arc<dyn EventSink>>,
    result_sink: Option<Arc<dyn ResultSink>>,
    event_stream: bool,
}

impl BatchDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            builder: Arc::new(RequestBuilder::default()),
            policy: RetryPolicy::default(),
            endpoints: Arc::new(Endpoints::default()),
            event_sink: None,
            result_sink: None,
            event_stream: true,
        }
    }

    pub fn with_request_builder(mut self, builder: RequestBuilder) -> Self {
        self.builder = Arc::new(builder);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Arc::new(endpoints);
        self
    }

    /// Also deliver every event to `sink` (e.g. an `EventBus` or
    /// `TracingSink`).
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Persist successful results through `sink`.
    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.result_sink = Some(sink);
        self
    }

    /// Do not keep a per-batch [`EventStream`]; events then only reach the
    /// event sink. [`BatchHandle::events`] returns `None`.
    pub fn without_event_stream(mut self) -> Self {
        self.event_stream = false;
        self
    }

    /// Start a batch running `jobs` on at most `concurrency` slots.
    ///
    /// Up to `concurrency` jobs start immediately; the rest queue in
    /// submission order. Must be called from within a Tokio runtime.
    pub fn submit(&self, jobs: Vec<Job>, concurrency: usize) -> BatchHandle {
        let batch_id = Uuid::now_v7();
        let concurrency = clamp_concurrency(concurrency);
        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, events) = if self.event_stream {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(EventStream::new(rx)))
        } else {
            (None, None)
        };
        let (progress_tx, progress_rx) = watch::channel(BatchProgress::default());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        let worker = GenerationWorker::new(batch_id, Arc::clone(&self.transport), event_tx.clone())
            .with_request_builder(Arc::clone(&self.builder))
            .with_retry_policy(self.policy.clone())
            .with_endpoints(Arc::clone(&self.endpoints))
            .with_result_sink(self.result_sink.clone())
            .with_cancel(cancel.clone());

        tokio::spawn(aggregate(event_rx, out_tx, self.event_sink.clone(), progress_tx));
        tokio::spawn(feed(
            queue_rx,
            Arc::clone(&semaphore),
            cancel.clone(),
            worker.clone(),
        ));

        tracing::info!(
            batch_id = %batch_id,
            jobs = jobs.len(),
            concurrency,
            "Batch started",
        );

        let handle = BatchHandle::new(
            batch_id,
            worker,
            event_tx,
            queue_tx,
            semaphore,
            concurrency,
            cancel,
            progress_rx,
            events,
        );
        handle.submit(jobs);
        handle
    }
}

// ---------------------------------------------------------------------------
// Feeder
// ---------------------------------------------------------------------------

/// Move queued submissions onto free slots, in FIFO order.
///
/// Ends once every queue sender (the batch handle) is gone and the queue
/// is drained.
async fn feed(
    mut queue: mpsc::UnboundedReceiver<Submission>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    worker: GenerationWorker,
) {
    while let Some(Submission { ticket, job }) = queue.recv().await {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            worker.reject(ticket, &job, GenerationError::Cancelled);
            continue;
        };

        let worker = worker.clone();
        tokio::spawn(async move {
            let state = worker.run(ticket, &job).await;
            drop(permit);
            if let JobState::Succeeded { url } = state {
                worker.save_result(ticket, &job.id, &url).await;
            }
        });
    }
    tracing::debug!("Batch queue closed");
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Fold events into progress counts and forward them, in arrival order.
async fn aggregate(
    mut events: mpsc::UnboundedReceiver<JobEvent>,
    mut out: Option<mpsc::UnboundedSender<JobEvent>>,
    sink: Option<Arc<dyn EventSink>>,
    progress: watch::Sender<BatchProgress>,
) {
    let mut tracker = ProgressTracker::new();
    while let Some(event) = events.recv().await {
        let changed = tracker.apply(&event);
        if let Some(sink) = &sink {
            sink.deliver(&event);
        }
        // Stop forwarding once the caller drops its stream.
        if out.as_ref().is_some_and(|tx| tx.send(event).is_err()) {
            out = None;
        }
        // Published last so that a complete snapshot implies every event
        // is already in the stream.
        if changed {
            progress.send_replace(tracker.progress());
        }
    }
    tracing::debug!(summary = %tracker.progress(), "Batch event channel closed");
}
