//! The caller's view of a running batch.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use genbatch_core::{GenerationError, Job, Ticket};
use genbatch_events::{BatchProgress, JobEvent, JobEventKind};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::dispatcher::{clamp_concurrency, Submission};
use crate::worker::GenerationWorker;

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

/// Every event of a batch, ordered per job and interleaved across jobs.
///
/// Ends once the batch handle is dropped and all its jobs have finished.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<JobEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<JobEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }

    /// The next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = JobEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<JobEvent>> {
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// BatchHandle
// ---------------------------------------------------------------------------

/// Handle to a batch started by
/// [`BatchDispatcher::submit`](crate::BatchDispatcher::submit).
///
/// Dropping the handle does not cancel the batch: queued and running jobs
/// still finish, but no more jobs can be added.
pub struct BatchHandle {
    batch_id: Uuid,
    worker: GenerationWorker,
    event_tx: mpsc::UnboundedSender<JobEvent>,
    queue_tx: mpsc::UnboundedSender<Submission>,
    semaphore: Arc<Semaphore>,
    concurrency: Mutex<usize>,
    cancel: CancellationToken,
    next_ticket: AtomicU64,
    submitted: AtomicUsize,
    progress: watch::Receiver<BatchProgress>,
    events: Option<EventStream>,
}

impl BatchHandle {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        batch_id: Uuid,
        worker: GenerationWorker,
        event_tx: mpsc::UnboundedSender<JobEvent>,
        queue_tx: mpsc::UnboundedSender<Submission>,
        semaphore: Arc<Semaphore>,
        concurrency: usize,
        cancel: CancellationToken,
        progress: watch::Receiver<BatchProgress>,
        events: Option<EventStream>,
    ) -> Self {
        Self {
            batch_id,
            worker,
            event_tx,
            queue_tx,
            semaphore,
            concurrency: Mutex::new(concurrency),
            cancel,
            next_ticket: AtomicU64::new(0),
            submitted: AtomicUsize::new(0),
            progress,
            events,
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Take the batch's event stream. Returns `None` after the first call,
    /// or always when the dispatcher was built without one.
    ///
    /// Events are buffered until the stream is read; drop it to discard
    /// them.
    pub fn events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Add jobs to the running batch and return their tickets.
    ///
    /// The jobs queue behind everything already submitted. Jobs that fail
    /// validation are failed immediately without taking a slot; after
    /// [`cancel`](Self::cancel) every new job fails with `Cancelled`.
    pub fn submit(&self, jobs: Vec<Job>) -> Vec<Ticket> {
        let mut tickets = Vec::with_capacity(jobs.len());
        for job in jobs {
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            self.submitted.fetch_add(1, Ordering::SeqCst);
            tickets.push(ticket);

            let _ = self.event_tx.send(JobEvent::new(
                self.batch_id,
                ticket,
                job.id.clone(),
                JobEventKind::Queued,
            ));

            if let Err(error) = job.validate() {
                tracing::debug!(job_id = %job.id, ticket, error = %error, "Job rejected");
                self.worker.reject(ticket, &job, error);
                continue;
            }
            if let Err(mpsc::error::SendError(Submission { ticket, job })) =
                self.queue_tx.send(Submission { ticket, job })
            {
                tracing::error!(job_id = %job.id, ticket, "Batch queue closed, failing job");
                self.worker.reject(ticket, &job, GenerationError::Cancelled);
            }
        }
        tickets
    }

    /// Stop starting attempts.
    ///
    /// Queued jobs fail with `Cancelled` without reaching the network.
    /// Jobs waiting to retry finish their wait and then fail with
    /// `Cancelled`. Requests already in flight run to completion.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(batch_id = %self.batch_id, "Batch cancelled");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resize the worker pool.
    ///
    /// Growing takes effect immediately. Shrinking never interrupts a
    /// running job; the extra slots are retired as jobs finish.
    pub fn set_concurrency(&self, concurrency: usize) {
        let target = clamp_concurrency(concurrency);
        let mut current = match self.concurrency.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if target > *current {
            self.semaphore.add_permits(target - *current);
        } else if target < *current {
            let surplus = *current - target;
            let outstanding = surplus - self.semaphore.forget_permits(surplus);
            if outstanding > 0 {
                // Slots held by running jobs are retired when released.
                let semaphore = Arc::clone(&self.semaphore);
                tokio::spawn(async move {
                    if let Ok(permits) = semaphore.acquire_many_owned(outstanding as u32).await {
                        permits.forget();
                    }
                });
            }
        }
        tracing::info!(batch_id = %self.batch_id, from = *current, to = target, "Concurrency changed");
        *current = target;
    }

    pub fn concurrency(&self) -> usize {
        match self.concurrency.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Latest aggregate counts.
    pub fn progress(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    /// Whether every job submitted so far is in a terminal state.
    pub fn is_complete(&self) -> bool {
        let submitted = self.submitted.load(Ordering::SeqCst);
        let progress = self.progress();
        progress.submitted == submitted && progress.completed() == submitted
    }

    /// Wait until every job submitted so far is terminal and, when a
    /// result sink is configured, every success has been saved or has
    /// failed to save. Returns the final counts.
    pub async fn wait(&self) -> BatchProgress {
        let submitted = self.submitted.load(Ordering::SeqCst);
        let saving = self.worker.has_result_sink();
        let mut rx = self.progress.clone();
        let settled = rx
            .wait_for(|p| {
                p.submitted >= submitted
                    && p.completed() == p.submitted
                    && (!saving || p.saved + p.save_failed == p.succeeded)
            })
            .await
            .map(|p| *p);
        // The aggregator only stops after this handle is gone.
        settled.unwrap_or_else(|_| self.progress())
    }
}
