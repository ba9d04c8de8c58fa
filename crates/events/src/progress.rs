//! Per-batch progress counters folded from the event stream.

use std::collections::HashMap;
use std::fmt;

use genbatch_core::Ticket;
use serde::Serialize;

use crate::event::{JobEvent, JobEventKind};

/// Counts of submissions by life-cycle state, plus result-sink outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub submitted: usize,
    pub pending: usize,
    pub in_flight: usize,
    pub retry_waiting: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub saved: usize,
    pub save_failed: usize,
}

impl BatchProgress {
    /// Submissions in a terminal state.
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.submitted
    }
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} done: {} succeeded, {} failed, {} saved",
            self.completed(),
            self.submitted,
            self.succeeded,
            self.failed,
            self.saved,
        )?;
        if self.save_failed > 0 {
            write!(f, ", {} not saved", self.save_failed)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    InFlight,
    RetryWaiting,
    Succeeded,
    Failed,
}

/// Folds [`JobEvent`]s into a [`BatchProgress`].
///
/// Each ticket is counted once, in the bucket of its latest transition.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    slots: HashMap<Ticket, Slot>,
    progress: BatchProgress,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress
    }

    /// Account for `event`. Returns `true` if the counters changed.
    pub fn apply(&mut self, event: &JobEvent) -> bool {
        let next = match &event.kind {
            JobEventKind::Queued => Slot::Pending,
            JobEventKind::InFlight { .. } => Slot::InFlight,
            JobEventKind::RetryWaiting { .. } => Slot::RetryWaiting,
            JobEventKind::Succeeded { .. } => Slot::Succeeded,
            JobEventKind::Failed { .. } => Slot::Failed,
            JobEventKind::ResultSaved { .. } => {
                self.progress.saved += 1;
                return true;
            }
            JobEventKind::ResultSaveFailed { .. } => {
                self.progress.save_failed += 1;
                return true;
            }
            JobEventKind::Countdown { .. } => return false,
        };

        match self.slots.insert(event.ticket, next) {
            Some(prev) if prev == next => return false,
            Some(prev) => *self.counter(prev) -= 1,
            None => self.progress.submitted += 1,
        }
        *self.counter(next) += 1;
        true
    }

    fn counter(&mut self, slot: Slot) -> &mut usize {
        match slot {
            Slot::Pending => &mut self.progress.pending,
            Slot::InFlight => &mut self.progress.in_flight,
            Slot::RetryWaiting => &mut self.progress.retry_waiting,
            Slot::Succeeded => &mut self.progress.succeeded,
            Slot::Failed => &mut self.progress.failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use genbatch_core::GenerationError;
    use uuid::Uuid;

    use super::*;

    fn event(ticket: Ticket, kind: JobEventKind) -> JobEvent {
        JobEvent::new(Uuid::nil(), ticket, ticket.to_string(), kind)
    }

    #[test]
    fn follows_each_ticket_through_its_life_cycle() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(&event(0, JobEventKind::Queued));
        tracker.apply(&event(1, JobEventKind::Queued));
        tracker.apply(&event(0, JobEventKind::InFlight { attempt: 1 }));

        let p = tracker.progress();
        assert_eq!((p.submitted, p.pending, p.in_flight), (2, 1, 1));

        tracker.apply(&event(
            0,
            JobEventKind::Succeeded {
                url: "http://x/0.png".into(),
            },
        ));
        tracker.apply(&event(
            1,
            JobEventKind::Failed {
                error: GenerationError::Cancelled,
            },
        ));

        let p = tracker.progress();
        assert_eq!((p.pending, p.in_flight, p.succeeded, p.failed), (0, 0, 1, 1));
        assert!(p.is_complete());
    }

    #[test]
    fn countdown_does_not_change_counters() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(&event(0, JobEventKind::Queued));
        assert!(!tracker.apply(&event(
            0,
            JobEventKind::Countdown {
                retry: 1,
                remaining_secs: 25
            }
        )));
        assert_eq!(tracker.progress().pending, 1);
    }

    #[test]
    fn save_outcomes_are_counted_separately() {
        let mut tracker = ProgressTracker::new();
        tracker.apply(&event(0, JobEventKind::Succeeded { url: "u".into() }));
        tracker.apply(&event(
            0,
            JobEventKind::ResultSaveFailed {
                url: "u".into(),
                detail: "HTTP 404".into(),
            },
        ));
        let p = tracker.progress();
        assert_eq!((p.succeeded, p.save_failed, p.saved), (1, 1, 0));
        assert_eq!(p.to_string(), "1/1 done: 1 succeeded, 0 failed, 0 saved, 1 not saved");
    }

    #[test]
    fn empty_batch_is_complete() {
        assert!(BatchProgress::default().is_complete());
    }
}
