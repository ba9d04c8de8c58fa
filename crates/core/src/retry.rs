//! Linear backoff, per-attempt jitter and retry countdown.
//!
//! The delay before retry *k* is `step * k` (30 s, 60 s, 90 s, ... by
//! default). This is a rate-limit contract with the upstream, not a
//! latency optimisation, so it is linear rather than exponential.

use std::time::Duration;

use rand::Rng;

/// Default spacing between successive retry delays.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(30);

/// Default interval between countdown progress events.
pub const DEFAULT_COUNTDOWN_INTERVAL: Duration = Duration::from_secs(5);

/// Default ceiling on a single upstream request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default jitter bounds applied before every attempt.
pub const DEFAULT_JITTER_MIN: Duration = Duration::from_millis(500);
pub const DEFAULT_JITTER_MAX: Duration = Duration::from_millis(1500);

/// Tunable retry timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before retry `k` is `backoff_step * k`.
    pub backoff_step: Duration,
    /// How often a waiting job reports its remaining time.
    pub countdown_interval: Duration,
    /// Lower bound of the pre-attempt jitter.
    pub jitter_min: Duration,
    /// Upper bound of the pre-attempt jitter.
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_step: DEFAULT_BACKOFF_STEP,
            countdown_interval: DEFAULT_COUNTDOWN_INTERVAL,
            jitter_min: DEFAULT_JITTER_MIN,
            jitter_max: DEFAULT_JITTER_MAX,
        }
    }
}

impl RetryPolicy {
    /// Delay before the 1-based retry number `retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff_step.saturating_mul(retry)
    }

    /// A random duration in `[jitter_min, jitter_max]`.
    pub fn jitter(&self) -> Duration {
        self.jitter_with(&mut rand::rng())
    }

    pub fn jitter_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.jitter_max <= self.jitter_min {
            return self.jitter_min;
        }
        rng.random_range(self.jitter_min..=self.jitter_max)
    }

    /// Remaining-time checkpoints reported while waiting `delay`.
    ///
    /// The first entry is the full delay; later entries are reported
    /// after each `countdown_interval` elapses, stopping before zero.
    /// A 30 s delay with a 5 s interval yields `[30, 25, 20, 15, 10, 5]`.
    pub fn countdown(&self, delay: Duration) -> Vec<Duration> {
        let mut remaining = delay;
        let mut ticks = Vec::new();
        if self.countdown_interval.is_zero() {
            if !delay.is_zero() {
                ticks.push(delay);
            }
            return ticks;
        }
        while !remaining.is_zero() {
            ticks.push(remaining);
            remaining = remaining.saturating_sub(self.countdown_interval);
        }
        ticks
    }
}
