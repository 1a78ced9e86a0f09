//! Poll scheduling with capped exponential backoff.

use std::time::Duration;

use tokio_retry::strategy::{ExponentialBackoff, jitter};

use super::Outcome;

/// Delay until the next cycle.
///
/// Link and fetch failures double the delay (plus up to 25% jitter, so a
/// fleet that lost the same access point does not retry in lockstep), up to
/// `cap`. Any other outcome resets to `base`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    failures: u32,
    schedule: ExponentialBackoff,
}

impl Backoff {
    /// Start at `base`; `cap` below `base` is raised to `base`.
    pub fn new(base: Duration, cap: Duration) -> Self {
        let cap = cap.max(base);
        Self {
            base,
            cap,
            failures: 0,
            schedule: schedule(base, cap),
        }
    }

    /// Consecutive retryable failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Forget past failures.
    pub fn reset(&mut self) {
        self.failures = 0;
        self.schedule = schedule(self.base, self.cap);
    }

    /// Record `outcome` and return how long to sleep before the next cycle.
    pub fn next_delay(&mut self, outcome: &Outcome) -> Duration {
        if !outcome.is_retryable_failure() {
            self.reset();
            return self.base;
        }
        self.failures = self.failures.saturating_add(1);
        let nominal = self.schedule.next().unwrap_or(self.cap);
        (nominal + jitter(nominal / 4)).min(self.cap)
    }
}

/// `2 * base`, `4 * base`, ... capped at `cap`, before jitter.
fn schedule(base: Duration, cap: Duration) -> ExponentialBackoff {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    ExponentialBackoff::from_millis(2)
        .factor(base_ms)
        .max_delay(cap)
}
