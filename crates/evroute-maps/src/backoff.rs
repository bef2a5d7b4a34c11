//! Exponential backoff with jitter for retried provider calls.
//!
//! Keeps a burst of transient map API failures from turning into a tight
//! retry loop against the same quota.

use rand::Rng;
use std::time::Duration;

const JITTER_RATIO: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        Self {
            base,
            max: max.max(base),
            current: base,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.failures = 0;
    }

    /// Record a failure and return how long to wait before the next attempt.
    ///
    /// The first failure waits `base`; each later one doubles up to `max`.
    pub fn fail(&mut self) -> Duration {
        let delay = if self.failures == 0 {
            self.current
        } else {
            self.current = self.current.saturating_mul(2).min(self.max);
            self.current
        };
        self.failures += 1;
        with_jitter(delay)
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let jitter_ms_max = (delay.as_millis() as f64 * JITTER_RATIO) as u64;
    if jitter_ms_max == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=jitter_ms_max))
}
