//! Retry policy for transient storage conflicts
//!
//! Serialization failures and lost CAS races are retried a bounded
//! number of times with exponential backoff and random jitter; after
//! exhaustion the conflict surfaces to the caller instead of degrading
//! consistency.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Bounded retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Disable jitter (deterministic delays, mainly for tests)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Returns the maximum number of retries
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// True if the given attempt (0-indexed) may be retried
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before the given retry attempt (1-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.initial_delay.as_millis() as u64;
        let exp = attempt.saturating_sub(1).min(16);
        let delay_ms = base_ms.saturating_mul(1u64 << exp);
        let capped = delay_ms.min(self.max_delay.as_millis() as u64);

        let final_ms = if self.jitter && capped > 0 {
            // reduce by up to 25% so concurrent retries spread out
            let floor = capped - capped / 4;
            rand::thread_rng().gen_range(floor..=capped)
        } else {
            capped
        };

        debug!(attempt, delay_ms = final_ms, "calculated retry delay");
        Duration::from_millis(final_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(25), Duration::from_millis(500))
    }
}
