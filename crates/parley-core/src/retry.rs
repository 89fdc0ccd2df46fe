//! Retry planning for upstream calls
//!
//! Exponential backoff with additive random jitter. The delay schedule is a
//! pure function of the attempt number so it can be checked without waiting.

use rand::Rng;
use std::time::Duration;

/// Per-call retry schedule.
///
/// A `RetryPlan` stored in configuration is a template with `attempt == 0`;
/// each call copies it and advances its own counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPlan {
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter_max: Duration,
}

impl RetryPlan {
    pub const fn new(max_attempts: u32, base_delay: Duration, jitter_max: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            base_delay,
            jitter_max,
        }
    }

    /// Single-shot completions: 5 attempts, 3s base, up to 1s jitter.
    pub const fn completion() -> Self {
        Self::new(5, Duration::from_secs(3), Duration::from_secs(1))
    }

    /// Streaming: 3 retries after the first call, 1s base, no jitter.
    pub const fn streaming() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::ZERO)
    }

    /// `base_delay * 2^attempt`, saturating.
    pub fn backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Delay to wait before `attempt`; the first attempt goes out immediately.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        Some(self.backoff(attempt).saturating_add(jitter(self.jitter_max)))
    }

    /// Counts one more attempt and returns the new count.
    pub fn record_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

impl Default for RetryPlan {
    fn default() -> Self {
        Self::completion()
    }
}

/// Uniform random duration in `[0, max)`.
pub fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0.0..max.as_secs_f64());
    Duration::from_secs_f64(secs)
}
