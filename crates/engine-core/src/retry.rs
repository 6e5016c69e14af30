use model::execution::fetch_result::FailureKind;
use std::time::Duration;

/// Indicates whether a failure should be retried or treated as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

/// Per-item retry budget and backoff.
///
/// `max_retries` counts re-attempts, so an item is fetched at most
/// `max_retries + 1` times. The backoff is added on top of the rate limiter's
/// delay and is zero unless `base_delay` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Decides what to do with a failure seen after `attempt_count` retries.
    pub fn disposition(&self, attempt_count: u32, kind: FailureKind) -> RetryDisposition {
        if kind.is_retryable() && attempt_count < self.max_retries {
            RetryDisposition::Retry
        } else {
            RetryDisposition::Stop
        }
    }

    /// Exponential backoff for the given retry number (0-based), capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
