use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::trace;

/// Randomized pause issued before every fetch attempt.
///
/// Each worker waits independently; there is no shared clock between them.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiter {
    min_delay: Duration,
    max_delay: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_secs_f64(0.1, 0.5)
    }
}

impl RateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }

    /// Builds a limiter from fractional seconds. Negative or non-finite values count as zero.
    pub fn from_secs_f64(min_secs: f64, max_secs: f64) -> Self {
        Self::new(secs(min_secs), secs(max_secs))
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Draws the next delay uniformly from `[min_delay, max_delay]`.
    pub fn next_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let secs = rand::thread_rng()
            .gen_range(self.min_delay.as_secs_f64()..=self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        trace!(delay_ms = delay.as_millis() as u64, "Rate limiting");
        sleep(delay).await;
    }
}

fn secs(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_stay_within_bounds() {
        let limiter = RateLimiter::from_secs_f64(0.1, 0.3);
        for _ in 0..1_000 {
            let d = limiter.next_delay();
            assert!(d >= Duration::from_millis(100), "{d:?} below min");
            assert!(d <= Duration::from_millis(300), "{d:?} above max");
        }
    }

    #[test]
    fn inverted_bounds_collapse_to_min() {
        let limiter = RateLimiter::from_secs_f64(0.5, 0.1);
        assert_eq!(limiter.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn invalid_values_are_zero() {
        let limiter = RateLimiter::from_secs_f64(-1.0, f64::NAN);
        assert_eq!(limiter, RateLimiter::disabled());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_sleeps_for_the_drawn_delay() {
        let limiter = RateLimiter::from_secs_f64(2.0, 2.0);
        let start = tokio::time::Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
