use crate::settings::{ScrapeSettings, error::SettingsError};
use tracing::{info, warn};

/// Upper bound for the timeout and the pacing delays, in seconds.
pub const MAX_SECONDS: f64 = 3600.0;

fn within(value: f64, min_exclusive: bool) -> bool {
    let low = if min_exclusive { value > 0.0 } else { value >= 0.0 };
    value.is_finite() && low && value <= MAX_SECONDS
}

impl ScrapeSettings {
    /// Checks every field and reports all problems at once.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let mut errors: Vec<String> = Vec::new();

        if self.workers == 0 {
            errors.push("workers must be at least 1".into());
        } else if self.workers > 64 {
            warn!(workers = self.workers, "Very large worker count, the target may throttle");
        }

        if self.save_every == 0 {
            errors.push("save_every must be at least 1".into());
        }

        if !within(self.timeout, true) {
            errors.push(format!(
                "timeout must be in (0, {MAX_SECONDS}] seconds, got {}",
                self.timeout
            ));
        }

        if !within(self.min_delay, false) {
            errors.push(format!(
                "min_delay must be in [0, {MAX_SECONDS}] seconds, got {}",
                self.min_delay
            ));
        }
        if !within(self.max_delay, false) {
            errors.push(format!(
                "max_delay must be in [0, {MAX_SECONDS}] seconds, got {}",
                self.max_delay
            ));
        }
        if self.min_delay > self.max_delay {
            errors.push(format!(
                "min_delay ({}) must not exceed max_delay ({})",
                self.min_delay, self.max_delay
            ));
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                errors.push(format!("start ({start}) must be below end ({end})"));
            }
        }

        if self.max_pages == 0 {
            errors.push("max_pages must be at least 1".into());
        }

        if self.base_url.trim().is_empty() {
            errors.push("base_url must not be empty".into());
        }

        if !errors.is_empty() {
            return Err(SettingsError::ValidationFailed(errors));
        }

        info!(
            workers = self.effective_workers(),
            timeout = self.timeout,
            retries = self.retries,
            save_every = self.save_every,
            transport = %self.transport,
            "Settings validated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::settings::{ScrapeSettings, error::SettingsError};

    #[test]
    fn collects_every_problem() {
        let s = ScrapeSettings {
            workers: 0,
            save_every: 0,
            min_delay: 2.0,
            max_delay: 1.0,
            start: Some(5),
            end: Some(5),
            ..Default::default()
        };

        match s.validate() {
            Err(SettingsError::ValidationFailed(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn zero_delays_are_allowed() {
        let s = ScrapeSettings {
            min_delay: 0.0,
            max_delay: 0.0,
            retries: 0,
            ..Default::default()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn huge_timeout_is_rejected_without_panicking() {
        let s = ScrapeSettings {
            timeout: 1e300,
            max_delay: f64::INFINITY,
            ..Default::default()
        };

        match s.validate() {
            Err(SettingsError::ValidationFailed(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].starts_with("timeout"));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
        assert_eq!(s.timeout(), std::time::Duration::MAX);
    }
}
