use crate::settings::{error::SettingsError, overrides::SettingsOverrides};
use engine_core::{rate_limiter::RateLimiter, retry::RetryPolicy};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr, time::Duration};
use tracing::info;

pub mod error;
pub mod overrides;
pub mod validator;

/// Which page transport the fetch clients drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    #[default]
    Browser,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Browser => write!(f, "browser"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "browser" | "chrome" => Ok(TransportKind::Browser),
            other => Err(SettingsError::UnknownTransport(other.to_string())),
        }
    }
}

/// Tunables for one scrape or resolve run.
///
/// Missing keys in a config file fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Page-load timeout in seconds.
    pub timeout: f64,
    /// Re-attempts per item after the first try.
    pub retries: u32,
    /// Successes buffered between flushes.
    pub save_every: usize,
    pub min_delay: f64,
    pub max_delay: f64,
    /// Inclusive lower bound (position in the id list, or id for ranges).
    pub start: Option<usize>,
    /// Exclusive upper bound.
    pub end: Option<usize>,
    pub headless: bool,
    /// When false the pool runs a single worker.
    pub parallel: bool,
    /// Extra exponential backoff between retries, in milliseconds. 0 disables it.
    pub retry_backoff_ms: u64,
    /// Hard cap on listing pages visited per conference.
    pub max_pages: u32,
    /// Time to let a page settle after load before reading it, in milliseconds.
    pub settle_ms: u64,
    pub transport: TransportKind,
    pub base_url: String,
    /// Processed items between progress log lines.
    pub progress_every: u64,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            timeout: 12.0,
            retries: 2,
            save_every: 100,
            min_delay: 0.1,
            max_delay: 0.5,
            start: None,
            end: None,
            headless: false,
            parallel: true,
            retry_backoff_ms: 0,
            max_pages: 200,
            settle_ms: 0,
            transport: TransportKind::Browser,
            base_url: "https://civilica.com".to_string(),
            progress_every: 10,
        }
    }
}

impl ScrapeSettings {
    /// Reads settings from a JSON file. Keys not present keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| SettingsError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Layers defaults, an optional config file and CLI overrides, then validates.
    pub fn resolve(
        config: Option<&Path>,
        overrides: SettingsOverrides,
    ) -> Result<Self, SettingsError> {
        let mut settings = match config {
            Some(path) => {
                info!(path = %path.display(), "Loading config file");
                Self::from_json_file(path)?
            }
            None => Self::default(),
        };
        overrides.apply(&mut settings);
        settings.validate()?;
        Ok(settings)
    }

    pub fn effective_workers(&self) -> usize {
        if self.parallel { self.workers.max(1) } else { 1 }
    }

    /// Out-of-range values saturate; `validate` rejects them before a run.
    pub fn timeout(&self) -> Duration {
        if self.timeout > 0.0 {
            Duration::try_from_secs_f64(self.timeout).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::from_secs_f64(self.min_delay, self.max_delay)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.retry_backoff_ms);
        RetryPolicy::new(self.retries, base, base.saturating_mul(8))
    }
}
