use thiserror::Error;

/// Errors raised while loading or validating scrape settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for `ScrapeSettings`.
    #[error("Invalid config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unknown transport: {0} (expected `http` or `browser`)")]
    UnknownTransport(String),

    /// One or more values are out of range.
    #[error("Invalid settings: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}
