use model::execution::fetch_result::FailureKind;
use thiserror::Error;

/// A classified page-level failure, produced by transports and extractors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct PageFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl PageFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ParseError, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransportError, message)
    }
}

/// Errors raised while setting up a transport session.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid browser configuration: {0}")]
    BrowserConfig(String),

    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(#[from] chromiumoxide::error::CdpError),

    #[error("Invalid base URL {url}: {message}")]
    InvalidBaseUrl { url: String, message: String },
}
