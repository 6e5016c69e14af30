use crate::{execution::work_item::WorkItem, records::record::Record};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Classified reason a fetch did not produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The page load exceeded the configured timeout.
    Timeout,
    /// The id has no corresponding page.
    NotFound,
    /// The page was reached but the expected structure was absent.
    ParseError,
    /// Connection, HTTP or driver failure.
    TransportError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "Timeout",
            FailureKind::NotFound => "NotFound",
            FailureKind::ParseError => "ParseError",
            FailureKind::TransportError => "TransportError",
        }
    }

    /// Only timeouts and transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::TransportError)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown failure kind: {0}")]
pub struct UnknownFailureKind(pub String);

impl FromStr for FailureKind {
    type Err = UnknownFailureKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Timeout" => Ok(FailureKind::Timeout),
            "NotFound" => Ok(FailureKind::NotFound),
            "ParseError" => Ok(FailureKind::ParseError),
            "TransportError" => Ok(FailureKind::TransportError),
            other => Err(UnknownFailureKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    pub item: WorkItem,
}

/// Outcome of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchResult {
    Success { item: WorkItem, record: Record },
    Failure(Failure),
}

impl FetchResult {
    pub fn success(item: &WorkItem, record: Record) -> Self {
        FetchResult::Success {
            item: item.clone(),
            record,
        }
    }

    pub fn failure(item: &WorkItem, kind: FailureKind, message: impl Into<String>) -> Self {
        FetchResult::Failure(Failure {
            kind,
            message: message.into(),
            item: item.clone(),
        })
    }

    pub fn item(&self) -> &WorkItem {
        match self {
            FetchResult::Success { item, .. } => item,
            FetchResult::Failure(failure) => &failure.item,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            FetchResult::Success { .. } => None,
            FetchResult::Failure(failure) => Some(failure.kind),
        }
    }
}
