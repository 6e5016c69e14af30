use chrono::{DateTime, Utc};
use model::core::identifiers::ItemId;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every queued id reached a terminal result.
    Completed,
    /// Stopped by a cancellation signal before the queue was drained.
    Cancelled,
}

/// Outcome of one run, logged and printed by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_key: String,
    pub status: RunStatus,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub flushes: u64,
    pub peak_in_flight: u64,
    pub skipped_completed: u64,
    pub skipped_excluded: u64,
    /// Ids committed across this and earlier runs.
    pub completed_total: usize,
    pub failed_ids: Vec<ItemId>,
    pub last_flush_index: u64,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "secs")]
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

fn secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
