use crate::error::OutputError;
use model::{
    execution::failed_item::FailedItem,
    records::record::Record,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Committed size of both outputs, stored in the checkpoint so a resumed run
/// can discard anything written after the last committed flush.
///
/// `failures` is informational: the failure report is rewritten as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPosition {
    pub records: u64,
    pub failures: u64,
}

/// Destination for successes and the failed-items report.
///
/// Records are append-only. The failure report holds only ids that are still
/// failed, so it is replaced wholesale on every commit.
pub trait OutputSink: Send {
    /// Appends `records`, replaces the failure report with `failures`, and makes
    /// both durable before returning the new position.
    fn commit(
        &mut self,
        records: &[Record],
        failures: &[FailedItem],
    ) -> Result<OutputPosition, OutputError>;

    /// Drops records past `position` and restores the failure report to `failures`.
    fn rollback(
        &mut self,
        position: &OutputPosition,
        failures: &[FailedItem],
    ) -> Result<(), OutputError>;

    fn position(&self) -> Result<OutputPosition, OutputError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    pub records: Vec<Record>,
    pub failures: Vec<FailedItem>,
    pub commits: usize,
}

/// In-memory sink; positions count rows instead of bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutputSink {
    inner: Arc<Mutex<MemoryOutput>>,
}

impl MemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of what is currently committed.
    pub fn contents(&self) -> MemoryOutput {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryOutput> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OutputSink for MemoryOutputSink {
    fn commit(
        &mut self,
        records: &[Record],
        failures: &[FailedItem],
    ) -> Result<OutputPosition, OutputError> {
        let mut out = self.lock();
        out.records.extend_from_slice(records);
        out.failures = failures.to_vec();
        out.commits += 1;
        Ok(OutputPosition {
            records: out.records.len() as u64,
            failures: out.failures.len() as u64,
        })
    }

    fn rollback(
        &mut self,
        position: &OutputPosition,
        failures: &[FailedItem],
    ) -> Result<(), OutputError> {
        let mut out = self.lock();
        out.records.truncate(position.records as usize);
        out.failures = failures.to_vec();
        Ok(())
    }

    fn position(&self) -> Result<OutputPosition, OutputError> {
        let out = self.lock();
        Ok(OutputPosition {
            records: out.records.len() as u64,
            failures: out.failures.len() as u64,
        })
    }
}
