use crate::connectors::output::OutputPosition;
use chrono::{DateTime, Utc};
use model::{core::identifiers::ItemId, execution::failed_item::FailedItem};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Progress marker of a run, rewritten after every flush.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub run_key: String,
    /// Ids whose records are committed to the success output.
    pub completed_ids: BTreeSet<ItemId>,
    /// Terminal failures not yet superseded by a success. Never overlaps `completed_ids`.
    #[serde(default)]
    pub failures: BTreeMap<ItemId, FailedItem>,
    /// Sequence number of the last committed flush; 0 before the first one.
    pub last_flush_index: u64,
    /// Output sizes at the last committed flush.
    pub output: OutputPosition,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(run_key: impl Into<String>) -> Self {
        Self {
            run_key: run_key.into(),
            completed_ids: BTreeSet::new(),
            failures: BTreeMap::new(),
            last_flush_index: 0,
            output: OutputPosition::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_completed(&self, id: &ItemId) -> bool {
        self.completed_ids.contains(id)
    }

    /// Next checkpoint after a flush that committed `ids` and left the output at `output`.
    pub fn advance<I>(&self, ids: I, output: OutputPosition) -> Checkpoint
    where
        I: IntoIterator<Item = ItemId>,
    {
        let mut next = self.clone();
        for id in ids {
            next.failures.remove(&id);
            next.completed_ids.insert(id);
        }
        next.last_flush_index += 1;
        next.output = output;
        next.updated_at = Utc::now();
        next
    }

    /// Adds terminal failures, replacing older ones for the same ids.
    /// Failures for completed ids are dropped.
    pub fn record_failures<I>(&mut self, failures: I)
    where
        I: IntoIterator<Item = FailedItem>,
    {
        for failure in failures {
            if !self.completed_ids.contains(&failure.id) {
                self.failures.insert(failure.id.clone(), failure);
            }
        }
    }

    /// Failure report rows, ordered by id.
    pub fn failure_rows(&self) -> Vec<FailedItem> {
        self.failures.values().cloned().collect()
    }
}
