use crate::core::identifiers::ItemId;
use serde::{Deserialize, Serialize};

/// One identifier to resolve, plus the number of retries already spent on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: ItemId,
    pub attempt_count: u32,
}

impl WorkItem {
    pub fn new(id: impl Into<ItemId>) -> Self {
        WorkItem {
            id: id.into(),
            attempt_count: 0,
        }
    }

    /// Marks the start of a retry.
    pub fn next_attempt(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
    }
}
