use crate::{
    core::identifiers::ItemId,
    execution::fetch_result::{Failure, FailureKind},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column layout of the failed-items report.
pub const FAILED_ITEM_HEADER: [&str; 4] = ["id", "failure_kind", "message", "attempt_count"];

/// A terminally failed work item, as written to the failure output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: ItemId,
    pub kind: FailureKind,
    pub message: String,
    pub attempt_count: u32,
    pub failed_at: DateTime<Utc>,
}

impl FailedItem {
    pub fn new(id: ItemId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            message: message.into(),
            attempt_count: 0,
            failed_at: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempt_count: u32) -> Self {
        self.attempt_count = attempt_count;
        self
    }

    pub fn to_row(&self) -> [String; 4] {
        [
            self.id.to_string(),
            self.kind.to_string(),
            single_line(&self.message),
            self.attempt_count.to_string(),
        ]
    }
}

impl From<Failure> for FailedItem {
    fn from(failure: Failure) -> Self {
        FailedItem::new(failure.item.id, failure.kind, failure.message)
            .with_attempts(failure.item.attempt_count)
    }
}

fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::work_item::WorkItem;

    #[test]
    fn failure_keeps_attempt_count_and_kind() {
        let mut item = WorkItem::new("10");
        item.next_attempt();
        item.next_attempt();

        let failed = FailedItem::from(Failure {
            kind: FailureKind::Timeout,
            message: "page load\n timed out".into(),
            item,
        });

        assert_eq!(failed.attempt_count, 2);
        assert_eq!(
            failed.to_row(),
            [
                "10".to_string(),
                "Timeout".to_string(),
                "page load timed out".to_string(),
                "2".to_string()
            ]
        );
    }
}
