use crate::error::QueueError;
use model::{core::identifiers::ItemId, execution::work_item::WorkItem};
use std::{
    collections::{BTreeSet, HashSet},
    sync::{Mutex, PoisonError},
};
use tracing::debug;

/// Where the ids of a run come from.
#[derive(Debug, Clone)]
pub enum IdSource {
    /// Integer ids `start..end`.
    Range { start: u64, end: u64 },
    /// Ids read from a file. Served in ascending id order, blanks and repeats dropped.
    List(Vec<ItemId>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub produced: u64,
    pub skipped_completed: u64,
    pub skipped_excluded: u64,
    pub skipped_duplicate: u64,
    pub skipped_blank: u64,
}

type IdIter = Box<dyn Iterator<Item = ItemId> + Send>;

struct QueueInner {
    ids: IdIter,
    stats: QueueStats,
    exhausted: bool,
}

/// Lazy, finite sequence of pending work items shared by all workers.
///
/// `next` hands every id to exactly one caller, in ascending id order. Ids
/// already completed by a previous run or explicitly excluded are skipped.
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    completed: BTreeSet<ItemId>,
    excluded: HashSet<ItemId>,
}

pub struct WorkQueueBuilder {
    source: IdSource,
    start: Option<usize>,
    end: Option<usize>,
    completed: BTreeSet<ItemId>,
    excluded: HashSet<ItemId>,
}

impl WorkQueue {
    pub fn builder(source: IdSource) -> WorkQueueBuilder {
        WorkQueueBuilder {
            source,
            start: None,
            end: None,
            completed: BTreeSet::new(),
            excluded: HashSet::new(),
        }
    }

    pub fn next(&self) -> Option<WorkItem> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.exhausted {
            return None;
        }

        while let Some(id) = inner.ids.next() {
            if self.completed.contains(&id) {
                inner.stats.skipped_completed += 1;
                continue;
            }
            if self.excluded.contains(&id) {
                inner.stats.skipped_excluded += 1;
                continue;
            }

            inner.stats.produced += 1;
            return Some(WorkItem::new(id));
        }

        inner.exhausted = true;
        None
    }

    pub fn stats(&self) -> QueueStats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    pub fn is_exhausted(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .exhausted
    }
}

impl WorkQueueBuilder {
    /// Restricts the run to `[start, end)`: id values for a range, positions in
    /// the sorted list for a list.
    pub fn window(mut self, start: Option<usize>, end: Option<usize>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn completed(mut self, completed: BTreeSet<ItemId>) -> Self {
        self.completed = completed;
        self
    }

    pub fn exclude<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = ItemId>,
    {
        self.excluded.extend(ids);
        self
    }

    pub fn build(self) -> Result<WorkQueue, QueueError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err(QueueError::InvalidWindow { start, end });
            }
        }

        let mut stats = QueueStats::default();
        let ids: IdIter = match self.source {
            IdSource::Range { start, end } => {
                let lo = self.start.map_or(start, |s| start.max(s as u64));
                let hi = self.end.map_or(end, |e| end.min(e as u64));
                Box::new((lo..hi.max(lo)).map(ItemId::from))
            }
            IdSource::List(list) => {
                let total = list.len();
                let mut list: Vec<ItemId> = list.into_iter().filter(|id| !id.is_blank()).collect();
                stats.skipped_blank = (total - list.len()) as u64;

                list.sort();
                let unique = list.len();
                list.dedup();
                stats.skipped_duplicate = (unique - list.len()) as u64;
                if stats.skipped_blank + stats.skipped_duplicate > 0 {
                    debug!(
                        blank = stats.skipped_blank,
                        duplicate = stats.skipped_duplicate,
                        "Dropped unusable ids from the list"
                    );
                }

                let skip = self.start.unwrap_or(0);
                let take = self.end.map_or(usize::MAX, |e| e.saturating_sub(skip));
                Box::new(list.into_iter().skip(skip).take(take))
            }
        };

        Ok(WorkQueue {
            inner: Mutex::new(QueueInner {
                ids,
                stats,
                exhausted: false,
            }),
            completed: self.completed,
            excluded: self.excluded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn drain(queue: &WorkQueue) -> Vec<String> {
        std::iter::from_fn(|| queue.next())
            .map(|item| item.id.to_string())
            .collect()
    }

    #[test]
    fn range_is_ascending_and_skips_completed_and_excluded() {
        let queue = WorkQueue::builder(IdSource::Range { start: 0, end: 6 })
            .completed([ItemId::from(1u64)].into_iter().collect())
            .exclude([ItemId::from(4u64)])
            .build()
            .unwrap();

        assert_eq!(drain(&queue), ["0", "2", "3", "5"]);
        let stats = queue.stats();
        assert_eq!(stats.produced, 4);
        assert_eq!(stats.skipped_completed, 1);
        assert_eq!(stats.skipped_excluded, 1);
        assert!(queue.is_exhausted());
        assert!(queue.next().is_none());
    }

    #[test]
    fn list_window_uses_positions() {
        let ids = ["a", "b", "", "c", "b", "d", "e"]
            .into_iter()
            .map(ItemId::from)
            .collect();
        let queue = WorkQueue::builder(IdSource::List(ids))
            .window(Some(1), Some(6))
            .build()
            .unwrap();

        assert_eq!(drain(&queue), ["b", "c", "d", "e"]);
        let stats = queue.stats();
        assert_eq!(stats.skipped_blank, 1);
        assert_eq!(stats.skipped_duplicate, 1);
    }

    #[test]
    fn list_is_served_in_ascending_id_order() {
        let ids = ["5", "1", "item-b", "30", "3", "item-a"]
            .into_iter()
            .map(ItemId::from)
            .collect();
        let queue = WorkQueue::builder(IdSource::List(ids))
            .completed([ItemId::from("3")].into_iter().collect())
            .build()
            .unwrap();

        assert_eq!(drain(&queue), ["1", "5", "30", "item-a", "item-b"]);
    }

    #[test]
    fn list_window_applies_after_sorting() {
        let ids = ["40", "10", "30", "20"].into_iter().map(ItemId::from).collect();
        let queue = WorkQueue::builder(IdSource::List(ids))
            .window(Some(1), Some(3))
            .build()
            .unwrap();

        assert_eq!(drain(&queue), ["20", "30"]);
    }

    #[test]
    fn range_window_clamps() {
        let queue = WorkQueue::builder(IdSource::Range { start: 0, end: 100 })
            .window(Some(95), None)
            .build()
            .unwrap();
        assert_eq!(drain(&queue), ["95", "96", "97", "98", "99"]);
    }

    #[test]
    fn empty_window_is_rejected() {
        let err = WorkQueue::builder(IdSource::Range { start: 0, end: 10 })
            .window(Some(5), Some(5))
            .build()
            .err();
        assert_eq!(err, Some(QueueError::InvalidWindow { start: 5, end: 5 }));
    }

    #[test]
    fn concurrent_callers_never_share_an_id() {
        let queue = Arc::new(
            WorkQueue::builder(IdSource::Range { start: 0, end: 2_000 })
                .build()
                .unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || drain(&queue))
            })
            .collect();

        let mut all: Vec<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(total, 2_000);
        assert_eq!(all.len(), 2_000);
    }
}
