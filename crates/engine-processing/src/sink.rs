use crate::{error::SinkError, state_manager::StateManager};
use engine_core::{
    connectors::output::{OutputPosition, OutputSink},
    metrics::Metrics,
    state::models::Checkpoint,
};
use model::{
    core::identifiers::ItemId,
    execution::{failed_item::FailedItem, fetch_result::FetchResult},
    records::record::Record,
};
use std::collections::{BTreeSet, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// What one flush committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub flush_index: u64,
    pub records: usize,
    pub failures: usize,
    pub position: OutputPosition,
}

struct SinkState {
    output: Box<dyn OutputSink>,
    checkpoint: Checkpoint,
    records: Vec<Record>,
    failures: Vec<FailedItem>,
    pending_ids: Vec<ItemId>,
    /// Ids resolved during this run, committed or not.
    resolved: HashSet<ItemId>,
    failed_ids: BTreeSet<ItemId>,
    since_flush: usize,
    closed: bool,
}

/// Buffers results from all workers and persists them in atomic flushes.
///
/// A flush first commits the buffered rows to the output (durably), then
/// saves the advanced checkpoint. On open the output is rolled back to the
/// position stored in the last checkpoint, so rows written after it are
/// discarded and fetched again.
pub struct ResultSink {
    state: Mutex<SinkState>,
    manager: StateManager,
    save_every: usize,
    metrics: Metrics,
}

impl ResultSink {
    pub async fn open(
        mut output: Box<dyn OutputSink>,
        manager: StateManager,
        save_every: usize,
        metrics: Metrics,
    ) -> Result<Self, SinkError> {
        let checkpoint = manager.resume().await?;

        let current = output.position().map_err(SinkError::Rollback)?;
        if current != checkpoint.output {
            warn!(
                run_key = %manager.run_key(),
                current_records = current.records,
                current_failures = current.failures,
                committed_records = checkpoint.output.records,
                committed_failures = checkpoint.output.failures,
                "Output differs from the last checkpoint, rolling back"
            );
        }
        output
            .rollback(&checkpoint.output, &checkpoint.failure_rows())
            .map_err(SinkError::Rollback)?;
        if !checkpoint.failures.is_empty() {
            info!(
                run_key = %manager.run_key(),
                failures = checkpoint.failures.len(),
                "Earlier failures will be retried"
            );
        }

        Ok(Self {
            state: Mutex::new(SinkState {
                output,
                checkpoint,
                records: Vec::new(),
                failures: Vec::new(),
                pending_ids: Vec::new(),
                resolved: HashSet::new(),
                failed_ids: BTreeSet::new(),
                since_flush: 0,
                closed: false,
            }),
            manager,
            save_every: save_every.max(1),
            metrics,
        })
    }

    /// Ids committed by earlier runs, to be skipped by the work queue.
    pub async fn completed_ids(&self) -> BTreeSet<ItemId> {
        self.state.lock().await.checkpoint.completed_ids.clone()
    }

    pub async fn checkpoint(&self) -> Checkpoint {
        self.state.lock().await.checkpoint.clone()
    }

    /// Ids that failed terminally during this run.
    pub async fn failed_ids(&self) -> BTreeSet<ItemId> {
        self.state.lock().await.failed_ids.clone()
    }

    /// Buffers one terminal result, flushing when `save_every` successes are pending.
    pub async fn record(&self, result: FetchResult) -> Result<Option<FlushReport>, SinkError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SinkError::Closed);
        }

        let id = result.item().id.clone();
        if state.checkpoint.is_completed(&id) || !state.resolved.insert(id.clone()) {
            warn!(item = %id, "Ignoring result for an id that is already resolved");
            return Ok(None);
        }

        match result {
            FetchResult::Success { item, record } => {
                debug!(item = %item.id, attempts = item.attempt_count + 1, "Recorded success");
                self.metrics.increment_succeeded(1);
                state.records.push(record);
                state.pending_ids.push(item.id);
                state.since_flush += 1;
            }
            FetchResult::Failure(failure) => {
                warn!(
                    item = %failure.item.id,
                    kind = %failure.kind,
                    attempts = failure.item.attempt_count + 1,
                    error = %failure.message,
                    "Recorded failure"
                );
                self.metrics.increment_failed(1);
                state.failed_ids.insert(failure.item.id.clone());
                state.failures.push(FailedItem::from(failure));
            }
        }

        if state.since_flush >= self.save_every {
            return self.flush_locked(&mut state).await.map(Some);
        }
        Ok(None)
    }

    /// Flushes whatever is buffered, even if nothing is.
    pub async fn flush(&self) -> Result<FlushReport, SinkError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SinkError::Closed);
        }
        self.flush_locked(&mut state).await
    }

    /// Final flush. The sink accepts no results afterwards.
    pub async fn finalize(&self) -> Result<FlushReport, SinkError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SinkError::Closed);
        }
        let report = self.flush_locked(&mut state).await;
        state.closed = true;
        report
    }

    async fn flush_locked(&self, state: &mut SinkState) -> Result<FlushReport, SinkError> {
        let result = self.commit_buffers(state).await;
        if let Err(err) = &result {
            error!(run_key = %self.manager.run_key(), error = %err, "Flush failed, closing sink");
            state.closed = true;
        }
        result
    }

    async fn commit_buffers(&self, state: &mut SinkState) -> Result<FlushReport, SinkError> {
        let mut next = state
            .checkpoint
            .advance(state.pending_ids.iter().cloned(), OutputPosition::default());
        next.record_failures(state.failures.iter().cloned());

        next.output = state.output.commit(&state.records, &next.failure_rows())?;
        let position = next.output;
        self.manager.commit(&next).await?;

        let report = FlushReport {
            flush_index: next.last_flush_index,
            records: state.records.len(),
            failures: state.failures.len(),
            position,
        };

        state.checkpoint = next;
        state.records.clear();
        state.failures.clear();
        state.pending_ids.clear();
        state.since_flush = 0;
        self.metrics.increment_flushes(1);

        info!(
            flush_index = report.flush_index,
            records = report.records,
            failures = report.failures,
            completed = state.checkpoint.completed_ids.len(),
            "Flushed results"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_core::{
        connectors::output::MemoryOutputSink,
        error::{OutputError, StateStoreError},
        state::{StateStore, file_store::JsonFileStateStore},
    };
    use model::execution::{fetch_result::FailureKind, work_item::WorkItem};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn ok(id: &str) -> FetchResult {
        let item = WorkItem::new(id);
        FetchResult::success(&item, Record::new(item.id.clone()).with("title", "t"))
    }

    fn fail(id: &str, kind: FailureKind) -> FetchResult {
        FetchResult::failure(&WorkItem::new(id), kind, "boom")
    }

    async fn open(
        dir: &std::path::Path,
        output: MemoryOutputSink,
        save_every: usize,
    ) -> (ResultSink, Metrics) {
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStateStore::open(dir).await.unwrap());
        let metrics = Metrics::new();
        let sink = ResultSink::open(
            Box::new(output),
            StateManager::new("run", store),
            save_every,
            metrics.clone(),
        )
        .await
        .unwrap();
        (sink, metrics)
    }

    #[tokio::test]
    async fn flushes_every_n_successes_and_once_at_the_end() {
        let dir = tempdir().unwrap();
        let output = MemoryOutputSink::new();
        let (sink, metrics) = open(dir.path(), output.clone(), 2).await;

        let mut flushes = Vec::new();
        for id in ["0", "1", "2", "3", "4"] {
            if let Some(report) = sink.record(ok(id)).await.unwrap() {
                flushes.push(report.flush_index);
            }
        }
        sink.record(fail("9", FailureKind::NotFound)).await.unwrap();
        let last = sink.finalize().await.unwrap();

        assert_eq!(flushes, vec![1, 2]);
        assert_eq!(last.flush_index, 3);
        assert_eq!(last.records, 1);
        assert_eq!(last.failures, 1);
        assert_eq!(metrics.snapshot().flushes, 3);

        let contents = output.contents();
        assert_eq!(contents.records.len(), 5);
        assert_eq!(contents.failures.len(), 1);
        assert!(matches!(sink.record(ok("5")).await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn failures_stay_out_of_the_checkpoint() {
        let dir = tempdir().unwrap();
        let (sink, _) = open(dir.path(), MemoryOutputSink::new(), 10).await;

        sink.record(ok("1")).await.unwrap();
        sink.record(fail("2", FailureKind::ParseError)).await.unwrap();
        sink.finalize().await.unwrap();

        let cp = sink.checkpoint().await;
        assert!(cp.is_completed(&ItemId::from("1")));
        assert!(!cp.is_completed(&ItemId::from("2")));
        assert!(sink.failed_ids().await.contains(&ItemId::from("2")));
    }

    #[tokio::test]
    async fn duplicate_results_are_dropped() {
        let dir = tempdir().unwrap();
        let output = MemoryOutputSink::new();
        let (sink, _) = open(dir.path(), output.clone(), 10).await;

        sink.record(ok("1")).await.unwrap();
        sink.record(fail("1", FailureKind::Timeout)).await.unwrap();
        sink.finalize().await.unwrap();

        let contents = output.contents();
        assert_eq!(contents.records.len(), 1);
        assert!(contents.failures.is_empty());
    }

    #[tokio::test]
    async fn reopening_rolls_back_uncommitted_output() {
        let dir = tempdir().unwrap();
        let output = MemoryOutputSink::new();
        {
            let (sink, _) = open(dir.path(), output.clone(), 2).await;
            sink.record(ok("1")).await.unwrap();
            sink.record(ok("2")).await.unwrap();
        }

        // A commit that never reached the checkpoint.
        {
            let mut stray = output.clone();
            let item = WorkItem::new("3");
            stray
                .commit(&[Record::new(item.id.clone())], &[])
                .unwrap();
        }
        assert_eq!(output.contents().records.len(), 3);

        let (sink, _) = open(dir.path(), output.clone(), 2).await;
        assert_eq!(output.contents().records.len(), 2);
        assert_eq!(sink.completed_ids().await.len(), 2);

        // Completed ids from the earlier run are ignored.
        assert!(sink.record(ok("1")).await.unwrap().is_none());
        sink.finalize().await.unwrap();
        assert_eq!(output.contents().records.len(), 2);
    }

    #[tokio::test]
    async fn retried_failure_leaves_the_report_once_it_succeeds() {
        let dir = tempdir().unwrap();
        let output = MemoryOutputSink::new();
        {
            let (sink, _) = open(dir.path(), output.clone(), 10).await;
            sink.record(ok("1")).await.unwrap();
            sink.record(fail("2", FailureKind::NotFound)).await.unwrap();
            sink.record(fail("3", FailureKind::Timeout)).await.unwrap();
            sink.finalize().await.unwrap();
        }
        assert_eq!(output.contents().failures.len(), 2);

        let (sink, _) = open(dir.path(), output.clone(), 10).await;
        assert_eq!(sink.checkpoint().await.failures.len(), 2);
        sink.record(ok("2")).await.unwrap();
        sink.record(fail("3", FailureKind::ParseError)).await.unwrap();
        sink.finalize().await.unwrap();

        let contents = output.contents();
        let succeeded: Vec<ItemId> = contents.records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(succeeded, vec![ItemId::from("1"), ItemId::from("2")]);
        assert_eq!(contents.failures.len(), 1);
        assert_eq!(contents.failures[0].id, ItemId::from("3"));
        assert_eq!(contents.failures[0].kind, FailureKind::ParseError);

        let cp = sink.checkpoint().await;
        assert!(cp.is_completed(&ItemId::from("2")));
        assert!(!cp.failures.contains_key(&ItemId::from("2")));
    }

    struct BrokenOutput;

    impl OutputSink for BrokenOutput {
        fn commit(&mut self, _: &[Record], _: &[FailedItem]) -> Result<OutputPosition, OutputError> {
            Err(OutputError::Io {
                path: "broken.csv".into(),
                source: std::io::Error::other("disk full"),
            })
        }

        fn rollback(&mut self, _: &OutputPosition, _: &[FailedItem]) -> Result<(), OutputError> {
            Ok(())
        }

        fn position(&self) -> Result<OutputPosition, OutputError> {
            Ok(OutputPosition::default())
        }
    }

    struct NoStore;

    #[async_trait]
    impl StateStore for NoStore {
        async fn save_checkpoint(&self, _: &Checkpoint) -> Result<(), StateStoreError> {
            Err(StateStoreError::SaveCheckpoint("read-only".into()))
        }

        async fn load_checkpoint(&self, _: &str) -> Result<Option<Checkpoint>, StateStoreError> {
            Ok(None)
        }

        async fn clear_checkpoint(&self, _: &str) -> Result<(), StateStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn output_failure_closes_the_sink() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStateStore::open(dir.path()).await.unwrap());
        let sink = ResultSink::open(
            Box::new(BrokenOutput),
            StateManager::new("run", store),
            1,
            Metrics::new(),
        )
        .await
        .unwrap();

        assert!(matches!(sink.record(ok("1")).await, Err(SinkError::Output(_))));
        assert!(matches!(sink.finalize().await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn checkpoint_failure_is_fatal() {
        let output = MemoryOutputSink::new();
        let sink = ResultSink::open(
            Box::new(output.clone()),
            StateManager::new("run", Arc::new(NoStore)),
            1,
            Metrics::new(),
        )
        .await
        .unwrap();

        assert!(matches!(
            sink.record(ok("1")).await,
            Err(SinkError::Checkpoint(_))
        ));
        assert!(matches!(sink.record(ok("2")).await, Err(SinkError::Closed)));
    }
}
