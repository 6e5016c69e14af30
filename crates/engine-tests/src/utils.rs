use async_trait::async_trait;
use engine_config::settings::ScrapeSettings;
use engine_core::{
    connectors::{
        fetch::{ClientFactory, FetchClient},
        output::{MemoryOutputSink, OutputPosition, OutputSink},
    },
    error::{OutputError, SessionError},
    state::{StateStore, sled_store::SledStateStore},
};
use engine_processing::queue::IdSource;
use engine_runtime::execution::executor::ScrapeJob;
use model::{
    core::identifiers::ItemId,
    execution::{
        failed_item::FailedItem,
        fetch_result::{FailureKind, FetchResult},
        work_item::WorkItem,
    },
    records::{record::Record, schema::Schema},
};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

/// What a scripted client does on one call for an id.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(FailureKind),
    /// Sleeps, then succeeds.
    Slow(Duration),
    /// Panics inside the worker task.
    Panic,
}

/// Per-id outcome scripts shared by every client of a factory.
///
/// The n-th call for an id plays the n-th step; the last step repeats.
/// Ids without a script succeed at once.
#[derive(Default, Clone)]
pub struct Script {
    steps: Arc<HashMap<ItemId, Vec<Step>>>,
    default: Option<Step>,
    calls: Arc<Mutex<HashMap<ItemId, usize>>>,
    attempts: Arc<Mutex<HashMap<ItemId, Vec<u32>>>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, id: impl Into<ItemId>, steps: Vec<Step>) -> Self {
        Arc::make_mut(&mut self.steps).insert(id.into(), steps);
        self
    }

    /// Step used for every id without its own script.
    pub fn otherwise(mut self, step: Step) -> Self {
        self.default = Some(step);
        self
    }

    pub fn calls(&self, id: impl Into<ItemId>) -> usize {
        let id = id.into();
        self.calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    /// `attempt_count` of every call for `id`, in call order.
    pub fn attempts(&self, id: impl Into<ItemId>) -> Vec<u32> {
        let id = id.into();
        self.attempts.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn next_step(&self, item: &WorkItem) -> Step {
        let id = &item.id;
        self.attempts
            .lock()
            .unwrap()
            .entry(id.clone())
            .or_default()
            .push(item.attempt_count);
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(id.clone()).or_insert(0);
            *n += 1;
            *n - 1
        };
        match self.steps.get(id) {
            Some(steps) if !steps.is_empty() => steps[n.min(steps.len() - 1)].clone(),
            _ => self.default.clone().unwrap_or(Step::Succeed),
        }
    }
}

pub fn schema() -> Schema {
    Schema::new("id").required("value")
}

pub fn record_for(id: &ItemId) -> Record {
    Record::new(id.clone()).with("value", format!("value-{id}"))
}

pub struct ScriptedClient {
    script: Script,
}

#[async_trait]
impl FetchClient for ScriptedClient {
    async fn fetch(&self, item: &WorkItem) -> FetchResult {
        match self.script.next_step(item) {
            Step::Succeed => FetchResult::success(item, record_for(&item.id)),
            Step::Slow(delay) => {
                tokio::time::sleep(delay).await;
                FetchResult::success(item, record_for(&item.id))
            }
            Step::Fail(kind) => FetchResult::failure(item, kind, format!("scripted {kind}")),
            Step::Panic => panic!("scripted panic on {}", item.id),
        }
    }
}

#[derive(Clone, Default)]
pub struct ScriptedFactory {
    pub script: Script,
    pub fail_open: bool,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            fail_open: false,
        }
    }
}

#[async_trait]
impl ClientFactory for ScriptedFactory {
    async fn open(&self, worker: usize) -> Result<Box<dyn FetchClient>, SessionError> {
        if self.fail_open {
            return Err(SessionError::new(worker, "browser failed to start"));
        }
        Ok(Box::new(ScriptedClient {
            script: self.script.clone(),
        }))
    }
}

/// Memory output whose n-th commit (1-based) and every later one fails.
pub struct FailingOutput {
    pub inner: MemoryOutputSink,
    pub fail_from: usize,
    commits: usize,
}

impl FailingOutput {
    pub fn new(fail_from: usize) -> Self {
        Self {
            inner: MemoryOutputSink::new(),
            fail_from,
            commits: 0,
        }
    }
}

impl OutputSink for FailingOutput {
    fn commit(
        &mut self,
        records: &[Record],
        failures: &[FailedItem],
    ) -> Result<OutputPosition, OutputError> {
        self.commits += 1;
        if self.commits >= self.fail_from {
            return Err(OutputError::Io {
                path: "memory".into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.commit(records, failures)
    }

    fn rollback(
        &mut self,
        position: &OutputPosition,
        failures: &[FailedItem],
    ) -> Result<(), OutputError> {
        self.inner.rollback(position, failures)
    }

    fn position(&self) -> Result<OutputPosition, OutputError> {
        self.inner.position()
    }
}

/// Settings with no pacing and no backoff so scenarios run fast.
pub fn fast_settings(workers: usize, retries: u32, save_every: usize) -> ScrapeSettings {
    ScrapeSettings {
        workers,
        retries,
        save_every,
        timeout: 1.0,
        min_delay: 0.0,
        max_delay: 0.0,
        retry_backoff_ms: 0,
        progress_every: 0,
        ..ScrapeSettings::default()
    }
}

pub fn open_store(dir: &Path) -> Arc<dyn StateStore> {
    Arc::new(SledStateStore::open(dir.join("state")).expect("open sled store"))
}

pub fn job(
    run_key: &str,
    source: IdSource,
    settings: ScrapeSettings,
    clients: ScriptedFactory,
    output: Box<dyn OutputSink>,
    state: Arc<dyn StateStore>,
) -> ScrapeJob {
    ScrapeJob {
        run_key: run_key.to_string(),
        source,
        exclusions: Vec::new(),
        settings,
        clients: Arc::new(clients),
        output,
        state,
    }
}

pub fn ids(range: std::ops::Range<u64>) -> Vec<ItemId> {
    range.map(ItemId::from).collect()
}
