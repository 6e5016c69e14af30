use crate::{
    error::{RunError, WorkerError},
    execution::{
        summary::{RunStatus, RunSummary},
        workers::WorkerPool,
    },
};
use chrono::Utc;
use engine_config::settings::ScrapeSettings;
use engine_core::{
    connectors::{fetch::ClientFactory, output::OutputSink},
    metrics::Metrics,
    state::{StateStore, file_store::JsonFileStateStore, sled_store::SledStateStore},
};
use engine_processing::{
    queue::{IdSource, WorkQueue},
    retry::RetryExecutor,
    sink::ResultSink,
    state_manager::StateManager,
};
use model::core::identifiers::ItemId;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything one run needs. Built by the CLI, consumed by `run`.
pub struct ScrapeJob {
    pub run_key: String,
    pub source: IdSource,
    pub exclusions: Vec<ItemId>,
    pub settings: ScrapeSettings,
    pub clients: Arc<dyn ClientFactory>,
    pub output: Box<dyn OutputSink>,
    pub state: Arc<dyn StateStore>,
}

/// Which checkpoint store backs a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateBackend {
    #[default]
    Sled,
    Json,
}

pub async fn run(job: ScrapeJob, cancel: CancellationToken) -> Result<RunSummary, RunError> {
    job.settings.validate()?;

    let started_at = Utc::now();
    let clock = Instant::now();
    let metrics = Metrics::new();
    let settings = job.settings;

    info!(
        run_key = %job.run_key,
        workers = settings.effective_workers(),
        save_every = settings.save_every,
        "Starting run"
    );

    let sink = Arc::new(
        ResultSink::open(
            job.output,
            StateManager::new(job.run_key.clone(), job.state),
            settings.save_every,
            metrics.clone(),
        )
        .await?,
    );

    let queue = Arc::new(
        WorkQueue::builder(job.source)
            .window(settings.start, settings.end)
            .completed(sink.completed_ids().await)
            .exclude(job.exclusions)
            .build()?,
    );

    let executor = RetryExecutor::new(
        settings.retry_policy(),
        settings.rate_limiter(),
        metrics.clone(),
    );
    let pool = WorkerPool::new(settings.effective_workers(), executor, job.clients)
        .with_progress_every(settings.progress_every);

    let outcome = pool.run(Arc::clone(&queue), Arc::clone(&sink), &cancel).await;

    let fatal = match outcome.error {
        Some(WorkerError::Persistence(err)) => {
            error!(run_key = %job.run_key, error = %err, "Run halted by a persistence failure");
            return Err(RunError::Persistence(err));
        }
        Some(WorkerError::Session(err)) => Some(RunError::Session(err)),
        Some(WorkerError::Panicked(msg)) => {
            error!(run_key = %job.run_key, error = %msg, "Run halted by a failed worker");
            Some(RunError::WorkerFailed(msg))
        }
        None => None,
    };

    if cancel.is_cancelled() {
        warn!(run_key = %job.run_key, "Shutdown requested, writing final flush");
    }
    let last = sink.finalize().await?;

    if let Some(err) = fatal {
        return Err(err);
    }

    let status = if cancel.is_cancelled() && !queue.is_exhausted() {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };

    let snapshot = metrics.snapshot();
    let stats = queue.stats();
    let checkpoint = sink.checkpoint().await;
    let summary = RunSummary {
        run_key: job.run_key,
        status,
        succeeded: snapshot.succeeded,
        failed: snapshot.failed,
        retries: snapshot.retries,
        flushes: snapshot.flushes,
        peak_in_flight: snapshot.peak_in_flight,
        skipped_completed: stats.skipped_completed,
        skipped_excluded: stats.skipped_excluded,
        completed_total: checkpoint.completed_ids.len(),
        failed_ids: sink.failed_ids().await.into_iter().collect(),
        last_flush_index: last.flush_index,
        started_at,
        elapsed: clock.elapsed(),
    };

    info!(
        run_key = %summary.run_key,
        status = ?summary.status,
        succeeded = summary.succeeded,
        failed = summary.failed,
        retries = summary.retries,
        flushes = summary.flushes,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "Run finished"
    );
    Ok(summary)
}

/// Stable key for a run: the same output and id window resume the same checkpoint.
pub fn make_run_key(mode: &str, output: &Path, start: Option<usize>, end: Option<usize>) -> String {
    let mut h = blake3::Hasher::new();
    h.update(mode.as_bytes());
    h.update(b":");
    h.update(output.to_string_lossy().as_bytes());
    h.update(b":");
    h.update(start.map(|s| s.to_string()).unwrap_or_default().as_bytes());
    h.update(b"..");
    h.update(end.map(|e| e.to_string()).unwrap_or_default().as_bytes());
    format!("run-{}", &h.finalize().to_hex()[..16])
}

/// `~/.harvest/state`, the default checkpoint location.
pub fn default_state_dir() -> Result<PathBuf, RunError> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        RunError::Initialization("Could not determine home directory".to_string())
    })?;
    Ok(home_dir.join(".harvest/state"))
}

pub async fn open_state_store(
    backend: StateBackend,
    dir: Option<&Path>,
) -> Result<Arc<dyn StateStore>, RunError> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => default_state_dir()?,
    };

    let store: Arc<dyn StateStore> = match backend {
        StateBackend::Sled => Arc::new(SledStateStore::open(&dir)?),
        StateBackend::Json => Arc::new(JsonFileStateStore::open(&dir).await?),
    };
    info!(path = %dir.display(), backend = ?backend, "Opened checkpoint store");
    Ok(store)
}
