use crate::error::WorkerError;
use engine_core::connectors::fetch::{ClientFactory, FetchClient};
use engine_processing::{queue::WorkQueue, retry::RetryExecutor, sink::ResultSink};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Lifecycle of one worker between queue pulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Fetching,
    Succeeded,
    Failed,
}

/// How the pool stopped.
#[derive(Debug, Default)]
pub struct PoolOutcome {
    /// First fatal worker error, if any. Later ones are logged only.
    pub error: Option<WorkerError>,
    pub processed: u64,
}

/// Fixed number of workers draining one queue into one sink.
pub struct WorkerPool {
    workers: usize,
    executor: RetryExecutor,
    clients: Arc<dyn ClientFactory>,
    progress_every: u64,
}

struct Progress {
    processed: AtomicU64,
    every: u64,
    started: Instant,
}

impl Progress {
    fn tick(&self) {
        let n = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        if self.every > 0 && n % self.every == 0 {
            info!(
                processed = n,
                elapsed_secs = self.started.elapsed().as_secs(),
                "Progress"
            );
        }
    }
}

impl WorkerPool {
    pub fn new(workers: usize, executor: RetryExecutor, clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            workers: workers.max(1),
            executor,
            clients,
            progress_every: 10,
        }
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    /// Runs until the queue is drained, `cancel` fires, or a worker hits a fatal error.
    ///
    /// Workers finish the item they are on before exiting. A fatal error in one
    /// worker stops the others through a child token, leaving `cancel` untouched.
    pub async fn run(
        &self,
        queue: Arc<WorkQueue>,
        sink: Arc<ResultSink>,
        cancel: &CancellationToken,
    ) -> PoolOutcome {
        info!(workers = self.workers, "Launching workers");

        let halt = cancel.child_token();
        let progress = Arc::new(Progress {
            processed: AtomicU64::new(0),
            every: self.progress_every,
            started: Instant::now(),
        });

        let mut set = JoinSet::new();
        for worker in 0..self.workers {
            let clients = Arc::clone(&self.clients);
            let executor = self.executor.clone();
            let queue = Arc::clone(&queue);
            let sink = Arc::clone(&sink);
            let halt = halt.clone();
            let progress = Arc::clone(&progress);

            set.spawn(async move {
                let client = match clients.open(worker).await {
                    Ok(client) => client,
                    Err(err) => {
                        error!(worker, error = %err, "Failed to open session");
                        halt.cancel();
                        return Err(WorkerError::Session(err));
                    }
                };

                let result =
                    worker_loop(worker, client.as_ref(), &executor, &queue, &sink, &halt, &progress)
                        .await;
                client.shutdown().await;
                result
            });
        }

        let mut outcome = PoolOutcome::default();
        while let Some(joined) = set.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(join_err) => {
                    error!(error = %join_err, "Worker task failed");
                    halt.cancel();
                    WorkerError::Panicked(join_err.to_string())
                }
            };
            if outcome.error.is_none() {
                outcome.error = Some(err);
            } else {
                debug!(error = %err, "Additional worker error");
            }
        }

        outcome.processed = progress.processed.load(Ordering::Relaxed);
        info!(processed = outcome.processed, "All workers exited");
        outcome
    }
}

async fn worker_loop(
    worker: usize,
    client: &dyn FetchClient,
    executor: &RetryExecutor,
    queue: &WorkQueue,
    sink: &ResultSink,
    halt: &CancellationToken,
    progress: &Progress,
) -> Result<(), WorkerError> {
    let mut state = WorkerState::Idle;

    loop {
        if halt.is_cancelled() {
            debug!(worker, "Stop requested, worker exiting");
            break;
        }

        let Some(item) = queue.next() else {
            debug!(worker, "Queue drained, worker exiting");
            break;
        };

        state = transition(worker, state, WorkerState::Fetching);
        let result = executor.execute(client, item, halt).await;
        let done = if result.is_success() {
            WorkerState::Succeeded
        } else {
            WorkerState::Failed
        };
        state = transition(worker, state, done);

        if let Err(err) = sink.record(result).await {
            error!(worker, error = %err, "Failed to persist results, halting");
            halt.cancel();
            return Err(WorkerError::Persistence(err));
        }
        progress.tick();

        state = transition(worker, state, WorkerState::Idle);
    }

    Ok(())
}

fn transition(worker: usize, from: WorkerState, to: WorkerState) -> WorkerState {
    trace!(worker, ?from, ?to, "Worker state");
    to
}
