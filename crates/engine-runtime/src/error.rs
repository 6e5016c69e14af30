use engine_config::settings::error::SettingsError;
use engine_core::error::{SessionError, StateStoreError};
use engine_processing::error::{QueueError, SinkError};
use thiserror::Error;

/// Top-level errors of a scrape run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Output or checkpoint write failed. The run was halted to keep them consistent.
    #[error("Persistence error: {0}")]
    Persistence(#[from] SinkError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("State store error: {0}")]
    StateStore(#[from] StateStoreError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A worker task died. The items it had not pulled were never fetched.
    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

/// Why a single worker stopped early.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Persistence(#[from] SinkError),

    #[error("worker task panicked: {0}")]
    Panicked(String),
}
