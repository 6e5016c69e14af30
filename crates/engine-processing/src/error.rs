use engine_core::error::{OutputError, StateStoreError};
use thiserror::Error;

/// Persistence failures of the result sink. Any of these is fatal to a run.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write output: {0}")]
    Output(#[from] OutputError),

    #[error("Failed to save checkpoint: {0}")]
    Checkpoint(#[from] StateStoreError),

    #[error("Failed to load checkpoint for run '{run_key}': {source}")]
    Resume {
        run_key: String,
        #[source]
        source: StateStoreError,
    },

    #[error("Failed to roll output back to the last checkpoint: {0}")]
    Rollback(#[source] OutputError),

    #[error("Result sink is closed")]
    Closed,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid id window: start {start} is not below end {end}")]
    InvalidWindow { start: usize, end: usize },
}
