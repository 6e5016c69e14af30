use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to save checkpoint: {0}")]
    SaveCheckpoint(String),

    #[error("Failed to load checkpoint: {0}")]
    LoadCheckpoint(String),

    #[error("Failed to encode checkpoint: {0}")]
    Encode(String),

    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by an output sink while committing or rolling back rows.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode row for {path}: {message}")]
    Encode { path: String, message: String },

    /// The file is shorter than the committed position; committed rows were lost.
    #[error("{path} holds {actual} bytes but {expected} were committed")]
    Truncated {
        path: String,
        expected: u64,
        actual: u64,
    },
}

/// A worker could not obtain its fetch session (browser launch, client build, ...).
#[derive(Error, Debug)]
#[error("Failed to open fetch session for worker {worker}: {message}")]
pub struct SessionError {
    pub worker: usize,
    pub message: String,
}

impl SessionError {
    pub fn new(worker: usize, message: impl Into<String>) -> Self {
        Self {
            worker,
            message: message.into(),
        }
    }
}
