use connectors::{error::ConnectorError, file::csv::error::FileError};
use engine_config::settings::error::SettingsError;
use engine_runtime::error::RunError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to read input: {0}")]
    Input(#[from] FileError),

    #[error("Failed to set up the fetch clients: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Run failed: {0}")]
    Runner(#[from] RunError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
