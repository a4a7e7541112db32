use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] duka_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Record not found for id/prefix: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("No product with SKU '{0}'; pass --unit-price")]
    UnknownSku(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync aborted: {0}")]
    SyncAborted(String),
    #[error(
        "Sync is not configured. Run `duka config init --api-url <URL>` or set DUKA_API_URL."
    )]
    SyncNotConfigured,
}
