//! Error types for the tally node.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Error raised by the vote engine
    #[error(transparent)]
    Ledger(#[from] tally_ledger::Error),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad environment or config value
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP server error
    #[error("HTTP error: {0}")]
    Http(String),

    /// The background job worker is gone or a job panicked
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Node errors surfacing through the [`VoteStore`](tally_ledger::VoteStore)
/// seam become ledger storage errors.
impl From<Error> for tally_ledger::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Ledger(inner) => inner,
            other => tally_ledger::Error::Storage(other.to_string()),
        }
    }
}
