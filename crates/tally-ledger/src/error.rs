//! Error types for the vote ledger.

use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ledger operations.
///
/// Hitting the vote limit is not an error; it is reported through
/// [`VoteReceipt::recorded`](crate::VoteReceipt).
#[derive(Debug, Error)]
pub enum Error {
    /// The topic cannot take this vote, or the voter already cast it.
    /// Retrying without changing state will fail the same way.
    #[error("Invalid access: {0}")]
    InvalidAccess(String),

    /// Voter, topic or category does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed identifier or request value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for errors that async jobs treat as "skip this record".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
