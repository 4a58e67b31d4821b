//! Error types for the KV abstraction.

use thiserror::Error;

/// Errors surfaced by transactions, the directory layer, and backends.
#[derive(Debug, Error)]
pub enum KvError {
    /// A concurrent commit invalidated this transaction. Retryable.
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("directory already exists: {0}")]
    DirectoryExists(String),

    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("transaction too large: {size} bytes (max {max})")]
    TransactionTooLarge { size: usize, max: usize },

    #[error("malformed key encoding: {0}")]
    MalformedKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KvError {
    /// Whether the operation may succeed when re-run against a fresh
    /// transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Conflict(_))
    }
}

/// Result type for KV operations.
pub type KvResult<T> = std::result::Result<T, KvError>;

/// Error types usable with the [`read`](crate::read) and
/// [`update`](crate::update) helpers.
///
/// Implemented by [`KvError`] itself and by domain error types that wrap it,
/// so transactional closures can return domain errors directly.
pub trait TransactError: From<KvError> {
    /// Whether the closure should be re-run against a fresh transaction.
    fn is_retryable(&self) -> bool;
}

impl TransactError for KvError {
    fn is_retryable(&self) -> bool {
        KvError::is_retryable(self)
    }
}
