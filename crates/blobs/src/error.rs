//! Error types for the blob store.

use crate::id::Id;
use cask_kv::{KvError, TransactError};
use thiserror::Error;

/// Blob store error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The id has no committed blob, or a required metadata field is missing.
    #[error("blob not found: \"{0}\"")]
    BlobNotFound(Id),

    #[error("invalid upload token: tokens must be produced by the upload method")]
    InvalidUploadToken,

    #[error("operation cancelled")]
    Cancelled,

    /// An error reading from the caller-supplied byte source.
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error surfaced by the underlying KV store, propagated unchanged.
    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TransactError for Error {
    fn is_retryable(&self) -> bool {
        matches!(self, Error::Kv(err) if err.is_retryable())
    }
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, Error>;
