//! Read-side handle to a committed blob.

use crate::codec::decode_u64;
use crate::error::{Error, Result};
use crate::id::Id;
use crate::keys;
use crate::reader::BlobReader;
use cask_kv::{read, Database, Directory, ReadTransaction, MAX_TRANSACTION_SIZE};
use futures::FutureExt;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// A committed blob: id, length, creation time, and streaming content.
///
/// The handle keeps a reference to the blob's subspace, so it remains
/// readable after [`Store::remove_blob`](crate::Store::remove_blob) until the
/// removed entry is physically swept.
#[derive(Clone)]
pub struct Blob {
    db: Arc<dyn Database>,
    dir: Directory,
    /// The chunk size recorded when the blob was written.
    chunk_size: usize,
    chunks_per_transaction: usize,
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob")
            .field("dir", &self.dir)
            .field("chunk_size", &self.chunk_size)
            .field("chunks_per_transaction", &self.chunks_per_transaction)
            .finish()
    }
}

impl Blob {
    pub(crate) fn new(
        db: Arc<dyn Database>,
        dir: Directory,
        chunk_size: usize,
        chunks_per_transaction: usize,
    ) -> Self {
        Self {
            db,
            dir,
            chunk_size,
            chunks_per_transaction,
        }
    }

    /// The blob's id.
    pub fn id(&self) -> Id {
        Id::from(self.dir.name())
    }

    /// Total length in bytes.
    pub async fn len(&self) -> Result<u64> {
        let raw = self.get_field(keys::LEN).await?;
        raw.as_deref()
            .and_then(decode_u64)
            .ok_or_else(|| Error::BlobNotFound(self.id()))
    }

    /// When the blob was committed.
    pub async fn created_at(&self) -> Result<OffsetDateTime> {
        let raw = self.get_field(keys::CREATED_AT).await?;
        let stamp = raw
            .as_deref()
            .and_then(decode_u64)
            .ok_or_else(|| Error::BlobNotFound(self.id()))?;
        OffsetDateTime::from_unix_timestamp(stamp as i64)
            .map_err(|_| Error::BlobNotFound(self.id()))
    }

    /// A fresh reader positioned at offset zero.
    ///
    /// Verifies the blob was committed first, so opening a reader for a
    /// not-yet-committed id fails immediately.
    pub async fn reader(&self) -> Result<BlobReader> {
        self.created_at().await?;
        Ok(BlobReader::new(
            Arc::clone(&self.db),
            self.dir.clone(),
            self.chunk_size,
            self.chunks_per_transaction,
        ))
    }

    /// Drain the whole blob into memory, checking `cancel` between reads.
    pub async fn content(&self, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let mut reader = self.reader().await?;
        let mut content = Vec::new();
        // One transaction-batch worth of bytes per pass, never more than the
        // commit limit.
        let buf_len = self
            .chunk_size
            .saturating_mul(self.chunks_per_transaction)
            .min(MAX_TRANSACTION_SIZE);
        let mut buf = vec![0u8; buf_len];
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(content);
            }
            content.extend_from_slice(&buf[..n]);
        }
    }

    async fn get_field(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let key = keys::field(&self.dir, name);
        read(self.db.as_ref(), move |tr: &dyn ReadTransaction| {
            let key = key.clone();
            async move { tr.get(&key).await }.boxed()
        })
        .await
        .map_err(Error::Kv)
    }
}
