//! Streaming blob reads.

use crate::error::{Error, Result};
use crate::keys;
use bytes::{Buf, Bytes};
use cask_kv::{read, Database, Directory, ReadTransaction};
use futures::FutureExt;
use std::sync::Arc;

/// A pull-based reader over a blob's chunks.
///
/// Each call fetches a contiguous chunk range in one read-only transaction,
/// bounded by the batching factor. Bytes that do not fit the caller's buffer
/// are carried over to the next call, so any sequence of buffer sizes yields
/// the blob's bytes in order with no loss and no re-reads.
///
/// Not for concurrent use from multiple tasks; the cursor is mutable state.
pub struct BlobReader {
    db: Arc<dyn Database>,
    dir: Directory,
    /// The chunk size the blob was written with (not the store's).
    chunk_size: usize,
    chunks_per_transaction: usize,
    /// Next chunk index to fetch.
    offset: u64,
    /// Leftover from the last fetched chunk.
    carry: Bytes,
    done: bool,
}

impl BlobReader {
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
            offset: 0,
            carry: Bytes::new(),
            done: false,
        }
    }

    /// Fill `buf` with the next bytes of the blob.
    ///
    /// Returns the number of bytes written; `Ok(0)` for a non-empty `buf`
    /// means end-of-stream. Reads may be short at batch boundaries, so
    /// callers keep calling until `Ok(0)`.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = self.carry.len().min(buf.len());
        buf[..filled].copy_from_slice(&self.carry[..filled]);
        self.carry.advance(filled);

        if filled == buf.len() || self.done {
            return Ok(filled);
        }

        // Enough chunks to plausibly fill the rest, capped per transaction.
        let remaining = buf.len() - filled;
        let wanted = remaining
            .div_ceil(self.chunk_size)
            .min(self.chunks_per_transaction);
        let range = keys::chunk_range(&self.dir, self.offset, self.offset + wanted as u64);
        let entries = read(self.db.as_ref(), move |tr: &dyn ReadTransaction| {
            let range = range.clone();
            async move { tr.get_range(&range, None).await }.boxed()
        })
        .await
        .map_err(Error::Kv)?;

        if entries.is_empty() {
            self.done = true;
            return Ok(filled);
        }

        for (_, value) in entries {
            let n = value.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&value[..n]);
            self.offset += 1;
            filled += n;

            if n < value.len() {
                // Out of output buffer; keep the rest for the next call.
                self.carry = Bytes::from(value).slice(n..);
                return Ok(filled);
            }
            if value.len() < self.chunk_size {
                // A short chunk is the blob's final chunk.
                self.done = true;
                return Ok(filled);
            }
        }
        Ok(filled)
    }
}
