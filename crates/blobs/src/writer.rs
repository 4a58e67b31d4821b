//! Chunked ingest: streams a byte source into a staging subspace.

use crate::codec::encode_u64;
use crate::error::{Error, Result};
use crate::keys;
use bytes::Bytes;
use cask_kv::{update, Database, Directory, Transaction};
use futures::FutureExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

pub(crate) struct BlobWriter<'a> {
    pub(crate) db: &'a Arc<dyn Database>,
    pub(crate) dir: &'a Directory,
    pub(crate) chunk_size: usize,
    pub(crate) chunks_per_transaction: usize,
}

impl BlobWriter<'_> {
    /// Consume `source` into `bytes/<index>` entries, then stamp `len` and
    /// `chunkSize` together in a final transaction. Returns the total byte
    /// count.
    pub(crate) async fn ingest<R>(
        &self,
        source: &mut R,
        cancel: &CancellationToken,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut next_index: u64 = 0;
        let mut written: u64 = 0;

        loop {
            // The batch is gathered before its transaction opens, so a
            // commit retry re-writes the same chunks instead of re-reading
            // the source.
            let mut batch: Vec<Bytes> = Vec::with_capacity(self.chunks_per_transaction);
            let mut terminal = false;
            while batch.len() < self.chunks_per_transaction {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let n = read_full(source, &mut chunk).await?;
                if n > 0 {
                    batch.push(Bytes::copy_from_slice(&chunk[..n]));
                    written += n as u64;
                }
                if n < self.chunk_size {
                    terminal = true;
                    break;
                }
            }

            if !batch.is_empty() {
                let first_index = next_index;
                let count = batch.len();
                next_index += count as u64;

                let batch = Arc::new(batch);
                let dir = self.dir.clone();
                update(self.db.as_ref(), move |tr: &mut dyn Transaction| {
                    let batch = Arc::clone(&batch);
                    let dir = dir.clone();
                    async move {
                        for (i, data) in batch.iter().enumerate() {
                            tr.set(&keys::chunk(&dir, first_index + i as u64), data);
                        }
                        Ok(())
                    }
                    .boxed()
                })
                .await
                .map_err(Error::Kv)?;
                tracing::debug!(first_index, chunks = count, "committed chunk batch");
            }

            if terminal {
                break;
            }
        }

        // len and chunkSize land together; their joint presence marks the
        // blob as fully written.
        let dir = self.dir.clone();
        let chunk_size = self.chunk_size as u64;
        update(self.db.as_ref(), move |tr: &mut dyn Transaction| {
            let dir = dir.clone();
            async move {
                tr.set(&keys::field(&dir, keys::LEN), &encode_u64(written));
                tr.set(&keys::field(&dir, keys::CHUNK_SIZE), &encode_u64(chunk_size));
                Ok(())
            }
            .boxed()
        })
        .await
        .map_err(Error::Kv)?;

        Ok(written)
    }
}

/// Fill `buf` from `source`, reading until it is full or the stream ends. A
/// short count therefore means end-of-stream.
async fn read_full<R>(source: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
