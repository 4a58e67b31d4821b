//! The blob store: two-phase upload, commit, and read access.

use crate::blob::Blob;
use crate::clock::{RealClock, SystemClock};
use crate::codec::{decode_u64, encode_u64};
use crate::error::{Error, Result};
use crate::id::{Id, IdGenerator, UlidGenerator};
use crate::keys;
use crate::writer::BlobWriter;
use crate::{DEFAULT_CHUNKS_PER_TRANSACTION, DEFAULT_CHUNK_SIZE};
use cask_kv::{
    read, update, Database, Directory, DirectoryLayer, KvError, KvResult, ReadTransaction,
    Transaction, MAX_TRANSACTION_SIZE, MAX_VALUE_SIZE,
};
use futures::FutureExt;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Store construction options.
///
/// `chunk_size` and `chunks_per_transaction` apply to new writes only; reads
/// always use the chunk size recorded with each blob.
#[derive(Clone)]
pub struct StoreOptions {
    pub chunk_size: usize,
    pub chunks_per_transaction: usize,
    pub clock: Arc<dyn SystemClock>,
    pub id_generator: Arc<dyn IdGenerator>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunks_per_transaction: DEFAULT_CHUNKS_PER_TRANSACTION,
            clock: Arc::new(RealClock),
            id_generator: Arc::new(UlidGenerator),
        }
    }
}

impl StoreOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_chunks_per_transaction(mut self, chunks_per_transaction: usize) -> Self {
        self.chunks_per_transaction = chunks_per_transaction;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn SystemClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Check the options against the KV store's value and commit limits.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.chunk_size < 1 {
            return Err(format!("invalid chunk_size 1 > {}", self.chunk_size));
        }
        if self.chunk_size > MAX_VALUE_SIZE {
            return Err(format!(
                "chunk_size {} exceeds the {} byte value limit",
                self.chunk_size, MAX_VALUE_SIZE
            ));
        }
        if self.chunks_per_transaction < 1 {
            return Err(format!(
                "invalid chunks_per_transaction 1 > {}",
                self.chunks_per_transaction
            ));
        }
        match self.chunk_size.checked_mul(self.chunks_per_transaction) {
            Some(batch) if batch <= MAX_TRANSACTION_SIZE => Ok(()),
            _ => Err(format!(
                "chunk_size {} x chunks_per_transaction {} exceeds the {} byte commit limit",
                self.chunk_size, self.chunks_per_transaction, MAX_TRANSACTION_SIZE
            )),
        }
    }
}

/// Opaque handle to a staged upload, produced by [`Store::upload`].
#[derive(Clone, Debug, Default)]
pub struct UploadToken {
    pub(crate) dir: Option<Directory>,
}

impl UploadToken {
    /// The id the upload was staged under, if the token is valid.
    pub fn id(&self) -> Option<Id> {
        self.dir.as_ref().map(|dir| Id::from(dir.name()))
    }
}

/// A chunked blob store over one namespace of an ordered transactional KV.
///
/// Cheap to clone and safe to share across tasks; the handles it returns
/// ([`Blob`], [`BlobReader`](crate::BlobReader)) carry their own cursor state
/// and are not for concurrent use.
#[derive(Clone)]
pub struct Store {
    pub(crate) db: Arc<dyn Database>,
    pub(crate) dirs: DirectoryLayer,
    pub(crate) namespace: String,
    pub(crate) chunk_size: usize,
    pub(crate) chunks_per_transaction: usize,
    pub(crate) clock: Arc<dyn SystemClock>,
    pub(crate) id_generator: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("dirs", &self.dirs)
            .field("namespace", &self.namespace)
            .field("chunk_size", &self.chunk_size)
            .field("chunks_per_transaction", &self.chunks_per_transaction)
            .finish()
    }
}

impl Store {
    /// Open the namespace, creating its root subspaces when absent.
    pub async fn new(db: Arc<dyn Database>, namespace: &str, options: StoreOptions) -> Result<Store> {
        options.validate().map_err(Error::Config)?;

        let dirs = DirectoryLayer::new();
        let ns = namespace.to_string();
        {
            let dirs = dirs.clone();
            let ns = ns.clone();
            update(db.as_ref(), move |tr: &mut dyn Transaction| {
                let dirs = dirs.clone();
                let ns = ns.clone();
                async move {
                    for child in [keys::BLOBS, keys::UPLOADS, keys::REMOVED] {
                        dirs.create_or_open(tr, &[keys::ROOT, &ns, child]).await?;
                    }
                    Ok(())
                }
                .boxed()
            })
            .await
            .map_err(Error::Kv)?;
        }

        Ok(Store {
            db,
            dirs,
            namespace: ns,
            chunk_size: options.chunk_size,
            chunks_per_transaction: options.chunks_per_transaction,
            clock: options.clock,
            id_generator: options.id_generator,
        })
    }

    /// Stream `source` into a staging subspace and return a token for
    /// committing it later with [`commit_upload`](Store::commit_upload).
    ///
    /// A failed or abandoned upload leaves its staging subspace behind;
    /// [`delete_uploads_started_before`](Store::delete_uploads_started_before)
    /// reclaims it.
    pub async fn upload<R>(&self, source: &mut R, cancel: &CancellationToken) -> Result<UploadToken>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let dir = self.stage(source, cancel).await?;
        Ok(UploadToken { dir: Some(dir) })
    }

    /// Promote a staged upload into the visible namespace and stamp
    /// `createdAt`, inside a caller-supplied transaction.
    ///
    /// The caller's transaction stays open, so the commit composes
    /// atomically with the caller's own writes.
    pub async fn commit_upload(&self, tr: &mut dyn Transaction, token: UploadToken) -> Result<Id> {
        let Some(staged) = token.dir else {
            return Err(Error::InvalidUploadToken);
        };
        commit_staged(tr, &self.dirs, &self.namespace, self.clock.as_ref(), staged)
            .await
            .map_err(Error::Kv)
    }

    /// Upload `source` and commit it in one internal transaction, returning
    /// a handle to the new blob.
    pub async fn create<R>(&self, source: &mut R, cancel: &CancellationToken) -> Result<Blob>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let staged = self.stage(source, cancel).await?;

        let dirs = self.dirs.clone();
        let ns = self.namespace.clone();
        let clock = Arc::clone(&self.clock);
        let id = update(self.db.as_ref(), move |tr: &mut dyn Transaction| {
            let dirs = dirs.clone();
            let ns = ns.clone();
            let clock = Arc::clone(&clock);
            let staged = staged.clone();
            async move { commit_staged(tr, &dirs, &ns, clock.as_ref(), staged).await }.boxed()
        })
        .await
        .map_err(Error::Kv)?;

        self.blob(&id).await
    }

    /// Open a committed blob.
    ///
    /// The returned handle reads with the chunk size recorded when the blob
    /// was written; a blob whose `chunkSize` field is missing or malformed
    /// is treated as not found rather than guessed at.
    pub async fn blob(&self, id: &Id) -> Result<Blob> {
        let dirs = self.dirs.clone();
        let ns = self.namespace.clone();
        let id_owned = id.clone();
        let (dir, raw_chunk_size) = read(self.db.as_ref(), move |tr: &dyn ReadTransaction| {
            let dirs = dirs.clone();
            let ns = ns.clone();
            let id = id_owned.clone();
            async move {
                let dir = dirs
                    .open(tr, &[keys::ROOT, &ns, keys::BLOBS, id.as_str()])
                    .await?;
                let raw = tr.get(&keys::field(&dir, keys::CHUNK_SIZE)).await?;
                Ok((dir, raw))
            }
            .boxed()
        })
        .await
        .map_err(|err| not_found(err, id))?;

        let chunk_size = raw_chunk_size
            .as_deref()
            .and_then(decode_u64)
            .filter(|&n| n >= 1 && n <= MAX_VALUE_SIZE as u64)
            .ok_or_else(|| Error::BlobNotFound(id.clone()))?;

        Ok(Blob::new(
            Arc::clone(&self.db),
            dir,
            chunk_size as usize,
            self.chunks_per_transaction,
        ))
    }

    /// Mint an id, create the staging subspace with its `uploadStartedAt`
    /// stamp, and run the writer against it.
    async fn stage<R>(&self, source: &mut R, cancel: &CancellationToken) -> Result<Directory>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let id = self.id_generator.next_id();

        let dirs = self.dirs.clone();
        let ns = self.namespace.clone();
        let clock = Arc::clone(&self.clock);
        let id_owned = id.clone();
        let dir = update(self.db.as_ref(), move |tr: &mut dyn Transaction| {
            let dirs = dirs.clone();
            let ns = ns.clone();
            let clock = Arc::clone(&clock);
            let id = id_owned.clone();
            async move {
                let dir = dirs
                    .create(tr, &[keys::ROOT, &ns, keys::UPLOADS, id.as_str()])
                    .await?;
                let started = clock.now().unix_timestamp();
                tr.set(
                    &keys::field(&dir, keys::UPLOAD_STARTED_AT),
                    &encode_u64(started as u64),
                );
                Ok(dir)
            }
            .boxed()
        })
        .await
        .map_err(Error::Kv)?;

        tracing::debug!(id = %id, "staged upload");
        let writer = BlobWriter {
            db: &self.db,
            dir: &dir,
            chunk_size: self.chunk_size,
            chunks_per_transaction: self.chunks_per_transaction,
        };
        writer.ingest(source, cancel).await?;
        Ok(dir)
    }
}

/// Move a staged upload under `blobs/` and stamp `createdAt`.
async fn commit_staged(
    tr: &mut dyn Transaction,
    dirs: &DirectoryLayer,
    namespace: &str,
    clock: &dyn SystemClock,
    staged: Directory,
) -> KvResult<Id> {
    let id = Id::from(staged.name());
    let src: Vec<&str> = staged.path().iter().map(String::as_str).collect();
    let dst = [keys::ROOT, namespace, keys::BLOBS, staged.name()];
    let moved = dirs.move_to(tr, &src, &dst).await?;

    let created = clock.now().unix_timestamp();
    tr.set(
        &keys::field(&moved, keys::CREATED_AT),
        &encode_u64(created as u64),
    );
    Ok(id)
}

pub(crate) fn not_found(err: KvError, id: &Id) -> Error {
    match err {
        KvError::DirectoryNotFound(_) => Error::BlobNotFound(id.clone()),
        other => Error::Kv(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(StoreOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let options = StoreOptions::default().with_chunk_size(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_chunk_size_over_value_limit() {
        let options = StoreOptions::default().with_chunk_size(MAX_VALUE_SIZE + 1);
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_zero_chunks_per_transaction() {
        let options = StoreOptions::default().with_chunks_per_transaction(0);
        assert!(options.validate().is_err());
    }

    #[test]
    fn rejects_batches_over_commit_limit() {
        let options = StoreOptions::default()
            .with_chunk_size(MAX_VALUE_SIZE)
            .with_chunks_per_transaction(MAX_TRANSACTION_SIZE / MAX_VALUE_SIZE + 1);
        assert!(options.validate().is_err());
    }

    #[test]
    fn default_token_has_no_id() {
        assert_eq!(UploadToken::default().id(), None);
    }
}
