//! Blob lifecycle: logical removal and time-gated physical deletion.

use crate::codec::{decode_u64, encode_u64};
use crate::error::{Error, Result};
use crate::id::Id;
use crate::keys;
use crate::store::{not_found, Store};
use cask_kv::{update, Transaction};
use futures::FutureExt;
use std::sync::Arc;
use time::OffsetDateTime;

impl Store {
    /// Mark a blob as removed: move it out of the visible namespace and
    /// stamp `deletedAt`.
    ///
    /// After removal [`blob`](Store::blob) fails with
    /// [`Error::BlobNotFound`]. Handles opened earlier keep a reference to
    /// the blob's subspace and keep reading until
    /// [`delete_removed_blobs_before`](Store::delete_removed_blobs_before)
    /// physically clears it; afterwards they fail with
    /// [`Error::BlobNotFound`] or observe end-of-stream. No stronger
    /// isolation is promised.
    pub async fn remove_blob(&self, id: &Id) -> Result<()> {
        let dirs = self.dirs.clone();
        let ns = self.namespace.clone();
        let clock = Arc::clone(&self.clock);
        let id_owned = id.clone();
        update(self.db.as_ref(), move |tr: &mut dyn Transaction| {
            let dirs = dirs.clone();
            let ns = ns.clone();
            let clock = Arc::clone(&clock);
            let id = id_owned.clone();
            async move {
                let src = [keys::ROOT, ns.as_str(), keys::BLOBS, id.as_str()];
                let dst = [keys::ROOT, ns.as_str(), keys::REMOVED, id.as_str()];
                let moved = dirs.move_to(tr, &src, &dst).await?;

                let deleted = clock.now().unix_timestamp();
                tr.set(
                    &keys::field(&moved, keys::DELETED_AT),
                    &encode_u64(deleted as u64),
                );
                Ok(())
            }
            .boxed()
        })
        .await
        .map_err(|err| not_found(err, id))
    }

    /// Physically delete removed blobs whose `deletedAt` is before `date`.
    ///
    /// Returns the ids actually deleted; an empty vec when nothing matched.
    /// Meant for a periodic cleaning job.
    pub async fn delete_removed_blobs_before(&self, date: OffsetDateTime) -> Result<Vec<Id>> {
        self.sweep(keys::REMOVED, keys::DELETED_AT, date).await
    }

    /// Physically delete uploads whose `uploadStartedAt` is before `date`:
    /// the staging areas of uploads that were never committed.
    ///
    /// Returns the ids actually deleted; an empty vec when nothing matched.
    pub async fn delete_uploads_started_before(&self, date: OffsetDateTime) -> Result<Vec<Id>> {
        self.sweep(keys::UPLOADS, keys::UPLOAD_STARTED_AT, date).await
    }

    async fn sweep(
        &self,
        parent: &'static str,
        field: &'static str,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<Id>> {
        let cutoff_stamp = cutoff.unix_timestamp();
        let dirs = self.dirs.clone();
        let ns = self.namespace.clone();
        let deleted = update(self.db.as_ref(), move |tr: &mut dyn Transaction| {
            let dirs = dirs.clone();
            let ns = ns.clone();
            async move {
                let names = dirs.list(&*tr, &[keys::ROOT, &ns, parent]).await?;
                let mut deleted = Vec::new();
                for name in names {
                    let path = [keys::ROOT, ns.as_str(), parent, name.as_str()];
                    let dir = dirs.open(&*tr, &path).await?;
                    let raw = tr.get(&keys::field(&dir, field)).await?;
                    let Some(stamp) = raw.as_deref().and_then(decode_u64) else {
                        continue;
                    };
                    if (stamp as i64) >= cutoff_stamp {
                        continue;
                    }
                    if dirs.remove(tr, &path).await? {
                        deleted.push(Id::from(name.as_str()));
                    }
                }
                Ok(deleted)
            }
            .boxed()
        })
        .await
        .map_err(Error::Kv)?;

        tracing::debug!(parent, count = deleted.len(), "swept expired entries");
        Ok(deleted)
    }
}
