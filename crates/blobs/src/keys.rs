//! Key construction for the blob keyspace.
//!
//! Layout: `fdb-blobs/<namespace>/{blobs|uploads|removed}/<id>/<field>`, with
//! chunk content under `bytes/<index>`. Field names and casing are part of
//! the stored format.

use cask_kv::{Directory, Element, KeyRange};

pub(crate) const ROOT: &str = "fdb-blobs";
pub(crate) const BLOBS: &str = "blobs";
pub(crate) const UPLOADS: &str = "uploads";
pub(crate) const REMOVED: &str = "removed";

pub(crate) const BYTES: &str = "bytes";
pub(crate) const LEN: &str = "len";
pub(crate) const CHUNK_SIZE: &str = "chunkSize";
pub(crate) const UPLOAD_STARTED_AT: &str = "uploadStartedAt";
pub(crate) const CREATED_AT: &str = "createdAt";
pub(crate) const DELETED_AT: &str = "deletedAt";

pub(crate) fn field(dir: &Directory, name: &str) -> Vec<u8> {
    dir.subspace().pack(&[Element::from(name)])
}

pub(crate) fn chunk(dir: &Directory, index: u64) -> Vec<u8> {
    dir.subspace()
        .pack(&[Element::from(BYTES), Element::U64(index)])
}

/// Keys of the chunks `[start, end)`, ascending by index.
pub(crate) fn chunk_range(dir: &Directory, start: u64, end: u64) -> KeyRange {
    KeyRange::new(chunk(dir, start), chunk(dir, end))
}
