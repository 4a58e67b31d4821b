//! Directory layer: logical paths mapped to short physical key prefixes.
//!
//! Node entries live in a reserved keyspace and point a path (a list of
//! string segments) at an allocated data prefix. Because the data prefix
//! never changes, renaming a directory is a single indirection update and
//! handles opened before the rename keep reading the same data.

use crate::error::{KvError, KvResult};
use crate::subspace::Subspace;
use crate::traits::{strinc, KeyRange, ReadTransaction, Transaction};
use crate::tuple::{self, Element};

// Node entries live under 0xFE, the allocation counter at 0xFD; allocated
// data prefixes are packed integers (0x14..=0x1C), so the three never collide.
const NODE_ROOT: u8 = 0xFE;
const COUNTER_KEY: u8 = 0xFD;

/// A handle to an opened directory: its logical path and its data subspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directory {
    path: Vec<String>,
    subspace: Subspace,
}

impl Directory {
    fn new(path: &[&str], prefix: Vec<u8>) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            subspace: Subspace::new(prefix),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The last path segment.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }
}

/// The directory layer itself. Stateless; all operations run inside a
/// caller-provided transaction so they compose with other writes.
#[derive(Clone, Debug, Default)]
pub struct DirectoryLayer;

impl DirectoryLayer {
    pub fn new() -> Self {
        Self
    }

    fn node_key(&self, path: &[&str]) -> Vec<u8> {
        let mut key = vec![NODE_ROOT];
        for segment in path {
            tuple::pack_into(&mut key, &[Element::from(*segment)]);
        }
        key
    }

    /// Allocate a fresh data prefix from the counter key.
    async fn allocate(&self, tr: &mut dyn Transaction) -> KvResult<Vec<u8>> {
        let counter_key = [COUNTER_KEY];
        let next = match tr.get(&counter_key).await? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| {
                    KvError::MalformedKey("malformed directory allocation counter".to_string())
                })?;
                u64::from_le_bytes(bytes)
            }
            None => 0,
        };
        tr.set(&counter_key, &(next + 1).to_le_bytes());
        Ok(tuple::pack(&[Element::U64(next)]))
    }

    /// Open `path`, failing if it does not exist.
    pub async fn open(&self, tr: &dyn ReadTransaction, path: &[&str]) -> KvResult<Directory> {
        match tr.get(&self.node_key(path)).await? {
            Some(prefix) => Ok(Directory::new(path, prefix)),
            None => Err(KvError::DirectoryNotFound(join(path))),
        }
    }

    pub async fn exists(&self, tr: &dyn ReadTransaction, path: &[&str]) -> KvResult<bool> {
        Ok(tr.get(&self.node_key(path)).await?.is_some())
    }

    /// Create `path`, failing if it already exists. Missing ancestors are
    /// created along the way.
    pub async fn create(&self, tr: &mut dyn Transaction, path: &[&str]) -> KvResult<Directory> {
        if path.is_empty() {
            return Err(KvError::DirectoryExists(join(path)));
        }
        if tr.get(&self.node_key(path)).await?.is_some() {
            return Err(KvError::DirectoryExists(join(path)));
        }
        self.ensure_ancestors(tr, path).await?;
        let prefix = self.allocate(tr).await?;
        tr.set(&self.node_key(path), &prefix);
        Ok(Directory::new(path, prefix))
    }

    /// Open `path`, creating it (and missing ancestors) when absent.
    pub async fn create_or_open(
        &self,
        tr: &mut dyn Transaction,
        path: &[&str],
    ) -> KvResult<Directory> {
        if let Some(prefix) = tr.get(&self.node_key(path)).await? {
            return Ok(Directory::new(path, prefix));
        }
        self.ensure_ancestors(tr, path).await?;
        let prefix = self.allocate(tr).await?;
        tr.set(&self.node_key(path), &prefix);
        Ok(Directory::new(path, prefix))
    }

    async fn ensure_ancestors(&self, tr: &mut dyn Transaction, path: &[&str]) -> KvResult<()> {
        for depth in 1..path.len() {
            let ancestor = &path[..depth];
            if tr.get(&self.node_key(ancestor)).await?.is_none() {
                let prefix = self.allocate(tr).await?;
                tr.set(&self.node_key(ancestor), &prefix);
            }
        }
        Ok(())
    }

    /// Names of the immediate children of `path`, in lexicographic order.
    pub async fn list(&self, tr: &dyn ReadTransaction, path: &[&str]) -> KvResult<Vec<String>> {
        let node_key = self.node_key(path);
        let entries = tr.get_range(&subtree_range(&node_key), None).await?;

        let mut names: Vec<String> = Vec::new();
        for (key, _) in entries {
            let (element, _) = tuple::unpack_one(&key, node_key.len())?;
            if let Element::Str(name) = element {
                if names.last().map(String::as_str) != Some(name.as_str()) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Atomically rename `src` to `dst` by repointing the node entries.
    ///
    /// The data prefix is untouched: handles opened against `src` before the
    /// rename keep reading the same data. Fails when `src` is missing, `dst`
    /// exists, or `dst`'s parent does not exist.
    pub async fn move_to(
        &self,
        tr: &mut dyn Transaction,
        src: &[&str],
        dst: &[&str],
    ) -> KvResult<Directory> {
        let src_key = self.node_key(src);
        let Some(prefix) = tr.get(&src_key).await? else {
            return Err(KvError::DirectoryNotFound(join(src)));
        };
        let dst_key = self.node_key(dst);
        if tr.get(&dst_key).await?.is_some() {
            return Err(KvError::DirectoryExists(join(dst)));
        }
        if dst.len() > 1 {
            let parent = &dst[..dst.len() - 1];
            if tr.get(&self.node_key(parent)).await?.is_none() {
                return Err(KvError::DirectoryNotFound(join(parent)));
            }
        }

        tr.set(&dst_key, &prefix);
        tr.clear(&src_key);
        for (key, value) in tr.get_range(&subtree_range(&src_key), None).await? {
            let mut moved = dst_key.clone();
            moved.extend_from_slice(&key[src_key.len()..]);
            tr.set(&moved, &value);
            tr.clear(&key);
        }

        tracing::debug!(from = %join(src), to = %join(dst), "renamed directory");
        Ok(Directory::new(dst, prefix))
    }

    /// Delete `path`, its descendants, and all their data.
    ///
    /// Returns `false` when the path does not exist.
    pub async fn remove(&self, tr: &mut dyn Transaction, path: &[&str]) -> KvResult<bool> {
        let node_key = self.node_key(path);
        let Some(prefix) = tr.get(&node_key).await? else {
            return Ok(false);
        };

        tr.clear_range(&KeyRange::prefix(&prefix));
        for (key, value) in tr.get_range(&subtree_range(&node_key), None).await? {
            tr.clear_range(&KeyRange::prefix(&value));
            tr.clear(&key);
        }
        tr.clear(&node_key);
        Ok(true)
    }
}

// Every node entry strictly below `node_key`, excluding the node itself.
fn subtree_range(node_key: &[u8]) -> KeyRange {
    let mut begin = node_key.to_vec();
    begin.push(0x00);
    KeyRange::new(begin, strinc(node_key))
}

fn join(path: &[&str]) -> String {
    path.join("/")
}
