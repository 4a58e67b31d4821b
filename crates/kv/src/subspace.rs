//! Key subspaces: a raw prefix plus tuple-packed suffixes.

use crate::error::{KvError, KvResult};
use crate::traits::KeyRange;
use crate::tuple::{self, Element};

/// A reserved prefix of the keyspace.
///
/// All keys a subspace produces start with its prefix; [`range`](Subspace::range)
/// covers exactly those keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subspace {
    prefix: Vec<u8>,
}

impl Subspace {
    pub fn new(prefix: Vec<u8>) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Build the key for `elements` under this subspace.
    pub fn pack(&self, elements: &[Element]) -> Vec<u8> {
        let mut key = self.prefix.clone();
        tuple::pack_into(&mut key, elements);
        key
    }

    /// A nested subspace for `elements`.
    pub fn sub(&self, elements: &[Element]) -> Subspace {
        Subspace::new(self.pack(elements))
    }

    /// Decode the tuple suffix of a key belonging to this subspace.
    pub fn unpack(&self, key: &[u8]) -> KvResult<Vec<Element>> {
        let suffix = key.strip_prefix(self.prefix.as_slice()).ok_or_else(|| {
            KvError::MalformedKey("key does not belong to subspace".to_string())
        })?;
        tuple::unpack(suffix)
    }

    /// The range covering every key under this subspace.
    pub fn range(&self) -> KeyRange {
        KeyRange::prefix(&self.prefix)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key.starts_with(&self.prefix)
    }
}
