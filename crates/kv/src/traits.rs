//! Transactional KV trait definitions.

use crate::error::KvResult;
use async_trait::async_trait;

/// A key paired with its value.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// A half-open key interval `[begin, end)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRange {
    pub begin: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(begin: Vec<u8>, end: Vec<u8>) -> Self {
        Self { begin, end }
    }

    /// The range covering every key that starts with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            begin: prefix.to_vec(),
            end: strinc(prefix),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.begin.as_slice() <= key && key < self.end.as_slice()
    }
}

/// The first key ordered after every key starting with `prefix`.
///
/// Keys consisting solely of `0xFF` bytes live in the reserved system space
/// and are not representable here.
pub fn strinc(prefix: &[u8]) -> Vec<u8> {
    let mut out = prefix.to_vec();
    loop {
        match out.last().copied() {
            None => break,
            Some(0xFF) => {
                out.pop();
            }
            Some(last) => {
                let end = out.len() - 1;
                out[end] = last + 1;
                return out;
            }
        }
    }
    debug_assert!(false, "strinc of a key in the reserved 0xFF space");
    vec![0xFF]
}

/// Read operations available inside a transaction.
///
/// Implementations guarantee a strictly serializable view: reads observe a
/// single consistent version of the store or fail with a retryable conflict.
#[async_trait]
pub trait ReadTransaction: Send + Sync {
    /// Look up a single key.
    async fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Fetch entries in `range`, in ascending key order, up to `limit`.
    async fn get_range(&self, range: &KeyRange, limit: Option<usize>) -> KvResult<Vec<KeyValue>>;
}

/// A read-write transaction.
///
/// Mutations are buffered locally and become visible to other transactions
/// only once [`commit`](Transaction::commit) succeeds; reads within the
/// transaction observe its own writes.
#[async_trait]
pub trait Transaction: ReadTransaction {
    fn set(&mut self, key: &[u8], value: &[u8]);

    fn clear(&mut self, key: &[u8]);

    fn clear_range(&mut self, range: &KeyRange);

    /// Atomically apply the buffered mutations.
    ///
    /// Fails with a retryable [`KvError::Conflict`] when a concurrent commit
    /// invalidated this transaction's reads.
    async fn commit(self: Box<Self>) -> KvResult<()>;
}

/// Handle to an ordered transactional store.
pub trait Database: Send + Sync + 'static {
    /// Start a new transaction against the current committed version.
    fn begin(&self) -> Box<dyn Transaction>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strinc_increments_last_byte() {
        assert_eq!(strinc(b"ab"), b"ac".to_vec());
        assert_eq!(strinc(&[0x15, 0x01]), vec![0x15, 0x02]);
    }

    #[test]
    fn strinc_carries_past_trailing_ff() {
        assert_eq!(strinc(&[0x15, 0xFF]), vec![0x16]);
        assert_eq!(strinc(&[0x01, 0xFF, 0xFF]), vec![0x02]);
    }

    #[test]
    fn prefix_range_covers_exactly_the_prefix() {
        let range = KeyRange::prefix(b"ab");
        assert!(range.contains(b"ab"));
        assert!(range.contains(b"ab\x00"));
        assert!(range.contains(b"ab\xff\xff"));
        assert!(!range.contains(b"aa\xff"));
        assert!(!range.contains(b"ac"));
    }
}
