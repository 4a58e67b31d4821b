//! In-memory backend with optimistic transactions.
//!
//! Transactions buffer their writes in an overlay and validate at each read
//! and at commit that no other commit has landed since they began; a stale
//! transaction fails with a retryable conflict that the
//! [`update`](crate::update) helper absorbs. Validation is coarse (any
//! interleaved commit conflicts), which can only produce false positives, so
//! the observable behavior is strictly serializable.

use crate::error::{KvError, KvResult};
use crate::traits::{Database, KeyRange, KeyValue, ReadTransaction, Transaction};
use crate::{MAX_TRANSACTION_SIZE, MAX_VALUE_SIZE};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

/// An ordered in-memory store with strict-serializable transactions.
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    version: u64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Database for MemoryDatabase {
    fn begin(&self) -> Box<dyn Transaction> {
        let start_version = self.shared.state().version;
        Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            start_version,
            writes: BTreeMap::new(),
            cleared: Vec::new(),
        })
    }
}

struct MemoryTransaction {
    shared: Arc<Shared>,
    start_version: u64,
    /// Buffered point writes: `Some` for sets, `None` for single-key clears.
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    /// Ranges cleared before any later point write to a contained key.
    cleared: Vec<KeyRange>,
}

impl MemoryTransaction {
    fn conflict() -> KvError {
        KvError::Conflict("a concurrent commit invalidated the transaction".to_string())
    }

    fn is_cleared(&self, key: &[u8]) -> bool {
        self.cleared.iter().any(|range| range.contains(key))
    }
}

#[async_trait]
impl ReadTransaction for MemoryTransaction {
    async fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        if let Some(pending) = self.writes.get(key) {
            return Ok(pending.clone());
        }
        if self.is_cleared(key) {
            return Ok(None);
        }
        let state = self.shared.state();
        if state.version != self.start_version {
            return Err(Self::conflict());
        }
        Ok(state.data.get(key).cloned())
    }

    async fn get_range(&self, range: &KeyRange, limit: Option<usize>) -> KvResult<Vec<KeyValue>> {
        if range.begin >= range.end {
            return Ok(Vec::new());
        }
        let bounds = (
            Bound::Included(range.begin.as_slice()),
            Bound::Excluded(range.end.as_slice()),
        );

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        {
            let state = self.shared.state();
            if state.version != self.start_version {
                return Err(Self::conflict());
            }
            for (key, value) in state.data.range::<[u8], _>(bounds) {
                if self.is_cleared(key) || self.writes.contains_key(key) {
                    continue;
                }
                merged.insert(key.clone(), value.clone());
            }
        }
        for (key, pending) in self.writes.range::<[u8], _>(bounds) {
            if let Some(value) = pending {
                merged.insert(key.clone(), value.clone());
            }
        }

        let mut entries: Vec<KeyValue> = merged.into_iter().collect();
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.writes.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn clear(&mut self, key: &[u8]) {
        self.writes.insert(key.to_vec(), None);
    }

    fn clear_range(&mut self, range: &KeyRange) {
        if range.begin >= range.end {
            return;
        }
        let doomed: Vec<Vec<u8>> = self
            .writes
            .range::<[u8], _>((
                Bound::Included(range.begin.as_slice()),
                Bound::Excluded(range.end.as_slice()),
            ))
            .map(|(key, _)| key.clone())
            .collect();
        for key in doomed {
            self.writes.remove(&key);
        }
        self.cleared.push(range.clone());
    }

    async fn commit(self: Box<Self>) -> KvResult<()> {
        // Size limits mirror the FoundationDB-class store this backend
        // stands in for.
        let mut total = 0usize;
        for (key, pending) in &self.writes {
            total += key.len();
            if let Some(value) = pending {
                if value.len() > MAX_VALUE_SIZE {
                    return Err(KvError::ValueTooLarge {
                        size: value.len(),
                        max: MAX_VALUE_SIZE,
                    });
                }
                total += value.len();
            }
        }
        if total > MAX_TRANSACTION_SIZE {
            return Err(KvError::TransactionTooLarge {
                size: total,
                max: MAX_TRANSACTION_SIZE,
            });
        }

        let this = *self;
        let mut state = this.shared.state();
        if state.version != this.start_version {
            return Err(Self::conflict());
        }
        if this.writes.is_empty() && this.cleared.is_empty() {
            return Ok(());
        }

        for range in &this.cleared {
            let doomed: Vec<Vec<u8>> = state
                .data
                .range::<[u8], _>((
                    Bound::Included(range.begin.as_slice()),
                    Bound::Excluded(range.end.as_slice()),
                ))
                .map(|(key, _)| key.clone())
                .collect();
            for key in doomed {
                state.data.remove(&key);
            }
        }
        for (key, pending) in this.writes {
            match pending {
                Some(value) => state.data.insert(key, value),
                None => state.data.remove(&key),
            };
        }
        state.version += 1;
        Ok(())
    }
}
