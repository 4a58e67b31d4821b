//! Shared helpers for the integration tests.
#![allow(dead_code)]

use cask_blobs::{Id, IdGenerator, Store, StoreOptions, SystemClock};
use cask_kv::MemoryDatabase;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// A clock pinned to a settable instant.
pub struct MockClock {
    now: Mutex<OffsetDateTime>,
}

impl MockClock {
    pub fn new(now: OffsetDateTime) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap() = now;
    }
}

impl SystemClock for MockClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap()
    }
}

/// Mints `<prefix>:0`, `<prefix>:1`, ...
pub struct SequentialIdGenerator {
    prefix: &'static str,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            prefix,
            next: AtomicU64::new(0),
        })
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> Id {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        Id::from(format!("{}:{}", self.prefix, n))
    }
}

pub async fn test_store(options: StoreOptions) -> Store {
    let (_, store) = test_store_with_db(options).await;
    store
}

pub async fn test_store_with_db(options: StoreOptions) -> (Arc<MemoryDatabase>, Store) {
    let db = Arc::new(MemoryDatabase::new());
    let store = Store::new(db.clone(), "test", options)
        .await
        .expect("store setup");
    (db, store)
}

/// A token that never fires, for calls where cancellation is not the point.
pub fn never_cancelled() -> CancellationToken {
    CancellationToken::new()
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}
