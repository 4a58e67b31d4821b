//! Ordered transactional key-value abstraction for the cask blob store.
//!
//! This crate defines the storage contract the blob store runs on:
//! - Object-safe [`Database`] / [`Transaction`] traits over an ordered
//!   keyspace with strictly serializable transactions
//! - Order-preserving tuple packing and [`Subspace`] prefixes
//! - A [`DirectoryLayer`] mapping logical paths to physical prefixes, with
//!   atomic rename
//! - [`read`] / [`update`] closure helpers with conflict retry
//! - [`MemoryDatabase`], an in-memory backend for tests and embedding

pub mod directory;
pub mod error;
pub mod memory;
pub mod subspace;
pub mod traits;
pub mod transact;
pub mod tuple;

pub use directory::{Directory, DirectoryLayer};
pub use error::{KvError, KvResult, TransactError};
pub use memory::MemoryDatabase;
pub use subspace::Subspace;
pub use traits::{strinc, Database, KeyRange, KeyValue, ReadTransaction, Transaction};
pub use transact::{read, update};
pub use tuple::Element;

/// Largest value a single key may hold (100 KB).
pub const MAX_VALUE_SIZE: usize = 100_000;

/// Largest total mutation footprint of one transaction (10 MB).
pub const MAX_TRANSACTION_SIZE: usize = 10_000_000;
