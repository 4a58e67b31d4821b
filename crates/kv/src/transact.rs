//! Typed transactional closure helpers with conflict retry.
//!
//! Closures may run more than once: they are re-invoked from scratch against
//! a fresh transaction whenever the previous attempt hit a retryable
//! conflict, so they must not have side effects outside the transaction.

use crate::error::TransactError;
use crate::traits::{Database, ReadTransaction, Transaction};
use futures::future::BoxFuture;

const MAX_ATTEMPTS: u32 = 10;

/// Run `body` against a read snapshot, retrying on conflict.
pub async fn read<T, E, F>(db: &dyn Database, mut body: F) -> Result<T, E>
where
    E: TransactError,
    F: for<'a> FnMut(&'a dyn ReadTransaction) -> BoxFuture<'a, Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let tr = db.begin();
        let snapshot: &dyn ReadTransaction = tr.as_ref();
        match body(snapshot).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::debug!(attempt, "read transaction conflicted, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

/// Run `body` against a read-write transaction and commit it, retrying on
/// conflict. All writes in one invocation become visible together or not at
/// all.
pub async fn update<T, E, F>(db: &dyn Database, mut body: F) -> Result<T, E>
where
    E: TransactError,
    F: for<'a> FnMut(&'a mut dyn Transaction) -> BoxFuture<'a, Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut tr = db.begin();
        match body(tr.as_mut()).await {
            Ok(value) => match tr.commit().await {
                Ok(()) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::debug!(attempt, "commit conflicted, retrying transaction");
                }
                Err(err) => return Err(E::from(err)),
            },
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                tracing::debug!(attempt, "transaction body conflicted, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}
