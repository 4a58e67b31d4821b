//! Two-phase upload flow: staging, commit, and upload GC.

mod common;

use cask_blobs::{Error, Id, StoreOptions, UploadToken};
use cask_kv::{read, update, ReadTransaction, Transaction};
use common::{never_cancelled, random_bytes, test_store, test_store_with_db, MockClock, SequentialIdGenerator};
use futures::FutureExt;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn uploads_are_invisible_before_commit() {
    let store = test_store(StoreOptions::default()).await;
    let cancel = never_cancelled();

    let token = store.upload(&mut &b"Hello"[..], &cancel).await.unwrap();
    let id = token.id().unwrap();

    let err = store.blob(&id).await.unwrap_err();
    assert!(matches!(err, Error::BlobNotFound(_)));
    assert_eq!(err.to_string(), format!("blob not found: \"{id}\""));
}

#[tokio::test]
async fn committed_upload_becomes_readable() {
    let (db, store) = test_store_with_db(StoreOptions::default()).await;
    let cancel = never_cancelled();

    let token = store.upload(&mut &b"Hello"[..], &cancel).await.unwrap();

    let committer = store.clone();
    let id = update(db.as_ref(), move |tr: &mut dyn Transaction| {
        let store = committer.clone();
        let token = token.clone();
        async move { store.commit_upload(tr, token).await }.boxed()
    })
    .await
    .unwrap();

    let blob = store.blob(&id).await.unwrap();
    assert_eq!(blob.content(&cancel).await.unwrap(), b"Hello");
}

#[tokio::test]
async fn commit_composes_with_the_callers_own_writes() {
    let (db, store) = test_store_with_db(StoreOptions::default()).await;
    let cancel = never_cancelled();

    let token = store.upload(&mut &b"payload"[..], &cancel).await.unwrap();

    let committer = store.clone();
    let id = update(db.as_ref(), move |tr: &mut dyn Transaction| {
        let store = committer.clone();
        let token = token.clone();
        async move {
            let id = store.commit_upload(tr, token).await?;
            tr.set(b"app/last-committed", id.as_str().as_bytes());
            Ok::<_, Error>(id)
        }
        .boxed()
    })
    .await
    .unwrap();

    // Both the promotion and the caller's write landed atomically.
    assert!(store.blob(&id).await.is_ok());
    let recorded = read(db.as_ref(), |tr: &dyn ReadTransaction| {
        async move { tr.get(b"app/last-committed").await }.boxed()
    })
    .await
    .unwrap();
    assert_eq!(recorded, Some(id.as_str().as_bytes().to_vec()));
}

#[tokio::test]
async fn default_tokens_are_rejected() {
    let (db, store) = test_store_with_db(StoreOptions::default()).await;

    let err = update(db.as_ref(), move |tr: &mut dyn Transaction| {
        let store = store.clone();
        async move { store.commit_upload(tr, UploadToken::default()).await }.boxed()
    })
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidUploadToken));
    assert_eq!(
        err.to_string(),
        "invalid upload token: tokens must be produced by the upload method"
    );
}

#[tokio::test]
async fn old_uploads_are_swept_and_newer_ones_survive() {
    let date = datetime!(2023-01-01 00:00:00 UTC);
    let clock = MockClock::new(date - Duration::days(60));
    let store = test_store(
        StoreOptions::default()
            .with_chunk_size(100)
            .with_clock(clock.clone())
            .with_id_generator(SequentialIdGenerator::new("upload")),
    )
    .await;
    let cancel = never_cancelled();

    for _ in 0..5 {
        store.upload(&mut &b"upload"[..], &cancel).await.unwrap();
    }
    clock.set(date);
    for _ in 0..5 {
        store.upload(&mut &b"upload"[..], &cancel).await.unwrap();
    }

    let deleted = store
        .delete_uploads_started_before(date - Duration::days(30))
        .await
        .unwrap();
    let expected: Vec<Id> = (0..5).map(|n| Id::from(format!("upload:{n}"))).collect();
    assert_eq!(deleted, expected);

    // The newer five are still there for a later sweep.
    let rest = store
        .delete_uploads_started_before(date + Duration::days(1))
        .await
        .unwrap();
    let expected: Vec<Id> = (5..10).map(|n| Id::from(format!("upload:{n}"))).collect();
    assert_eq!(rest, expected);
}

#[tokio::test]
async fn cancelled_upload_leaves_a_staging_area_for_the_sweep() {
    let store = test_store(StoreOptions::default().with_chunk_size(100)).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let input = random_bytes(200);
    let err = store
        .create(&mut input.as_slice(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let deleted = store
        .delete_uploads_started_before(OffsetDateTime::now_utc() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
}
