//! Blob removal and the removed-blob sweep.

mod common;

use cask_blobs::{Error, Id, StoreOptions};
use common::{never_cancelled, test_store, MockClock, SequentialIdGenerator};
use time::macros::datetime;
use time::Duration;

#[tokio::test]
async fn removed_blob_cannot_be_retrieved() {
    let store = test_store(StoreOptions::default().with_chunk_size(100)).await;
    let cancel = never_cancelled();

    let blob = store.create(&mut &b"blob"[..], &cancel).await.unwrap();
    store.remove_blob(&blob.id()).await.unwrap();

    let err = store.blob(&blob.id()).await.unwrap_err();
    assert!(matches!(err, Error::BlobNotFound(_)));
    assert_eq!(err.to_string(), format!("blob not found: \"{}\"", blob.id()));
}

#[tokio::test]
async fn removing_a_missing_blob_fails_with_blob_not_found() {
    let store = test_store(StoreOptions::default()).await;

    let err = store.remove_blob(&Id::from("missing")).await.unwrap_err();
    assert!(matches!(err, Error::BlobNotFound(_)));
}

#[tokio::test]
async fn already_opened_handles_survive_removal() {
    let store = test_store(StoreOptions::default().with_chunk_size(100)).await;
    let cancel = never_cancelled();

    let blob = store.create(&mut &b"blob"[..], &cancel).await.unwrap();
    store.remove_blob(&blob.id()).await.unwrap();

    // The handle still points at the blob's subspace; removal only renamed
    // it out of the visible namespace.
    assert_eq!(blob.content(&cancel).await.unwrap(), b"blob");
}

#[tokio::test]
async fn sweep_deletes_only_blobs_removed_before_the_cutoff() {
    let date = datetime!(2023-01-01 00:00:00 UTC);
    let clock = MockClock::new(date - Duration::days(60));
    let store = test_store(
        StoreOptions::default()
            .with_chunk_size(100)
            .with_clock(clock.clone())
            .with_id_generator(SequentialIdGenerator::new("blob")),
    )
    .await;
    let cancel = never_cancelled();

    for _ in 0..5 {
        let blob = store.create(&mut &b"content"[..], &cancel).await.unwrap();
        store.remove_blob(&blob.id()).await.unwrap();
    }
    clock.set(date);
    for _ in 0..5 {
        let blob = store.create(&mut &b"content"[..], &cancel).await.unwrap();
        store.remove_blob(&blob.id()).await.unwrap();
    }

    let deleted = store
        .delete_removed_blobs_before(date - Duration::days(30))
        .await
        .unwrap();
    let expected: Vec<Id> = (0..5).map(|n| Id::from(format!("blob:{n}"))).collect();
    assert_eq!(deleted, expected);

    let rest = store
        .delete_removed_blobs_before(date + Duration::days(1))
        .await
        .unwrap();
    let expected: Vec<Id> = (5..10).map(|n| Id::from(format!("blob:{n}"))).collect();
    assert_eq!(rest, expected);
}

#[tokio::test]
async fn sweep_returns_empty_when_nothing_matches() {
    let date = datetime!(2023-01-01 00:00:00 UTC);
    let clock = MockClock::new(date);
    let store = test_store(
        StoreOptions::default()
            .with_chunk_size(100)
            .with_clock(clock.clone()),
    )
    .await;
    let cancel = never_cancelled();

    let blob = store.create(&mut &b"content"[..], &cancel).await.unwrap();
    store.remove_blob(&blob.id()).await.unwrap();

    let deleted = store
        .delete_removed_blobs_before(date - Duration::days(1))
        .await
        .unwrap();
    assert_eq!(deleted, Vec::<Id>::new());
}

#[tokio::test]
async fn handles_fail_once_the_removed_blob_is_physically_swept() {
    let date = datetime!(2023-01-01 00:00:00 UTC);
    let clock = MockClock::new(date);
    let store = test_store(
        StoreOptions::default()
            .with_chunk_size(100)
            .with_clock(clock.clone()),
    )
    .await;
    let cancel = never_cancelled();

    let blob = store.create(&mut &b"content"[..], &cancel).await.unwrap();
    store.remove_blob(&blob.id()).await.unwrap();

    let deleted = store
        .delete_removed_blobs_before(date + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(deleted, vec![blob.id()]);

    let err = blob.content(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::BlobNotFound(_)));
}
