#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p certstore-storage --features failpoints --test failpoint_tests
//! ```

use certstore_storage::{
    CancellationToken, CertificateStorage, StorageError,
    testutil::{TEST_ENCRYPTION_KEY, memory_storage},
};

#[tokio::test]
async fn lease_write_failpoint_times_out_lock() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("lock-before-write-lease", "return").expect("failed to configure fail point");

    let (store, storage) = memory_storage(None);
    let result = storage.lock("renew", &CancellationToken::new()).await;

    match result {
        Err(StorageError::LockAcquisition { last_error: Some(last), .. }) => {
            assert!(last.contains("injected lease write failure"), "unexpected last error: {last}");
        },
        other => panic!("expected LockAcquisition, got {other:?}"),
    }
    assert!(store.is_empty(), "no lease should have been written");

    scenario.teardown();
}

#[tokio::test]
async fn lease_write_failpoint_once_is_retried() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("lock-before-write-lease", "1*return").expect("failed to configure fail point");

    let (store, storage) = memory_storage(None);
    storage.lock("renew", &CancellationToken::new()).await.expect("second attempt should succeed");
    assert_eq!(store.names(), vec!["acme/renew.lock"]);

    scenario.teardown();
}

#[tokio::test]
async fn put_failpoint_fails_store_without_writing() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("memory-put-object", "return").expect("failed to configure fail point");

    let (store, storage) = memory_storage(Some(TEST_ENCRYPTION_KEY));
    let err = storage.store("certs/a.crt", b"pem").await.expect_err("put is failing");
    assert!(err.is_transient(), "got {err:?}");
    assert!(store.is_empty());

    scenario.teardown();
}

#[tokio::test]
async fn get_failpoint_is_not_mistaken_for_absence() {
    let scenario = fail::FailScenario::setup();

    let (_store, storage) = memory_storage(None);
    storage.store("certs/a.crt", b"pem").await.expect("store");

    fail::cfg("memory-get-object", "return").expect("failed to configure fail point");
    let err = storage.load("certs/a.crt").await.expect_err("get is failing");
    assert!(!err.is_not_found());
    fail::remove("memory-get-object");

    assert_eq!(&storage.load("certs/a.crt").await.expect("load")[..], b"pem");

    scenario.teardown();
}
