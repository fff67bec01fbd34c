//! Shared test utilities for certificate storage testing.
//!
//! This module provides helpers for building test facades, generating test
//! data, injecting object-store faults, and asserting on [`StorageResult`]
//! values. It is feature-gated behind `testutil` to keep it out of
//! production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! certstore-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use certstore_storage::testutil::{make_key, make_value, memory_storage};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    backend::ObjectStore,
    config::{LockConfig, StorageConfig},
    error::{StorageError, StorageResult},
    memory::MemoryObjectStore,
    storage::ObjectStorage,
    types::ObjectInfo,
};

/// A valid 32-byte encryption key for tests.
pub const TEST_ENCRYPTION_KEY: &str = "0123456789abcdef0123456789abcdef";

/// Create a deterministic logical key from a directory and index.
///
/// Produces keys like `"certs/000042"`. The zero-padding keeps
/// lexicographic ordering equal to numeric ordering.
#[must_use]
pub fn make_key(dir: &str, idx: usize) -> String {
    format!("{dir}/{idx:06}")
}

/// Create a test value of the given size filled with `0xAB` bytes.
#[must_use]
pub fn make_value(size: usize) -> Vec<u8> {
    vec![0xAB; size]
}

/// Create a test value tagged with a task ID and sequence number.
///
/// Produces values like `"task3-val42"`, so concurrent tests can tell
/// which task wrote which value.
#[must_use]
pub fn make_tagged_value(task: usize, seq: usize) -> Vec<u8> {
    format!("task{task}-val{seq}").into_bytes()
}

/// Lock timing suitable for tests: 200ms budget, 10ms polls.
///
/// # Panics
///
/// Never; the durations are positive.
#[must_use]
#[allow(clippy::expect_used)]
pub fn fast_lock_config() -> LockConfig {
    LockConfig::builder()
        .lock_timeout(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(10))
        .build()
        .expect("positive durations")
}

/// Create a facade over a fresh [`MemoryObjectStore`] with default prefix,
/// [`fast_lock_config`], and optional encryption.
///
/// Returns the store too, so tests can inspect raw objects.
///
/// # Panics
///
/// Panics if `encryption_key` is not a valid key.
#[allow(clippy::expect_used)]
pub fn memory_storage(
    encryption_key: Option<&str>,
) -> (MemoryObjectStore, ObjectStorage<MemoryObjectStore>) {
    let store = MemoryObjectStore::new();
    let config = StorageConfig::builder()
        .maybe_encryption_key(encryption_key)
        .lock(fast_lock_config())
        .build()
        .expect("valid test config");
    let storage = ObjectStorage::new(Arc::new(store.clone()), config).expect("valid test config");
    (store, storage)
}

/// An [`ObjectStore`] wrapper that injects failures and latency.
///
/// Failures are counted down: `fail_next_gets(2)` makes the next two
/// `get_object` calls fail with a transient [`StorageError::Connection`] and
/// lets later ones through.
pub struct FlakyObjectStore<S> {
    inner: S,
    get_failures: AtomicU32,
    put_failures: AtomicU32,
    read_delay: Mutex<Option<Duration>>,
    get_calls: AtomicU64,
    put_calls: AtomicU64,
}

impl<S: ObjectStore> FlakyObjectStore<S> {
    /// Wraps `inner` with no faults configured.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            get_failures: AtomicU32::new(0),
            put_failures: AtomicU32::new(0),
            read_delay: Mutex::new(None),
            get_calls: AtomicU64::new(0),
            put_calls: AtomicU64::new(0),
        }
    }

    /// Fails the next `n` `get_object` calls.
    pub fn fail_next_gets(&self, n: u32) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    /// Fails the next `n` `put_object` calls.
    pub fn fail_next_puts(&self, n: u32) {
        self.put_failures.store(n, Ordering::SeqCst);
    }

    /// Delays every `get_object` and `stat_object` call by `delay`.
    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock() = Some(delay);
    }

    /// Number of `get_object` calls seen, including failed ones.
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `put_object` calls seen, including failed ones.
    pub fn put_calls(&self) -> u64 {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }

    async fn read_latency(&self) {
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for FlakyObjectStore<S> {
    async fn bucket_exists(&self) -> StorageResult<bool> {
        self.inner.bucket_exists().await
    }

    async fn get_object(&self, name: &str) -> StorageResult<Bytes> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.read_latency().await;
        if Self::take_failure(&self.get_failures) {
            return Err(StorageError::connection(format!("injected get_object failure for {name}")));
        }
        self.inner.get_object(name).await
    }

    async fn put_object(&self, name: &str, value: Bytes) -> StorageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.put_failures) {
            return Err(StorageError::connection(format!("injected put_object failure for {name}")));
        }
        self.inner.put_object(name, value).await
    }

    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        self.inner.delete_object(name).await
    }

    async fn stat_object(&self, name: &str) -> StorageResult<ObjectInfo> {
        self.read_latency().await;
        self.inner.stat_object(name).await
    }

    async fn list_objects(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        self.inner.list_objects(prefix, recursive).await
    }
}

/// Assert that a [`StorageResult`] is a [`StorageError::NotFound`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use certstore_storage::assert_not_found;
/// use certstore_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::NotFound { key: "missing".into() });
/// assert_not_found!(result);
/// ```
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "expected StorageError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "{}: expected StorageError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok`, returning the inner value.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use certstore_storage::assert_storage_ok;
/// use certstore_storage::error::StorageResult;
///
/// let result: StorageResult<i32> = Ok(42);
/// let value = assert_storage_ok!(result);
/// assert_eq!(value, 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Assert that a [`StorageResult`] contains a [`StorageError::Timeout`].
#[macro_export]
macro_rules! assert_timeout {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Timeout { .. })),
            "expected StorageError::Timeout, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is a [`StorageError::LockAcquisition`].
#[macro_export]
macro_rules! assert_lock_failed {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::LockAcquisition { .. })),
            "expected StorageError::LockAcquisition, got: {:?}",
            $result,
        );
    };
}

/// Helper to verify that a result is a `NotFound` error.
pub fn is_not_found<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(StorageError::NotFound { .. }))
}

/// Helper to verify that a result is a `Timeout` error.
pub fn is_timeout<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(StorageError::Timeout { .. }))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::CertificateStorage;

    #[test]
    fn test_make_key_format() {
        assert_eq!(make_key("certs", 42), "certs/000042");
        assert!(make_key("k", 1) < make_key("k", 10));
    }

    #[test]
    fn test_make_value_size() {
        assert!(make_value(0).is_empty());
        assert!(make_value(1024).iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_make_tagged_value() {
        assert_eq!(make_tagged_value(3, 42), b"task3-val42");
    }

    #[tokio::test]
    async fn test_memory_storage_encrypts_when_keyed() {
        let (store, storage) = memory_storage(Some(TEST_ENCRYPTION_KEY));
        storage.store("k", b"v").await.unwrap();
        assert_eq!(store.get_object("acme/k").await.unwrap().len(), 41);
    }

    #[tokio::test]
    async fn test_flaky_store_counts_down_failures() {
        let flaky = FlakyObjectStore::new(MemoryObjectStore::new());
        flaky.put_object("a", Bytes::from("x")).await.unwrap();
        flaky.fail_next_gets(2);

        assert!(flaky.get_object("a").await.unwrap_err().is_transient());
        assert!(flaky.get_object("a").await.unwrap_err().is_transient());
        assert_eq!(flaky.get_object("a").await.unwrap(), Bytes::from("x"));
        assert_eq!(flaky.get_calls(), 3);
    }

    #[test]
    fn test_assert_not_found_macro() {
        let result: StorageResult<()> = Err(StorageError::not_found("missing"));
        assert_not_found!(result);
    }

    #[test]
    fn test_assert_storage_ok_macro() {
        let result: StorageResult<i32> = Ok(42);
        assert_eq!(assert_storage_ok!(result), 42);
    }

    #[test]
    fn test_assert_timeout_macro() {
        let result: StorageResult<()> = Err(StorageError::timeout("get_object"));
        assert_timeout!(result);
        assert!(is_timeout(&result));
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found::<()>(&Err(StorageError::not_found("x"))));
        assert!(!is_not_found::<()>(&Ok(())));
    }
}
