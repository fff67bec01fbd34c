//! Object-store trait definition.
//!
//! This module defines the [`ObjectStore`] trait, the boundary between the
//! certificate storage facade and whatever holds the bytes. Implementations
//! exist for S3-compatible services (`certstore-storage-s3`) and for memory
//! ([`MemoryObjectStore`](crate::MemoryObjectStore)).
//!
//! # Design Philosophy
//!
//! The trait is deliberately narrow:
//! - **Flat namespace**: Object names are opaque strings; `/` only matters to
//!   non-recursive listing
//! - **Whole-object I/O**: Values are read and written in one call as [`Bytes`]
//! - **No locking primitive**: Mutual exclusion is layered on top by the
//!   [`LockCoordinator`](crate::LockCoordinator)
//! - **Distinguishable absence**: A missing object is always
//!   [`StorageError::NotFound`](crate::StorageError::NotFound), never a
//!   generic error
//!
//! # Implementing a Store
//!
//! 1. Implement the [`ObjectStore`] trait
//! 2. Map service-specific errors to [`StorageError`](crate::StorageError)
//! 3. Run the [`conformance`](crate::conformance) suite against it
//!
//! See [`MemoryObjectStore`](crate::MemoryObjectStore) for a reference implementation.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::StorageResult, types::ObjectInfo};

/// Abstract object store holding one bucket.
///
/// Stores are expected to be thread-safe (`Send + Sync`) and are usually
/// shared behind an [`Arc`](std::sync::Arc).
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`bucket_exists`](ObjectStore::bucket_exists) | Check that the configured bucket is reachable |
/// | [`get_object`](ObjectStore::get_object) | Read a whole object |
/// | [`put_object`](ObjectStore::put_object) | Create or replace an object |
/// | [`delete_object`](ObjectStore::delete_object) | Remove an object |
/// | [`stat_object`](ObjectStore::stat_object) | Read object metadata |
/// | [`list_objects`](ObjectStore::list_objects) | Enumerate object names under a prefix |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use certstore_storage::{MemoryObjectStore, ObjectStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryObjectStore::new();
///
/// store.put_object("acme/certs/a.crt", Bytes::from("pem")).await.unwrap();
/// let value = store.get_object("acme/certs/a.crt").await.unwrap();
/// assert_eq!(value, Bytes::from("pem"));
/// # });
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns whether the configured bucket exists.
    ///
    /// # Errors
    ///
    /// Returns an error only when the answer could not be determined
    /// (connection failure, timeout, permission problems).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn bucket_exists(&self) -> StorageResult<bool>;

    /// Reads the object stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if no
    /// such object exists, or another variant for transport failures.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_object(&self, name: &str) -> StorageResult<Bytes>;

    /// Writes `value` under `name`, replacing any existing object.
    ///
    /// Writes are last-writer-wins; stores offer no conditional put.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn put_object(&self, name: &str, value: Bytes) -> StorageResult<()>;

    /// Deletes the object under `name`.
    ///
    /// Deleting a missing object is not guaranteed to fail; some services
    /// report success, others report not-found.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete_object(&self, name: &str) -> StorageResult<()>;

    /// Reads metadata for the object under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`](crate::StorageError::NotFound) if no
    /// such object exists.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn stat_object(&self, name: &str) -> StorageResult<ObjectInfo>;

    /// Lists object names beginning with `prefix`.
    ///
    /// With `recursive = true` every object name under the prefix is
    /// returned. With `recursive = false` names are grouped at the first `/`
    /// after the prefix: objects directly below appear by name, deeper ones
    /// appear once as a common prefix ending in `/`.
    ///
    /// Ordering is unspecified.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn list_objects(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>>;
}
