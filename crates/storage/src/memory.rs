//! In-memory object store implementation.
//!
//! This module provides [`MemoryObjectStore`], an in-memory implementation of
//! [`ObjectStore`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Names are stored in a [`BTreeMap`] so prefix
//!   listing is a range scan
//! - **Store semantics**: Last-writer-wins puts, `NotFound` on missing
//!   objects, `/`-delimited non-recursive listing
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use certstore_storage::{MemoryObjectStore, ObjectStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryObjectStore::new();
//!
//!     store.put_object("acme/greeting", Bytes::from("hello")).await.unwrap();
//!     let value = store.get_object("acme/greeting").await.unwrap();
//!
//!     assert_eq!(value.as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Only one bucket, which exists unless built with
//!   [`without_bucket`](MemoryObjectStore::without_bucket)

use std::{
    collections::{BTreeMap, BTreeSet},
    ops::Bound,
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::ObjectStore,
    error::{StorageError, StorageResult},
    types::ObjectInfo,
};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    modified: DateTime<Utc>,
}

/// In-memory object store using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryObjectStore` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying objects, which lets tests model several processes
/// sharing one bucket.
#[derive(Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    bucket_exists: bool,
}

impl MemoryObjectStore {
    /// Creates a new, empty in-memory store whose bucket exists.
    pub fn new() -> Self {
        Self { objects: Arc::new(RwLock::new(BTreeMap::new())), bucket_exists: true }
    }

    /// Creates a store that reports its bucket as missing.
    ///
    /// Object operations still work; only
    /// [`bucket_exists`](ObjectStore::bucket_exists) is affected.
    pub fn without_bucket() -> Self {
        Self { bucket_exists: false, ..Self::new() }
    }

    /// Writes an object with an explicit modification time.
    ///
    /// Tests use this to plant objects (for example stale leases) without
    /// going through the facade.
    pub fn insert_with_modified(&self, name: impl Into<String>, data: Bytes, modified: DateTime<Utc>) {
        self.objects.write().insert(name.into(), StoredObject { data, modified });
    }

    /// Returns the number of stored objects, including lease objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Returns every stored object name in order.
    pub fn names(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryObjectStore")
            .field("objects", &self.len())
            .field("bucket_exists", &self.bucket_exists)
            .finish()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn bucket_exists(&self) -> StorageResult<bool> {
        Ok(self.bucket_exists)
    }

    async fn get_object(&self, name: &str) -> StorageResult<Bytes> {
        fail_point!("memory-get-object", |_| {
            Err(StorageError::connection("injected get_object failure"))
        });

        let objects = self.objects.read();
        objects.get(name).map(|obj| obj.data.clone()).ok_or_else(|| StorageError::not_found(name))
    }

    async fn put_object(&self, name: &str, value: Bytes) -> StorageResult<()> {
        fail_point!("memory-put-object", |_| {
            Err(StorageError::connection("injected put_object failure"))
        });

        let mut objects = self.objects.write();
        objects.insert(name.to_owned(), StoredObject { data: value, modified: Utc::now() });
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        let mut objects = self.objects.write();
        objects.remove(name);
        Ok(())
    }

    async fn stat_object(&self, name: &str) -> StorageResult<ObjectInfo> {
        let objects = self.objects.read();
        let obj = objects.get(name).ok_or_else(|| StorageError::not_found(name))?;
        Ok(ObjectInfo::new(name, obj.data.len() as u64, obj.modified))
    }

    async fn list_objects(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let objects = self.objects.read();
        let under_prefix = objects
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(prefix));

        if recursive {
            return Ok(under_prefix.cloned().collect());
        }

        // Group at the first '/' past the prefix, like an S3 delimiter listing.
        let grouped: BTreeSet<String> = under_prefix
            .map(|name| match name[prefix.len()..].find('/') {
                Some(idx) => name[..prefix.len() + idx + 1].to_owned(),
                None => name.clone(),
            })
            .collect();
        Ok(grouped.into_iter().collect())
    }
}
