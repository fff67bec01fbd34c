//! Certificate storage facade.
//!
//! [`CertificateStorage`] is the contract a certificate manager programs
//! against: whole-value store/load by logical key, listing, metadata and
//! advisory locks. [`ObjectStorage`] implements it over any [`ObjectStore`]
//! by mapping keys to object names, running values through the configured
//! [`Codec`], and delegating locks to a [`LockCoordinator`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use certstore_storage::{CertificateStorage, MemoryObjectStore, ObjectStorage, StorageConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let storage = ObjectStorage::new(Arc::new(MemoryObjectStore::new()), StorageConfig::default())?;
//!
//! let cancel = CancellationToken::new();
//! storage.lock("issue_cert_example.com", &cancel).await?;
//! storage.store("certificates/example.com.crt", b"-----BEGIN CERTIFICATE-----").await?;
//! storage.unlock("issue_cert_example.com").await?;
//!
//! assert!(storage.exists("certificates/example.com.crt").await?);
//! # Ok::<(), certstore_storage::StorageError>(())
//! # }).unwrap();
//! ```

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::ObjectStore,
    codec::Codec,
    config::{StorageConfig, TimeoutConfig},
    error::{ConfigError, StorageError, StorageResult},
    keys,
    lock::LockCoordinator,
    metrics::{Metrics, MetricsCollector},
    timeout::with_timeout,
    types::KeyInfo,
};

/// Pluggable storage for certificates, keys and account metadata.
///
/// Keys are slash-separated logical paths. Values are opaque bytes.
#[async_trait]
pub trait CertificateStorage: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidValue`] for an empty value; nothing is
    /// written in that case.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Loads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if `key` has no value.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn load(&self, key: &str) -> StorageResult<Bytes>;

    /// Deletes the value under `key`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Returns whether `key` has a value. Only absence yields `Ok(false)`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Lists keys below `prefix`, sorted.
    ///
    /// With `recursive = false`, only immediate children are returned and
    /// deeper paths collapse to their first segment.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>>;

    /// Returns metadata for `key`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn stat(&self, key: &str) -> StorageResult<KeyInfo>;

    /// Acquires the advisory lock named `key`, waiting if another process
    /// holds it.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn lock(&self, key: &str, cancel: &CancellationToken) -> StorageResult<()>;

    /// Releases the advisory lock named `key`.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn unlock(&self, key: &str) -> StorageResult<()>;
}

/// [`CertificateStorage`] over an [`ObjectStore`].
///
/// # Cloning
///
/// Cheap; clones share the store, codec key and metrics.
pub struct ObjectStorage<S: ?Sized> {
    store: Arc<S>,
    prefix: String,
    codec: Codec,
    locks: LockCoordinator<S>,
    timeouts: TimeoutConfig,
    metrics: Metrics,
}

impl<S: ?Sized> Clone for ObjectStorage<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix.clone(),
            codec: self.codec.clone(),
            locks: self.locks.clone(),
            timeouts: self.timeouts,
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for ObjectStorage<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("prefix", &self.prefix)
            .field("codec", &self.codec)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore + ?Sized> ObjectStorage<S> {
    /// Creates a facade over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation (bad key length,
    /// zero durations).
    pub fn new(store: Arc<S>, config: StorageConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let codec = config.codec()?;
        let metrics = Metrics::new();
        let locks = LockCoordinator::new(Arc::clone(&store), config.prefix(), config.lock(), config.timeouts())
            .with_metrics(metrics.clone());

        Ok(Self {
            store,
            prefix: config.prefix().to_owned(),
            codec,
            locks,
            timeouts: config.timeouts(),
            metrics,
        })
    }

    /// Fails unless the store's bucket exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BucketNotFound`] (wrapped in
    /// [`StorageError::Config`]) if the bucket is missing, or the store's
    /// error if existence could not be determined.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_bucket(&self, bucket: &str) -> StorageResult<()> {
        let exists = with_timeout("bucket_exists", self.timeouts.read, self.store.bucket_exists()).await?;
        if !exists {
            return Err(ConfigError::BucketNotFound { bucket: bucket.to_owned() }.into());
        }
        Ok(())
    }

    /// Returns the object name a logical key is stored under.
    #[must_use]
    pub fn object_name(&self, key: &str) -> String {
        keys::object_name(&self.prefix, key)
    }

    /// Returns the configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the codec applied to values.
    #[must_use]
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Returns the lock coordinator.
    #[must_use]
    pub fn locks(&self) -> &LockCoordinator<S> {
        &self.locks
    }

    /// Returns the underlying object store.
    #[must_use]
    pub fn object_store(&self) -> &Arc<S> {
        &self.store
    }

    fn record_failure(&self, err: &StorageError) {
        self.metrics.record_error();
        match err {
            StorageError::Timeout { .. } => self.metrics.record_timeout(),
            StorageError::Codec { .. } => self.metrics.record_codec_error(),
            _ => {},
        }
    }
}

impl<S: ?Sized> MetricsCollector for ObjectStorage<S> {
    fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[async_trait]
impl<S: ObjectStore + ?Sized> CertificateStorage for ObjectStorage<S> {
    #[tracing::instrument(skip(self, value), fields(size = value.len()))]
    async fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if value.is_empty() {
            return Err(StorageError::invalid_value(key, "empty value"));
        }

        let start = Instant::now();
        let name = self.object_name(key);
        let result = async {
            let encoded = self.codec.encode(value).map_err(|err| StorageError::codec(key, err))?;
            let size = encoded.len();
            tracing::info!(object = %name, size, "storing object");
            with_timeout("put_object", self.timeouts.write, self.store.put_object(&name, encoded)).await
        }
        .await
        .map_err(|err| err.with_logical_key(key));

        match &result {
            Ok(()) => {
                self.metrics.record_store(start.elapsed());
                tracing::debug!(object = %name, duration_ms = start.elapsed().as_millis() as u64, "stored object");
            },
            Err(err) => {
                self.record_failure(err);
                tracing::warn!(object = %name, error = %err, "store failed");
            },
        }
        result
    }

    #[tracing::instrument(skip(self))]
    async fn load(&self, key: &str) -> StorageResult<Bytes> {
        let start = Instant::now();
        let name = self.object_name(key);
        let result = async {
            let stored = with_timeout("get_object", self.timeouts.read, self.store.get_object(&name))
                .await
                .map_err(|err| err.with_logical_key(key))?;
            if stored.is_empty() {
                return Err(StorageError::not_found(key));
            }
            self.codec.decode(stored).map_err(|err| StorageError::codec(key, err))
        }
        .await;

        match &result {
            Ok(value) => {
                self.metrics.record_load(start.elapsed());
                tracing::debug!(object = %name, size = value.len(), "loaded object");
            },
            Err(err) if err.is_not_found() => {
                self.metrics.record_load(start.elapsed());
            },
            Err(err) => {
                self.record_failure(err);
                tracing::warn!(object = %name, error = %err, "load failed");
            },
        }
        result
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = Instant::now();
        let name = self.object_name(key);
        tracing::info!(object = %name, "deleting object");

        let result = with_timeout("delete_object", self.timeouts.write, self.store.delete_object(&name))
            .await
            .map_err(|err| err.with_logical_key(key));

        match &result {
            Ok(()) => self.metrics.record_delete(start.elapsed()),
            Err(err) => {
                self.record_failure(err);
                tracing::warn!(object = %name, error = %err, "delete failed");
            },
        }
        result
    }

    #[tracing::instrument(skip(self))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let start = Instant::now();
        let name = self.object_name(key);
        let result = match with_timeout("stat_object", self.timeouts.read, self.store.stat_object(&name)).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.with_logical_key(key)),
        };

        match &result {
            Ok(_) => self.metrics.record_stat(start.elapsed()),
            Err(err) => {
                self.record_failure(err);
                tracing::warn!(object = %name, error = %err, "exists check failed");
            },
        }
        result
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let start = Instant::now();
        let list_prefix = keys::list_prefix(&self.prefix, prefix);
        let result = with_timeout(
            "list_objects",
            self.timeouts.list,
            self.store.list_objects(&list_prefix, recursive),
        )
        .await;

        let names = match result {
            Ok(names) => names,
            Err(err) => {
                self.record_failure(&err);
                tracing::warn!(prefix = %list_prefix, error = %err, "list failed");
                return Err(err);
            },
        };

        let mut found: Vec<String> = names
            .iter()
            .filter(|name| !keys::is_lock_object(name))
            .filter_map(|name| keys::to_logical(&self.prefix, name))
            .collect();
        found.sort_unstable();
        found.dedup();

        self.metrics.record_list(start.elapsed());
        tracing::debug!(prefix = %list_prefix, count = found.len(), "listed keys");
        Ok(found)
    }

    #[tracing::instrument(skip(self))]
    async fn stat(&self, key: &str) -> StorageResult<KeyInfo> {
        let start = Instant::now();
        let name = self.object_name(key);
        let result = with_timeout("stat_object", self.timeouts.read, self.store.stat_object(&name))
            .await
            .map(|info| KeyInfo::from_object(key, info))
            .map_err(|err| err.with_logical_key(key));

        match &result {
            Ok(_) => self.metrics.record_stat(start.elapsed()),
            Err(err) if err.is_not_found() => self.metrics.record_stat(start.elapsed()),
            Err(err) => {
                self.record_failure(err);
                tracing::warn!(object = %name, error = %err, "stat failed");
            },
        }
        result
    }

    async fn lock(&self, key: &str, cancel: &CancellationToken) -> StorageResult<()> {
        self.locks.lock(key, cancel).await
    }

    async fn unlock(&self, key: &str) -> StorageResult<()> {
        self.locks.unlock(key).await
    }
}
