//! [`ObjectStore`] over an S3 bucket.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::{Client, primitives::ByteStream};
use bytes::Bytes;
use certstore_storage::{ConfigError, ObjectInfo, ObjectStore, StorageResult};
use chrono::{DateTime, Utc};

use crate::{client::build_client, config::S3BackendConfig, error::S3StorageError};

/// S3-compatible object store.
///
/// Works with AWS S3 and S3-compatible services such as MinIO. Every call
/// goes straight to the service; there is no local caching.
///
/// # Cloning
///
/// Cheap; the SDK client is reference-counted internally.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore").field("bucket", &self.bucket).finish_non_exhaustive()
    }
}

impl S3ObjectStore {
    /// Creates a store for the bucket in `config`.
    ///
    /// No request is sent; use
    /// [`ObjectStorage::ensure_bucket`](certstore_storage::ObjectStorage::ensure_bucket)
    /// to check the bucket exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub async fn new(config: &S3BackendConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = build_client(config).await;
        Ok(Self::from_client(client, config.bucket()))
    }

    /// Creates a store from an existing SDK client.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self { client, bucket: bucket.into() }
    }

    /// Returns the SDK client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn to_chrono(time: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(level = "debug", skip(self), fields(bucket = %self.bucket))]
    async fn bucket_exists(&self) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => match S3StorageError::from_sdk("HeadBucket", &self.bucket, err) {
                S3StorageError::NotFound { .. } | S3StorageError::Service { status: 404, .. } => Ok(false),
                err => Err(err.into()),
            },
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_object(&self, name: &str) -> StorageResult<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|err| S3StorageError::from_sdk("GetObject", name, err))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|err| S3StorageError::Body { name: name.to_owned(), source: Arc::new(err) })?;
        Ok(body.into_bytes())
    }

    #[tracing::instrument(level = "debug", skip(self, value), fields(size = value.len()))]
    async fn put_object(&self, name: &str, value: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .body(ByteStream::from(value))
            .send()
            .await
            .map_err(|err| S3StorageError::from_sdk("PutObject", name, err))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_object(&self, name: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|err| S3StorageError::from_sdk("DeleteObject", name, err))?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn stat_object(&self, name: &str) -> StorageResult<ObjectInfo> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
            .map_err(|err| S3StorageError::from_sdk("HeadObject", name, err))?;

        let size = head.content_length().and_then(|len| u64::try_from(len).ok()).unwrap_or(0);
        let modified = head.last_modified().and_then(to_chrono).unwrap_or_default();
        Ok(ObjectInfo::new(name, size, modified))
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_objects(&self, prefix: &str, recursive: bool) -> StorageResult<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter((!recursive).then(|| "/".to_owned()))
            .into_paginator()
            .send();

        let mut names = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| S3StorageError::from_sdk("ListObjectsV2", prefix, err))?;
            names.extend(page.contents().iter().filter_map(|obj| obj.key()).map(str::to_owned));
            names.extend(page.common_prefixes().iter().filter_map(|cp| cp.prefix()).map(str::to_owned));
        }

        tracing::debug!(prefix, count = names.len(), "listed objects");
        Ok(names)
    }
}
