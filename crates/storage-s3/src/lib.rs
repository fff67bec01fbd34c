//! S3-backed certificate storage.
//!
//! This crate provides [`S3ObjectStore`], an [`ObjectStore`] over an
//! S3-compatible bucket, and [`connect`], which builds a ready-to-use
//! [`ObjectStorage`] from configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │            ObjectStorage (certstore-storage)                │
//! │      key mapping │ codec │ lease locks │ timeouts           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    S3ObjectStore                            │
//! │         (implements ObjectStore trait)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   aws-sdk-s3 Client                         │
//! │    credentials chain │ STS assume role │ custom endpoint    │
//! ├─────────────────────────────────────────────────────────────┤
//! │           AWS S3 / MinIO / Ceph / R2 / ...                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! // Requires a reachable S3-compatible service.
//! use certstore_storage::{CertificateStorage, StorageConfig};
//! use certstore_storage_s3::{S3BackendConfig, connect};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = S3BackendConfig::builder()
//!         .endpoint("http://localhost:9000")
//!         .bucket("certificates")
//!         .access_key("minioadmin")
//!         .secret_key("minioadmin")
//!         .build()?;
//!     let storage = StorageConfig::builder()
//!         .prefix("certmagic")
//!         .encryption_key("0123456789abcdef0123456789abcdef")
//!         .build()?;
//!
//!     let certs = connect(&backend, storage).await?;
//!     certs.store("certificates/example.com/example.com.crt", b"-----BEGIN CERTIFICATE-----").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Error Mapping
//!
//! | S3 condition                              | `StorageError`  |
//! | ----------------------------------------- | --------------- |
//! | `NoSuchKey`, `NotFound`, HTTP 404         | `NotFound`      |
//! | SDK timeout                               | `Timeout`       |
//! | dispatch/response failure, throttling, 5xx| `Connection`    |
//! | anything else (e.g. `AccessDenied`)       | `Internal`      |
//!
//! # Feature Flags
//!
//! - **`insecure-tls`**: Allows `insecure = true`, which disables TLS certificate verification.
//!   Only for test or private deployments with self-signed certificates.
//! - **`testutil`**: Enables `testutil` in `certstore-storage` for downstream test crates.

#![deny(unsafe_code)]

pub mod backend;
mod client;
pub mod config;
pub mod error;

use std::sync::Arc;

pub use backend::S3ObjectStore;
use certstore_storage::{ObjectStorage, StorageConfig, StorageResult};
// Re-export the core crate for convenience
pub use certstore_storage::{self as storage, ObjectStore};
pub use config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REGION, S3BackendConfig};
pub use error::S3StorageError;

/// Builds certificate storage over the bucket in `backend` and checks that
/// the bucket exists.
///
/// # Errors
///
/// - [`StorageError::Config`](certstore_storage::StorageError::Config) if either
///   configuration is invalid or the bucket does not exist
/// - the mapped S3 error if the bucket check itself fails
#[tracing::instrument(skip_all, fields(bucket = %backend.bucket(), prefix = %storage.prefix()))]
pub async fn connect(
    backend: &S3BackendConfig,
    storage: StorageConfig,
) -> StorageResult<ObjectStorage<S3ObjectStore>> {
    let store = S3ObjectStore::new(backend).await?;
    let certs = ObjectStorage::new(Arc::new(store), storage)?;
    certs.ensure_bucket(backend.bucket()).await?;

    if certs.codec().is_encrypted() {
        tracing::info!("encrypted certificate storage active");
    } else {
        tracing::info!("clear text certificate storage active");
    }
    Ok(certs)
}
