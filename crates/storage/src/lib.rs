//! Object-store backed certificate storage.
//!
//! This crate provides the [`CertificateStorage`] contract a certificate
//! manager programs against, and [`ObjectStorage`], which implements it over
//! any [`ObjectStore`] (an S3-compatible bucket in production, an in-memory
//! map in tests).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Certificate manager                        │
//! │        (issuance, renewal, OCSP stapling, accounts)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 CertificateStorage trait                    │
//! │   store, load, delete, exists, list, stat, lock, unlock     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     ObjectStorage                           │
//! │  key → object name │ Codec (cleartext / secretbox) │ leases │
//! ├──────────────────────┬──────────────────────────────────────┤
//! │ MemoryObjectStore    │  S3ObjectStore                       │
//! │   (testing)          │  (in `certstore-storage-s3`)         │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use certstore_storage::{CertificateStorage, MemoryObjectStore, ObjectStorage, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StorageConfig::builder()
//!         .prefix("certmagic")
//!         .encryption_key("0123456789abcdef0123456789abcdef")
//!         .build()?;
//!     let storage = ObjectStorage::new(Arc::new(MemoryObjectStore::new()), config)?;
//!
//!     storage.store("certificates/example.com/example.com.crt", b"-----BEGIN CERTIFICATE-----").await?;
//!     let pem = storage.load("certificates/example.com/example.com.crt").await?;
//!     assert!(pem.starts_with(b"-----BEGIN"));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Locking
//!
//! Locks are advisory leases: a `<key>.lock` object holding the time it was
//! written. A lease older than the configured lock timeout is considered
//! abandoned and may be taken over. See the [`lock`] module.
//!
//! # Implementing a Store
//!
//! 1. Implement the [`ObjectStore`] trait
//! 2. Report missing objects as [`StorageError::NotFound`]
//! 3. Run the [`conformance`] suite against it (`testutil` feature)
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` and `conformance` modules (key/value generators,
//!   fault-injecting stores, assertion macros, store conformance suite). Enable this in
//!   `[dev-dependencies]` for integration tests.
//! - **`failpoints`**: Activates `fail` fail points in the memory store and the lock protocol.

#![deny(unsafe_code)]

pub mod backend;
pub mod codec;
pub mod config;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod conformance;
pub mod error;
pub mod keys;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod storage;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
mod timeout;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::ObjectStore;
pub use codec::{Codec, CodecError, SecretBoxCodec};
pub use config::{LockConfig, StorageConfig, TimeoutConfig};
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use lock::LockCoordinator;
pub use memory::MemoryObjectStore;
pub use metrics::{LatencyPercentiles, Metrics, MetricsCollector, MetricsSnapshot};
pub use storage::{CertificateStorage, ObjectStorage};
pub use tokio_util::sync::CancellationToken;
pub use types::{KeyInfo, ObjectInfo};
