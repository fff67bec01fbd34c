//! Storage error types and result alias.
//!
//! Every object-store implementation maps its internal failures to
//! [`StorageError`], and the [`ObjectStorage`](crate::ObjectStorage) facade
//! adds the logical key to whatever it surfaces.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - Object does not exist (the not-exist condition)
//! - [`StorageError::InvalidValue`] - Value rejected before any write happened
//! - [`StorageError::Connection`] - Network or transport failure, usually transient
//! - [`StorageError::Timeout`] - A per-call time bound elapsed
//! - [`StorageError::Codec`] - Decryption or encryption failure, never retried
//! - [`StorageError::LockAcquisition`] - Lease could not be obtained before the deadline
//! - [`StorageError::Cancelled`] - Caller cancelled a lock wait
//! - [`StorageError::Config`] - Construction-time configuration problem
//! - [`StorageError::Internal`] - Anything else
//!
//! # Example
//!
//! ```
//! use certstore_storage::{StorageError, StorageResult};
//!
//! fn lookup(key: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(key))
//! }
//!
//! assert!(lookup("certs/example.com.crt").unwrap_err().is_not_found());
//! ```

use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::codec::CodecError;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// # Non-exhaustive
///
/// New variants may be added in future minor releases. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested object does not exist.
    ///
    /// Callers use this to choose between "create" and "update" paths
    /// without inspecting transport error text.
    #[error("Key not found: {key}")]
    NotFound {
        /// The logical key (or object name, below the facade) that was not found.
        key: String,
    },

    /// The value was rejected before anything was written.
    #[error("invalid key {key}: {reason}")]
    InvalidValue {
        /// The logical key the value was destined for.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Connection or network error.
    #[error("Connection error: {message}{}", key_suffix(.key))]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The logical key the failed call was for, once known.
        key: Option<String>,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// A single object-store call exceeded its time bound.
    #[error("Operation timeout: {operation}{}", key_suffix(.key))]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// The logical key the timed-out call was for, once known.
        key: Option<String>,
    },

    /// The payload could not be encrypted or decrypted.
    ///
    /// Retrying will not help: the ciphertext is corrupt or the key is wrong.
    #[error("failed to read/decrypt data for key {key}")]
    Codec {
        /// The logical key whose payload failed.
        key: String,
        /// The codec failure.
        #[source]
        source: CodecError,
    },

    /// The lease for `key` stayed live for the whole acquisition budget.
    #[error("acquiring lock failed for {key} after {waited:?}{}", last_error_suffix(.last_error))]
    LockAcquisition {
        /// The logical key being locked.
        key: String,
        /// How long the caller waited.
        waited: Duration,
        /// The last transient store error seen while polling, if any.
        last_error: Option<String>,
    },

    /// The caller cancelled the lock wait.
    #[error("lock acquisition cancelled for {key}")]
    Cancelled {
        /// The logical key being locked.
        key: String,
    },

    /// Configuration error detected at construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Internal storage backend error.
    #[error("Internal error: {message}{}", key_suffix(.key))]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The logical key the failed call was for, once known.
        key: Option<String>,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

fn key_suffix(key: &Option<String>) -> String {
    match key {
        Some(key) => format!(" (key {key})"),
        None => String::new(),
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(err) => format!(" (last error: {err})"),
        None => String::new(),
    }
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue { key: key.into(), reason: reason.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), key: None, source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), key: None, source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error for the named operation.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout { operation: operation.into(), key: None }
    }

    /// Creates a new `Codec` error for the given key.
    #[must_use]
    pub fn codec(key: impl Into<String>, source: CodecError) -> Self {
        Self::Codec { key: key.into(), source }
    }

    /// Creates a new `Cancelled` error.
    #[must_use]
    pub fn cancelled(key: impl Into<String>) -> Self {
        Self::Cancelled { key: key.into() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), key: None, source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), key: None, source: Some(Arc::new(source)) }
    }

    /// Returns `true` for failures that may succeed when retried
    /// (connection problems and per-call timeouts).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if this is the not-exist condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Attaches the logical key the caller used.
    ///
    /// A `NotFound` raised for an object name is re-labelled with `key`;
    /// connection, timeout and internal errors record it alongside their
    /// message. Variants that already name a key are returned unchanged.
    #[must_use]
    pub fn with_logical_key(self, key: &str) -> Self {
        match self {
            Self::NotFound { .. } => Self::not_found(key),
            Self::Connection { message, source, .. } => {
                Self::Connection { message, key: Some(key.to_owned()), source }
            },
            Self::Timeout { operation, .. } => Self::Timeout { operation, key: Some(key.to_owned()) },
            Self::Internal { message, source, .. } => {
                Self::Internal { message, key: Some(key.to_owned()), source }
            },
            other => other,
        }
    }

    /// Returns a single-line description including the source chain, for logs.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            detail.push_str(": ");
            detail.push_str(&err.to_string());
            source = err.source();
        }
        detail
    }
}

/// Configuration validation errors.
///
/// Only produced while building a storage instance; never surfaced from a
/// data operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The encryption key is neither empty nor exactly 32 bytes.
    #[error("encryption key must have exactly {expected} bytes, got {actual}")]
    InvalidEncryptionKeyLength {
        /// Required key length.
        expected: usize,
        /// Supplied key length.
        actual: usize,
    },

    /// No bucket was configured.
    #[error("bucket is required")]
    MissingBucket,

    /// The configured bucket does not exist.
    #[error("bucket {bucket} does not exist")]
    BucketNotFound {
        /// Bucket name.
        bucket: String,
    },

    /// The endpoint could not be parsed as an absolute http(s) URL.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint {
        /// The endpoint as configured.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two options that cannot be combined were both set.
    #[error("cannot specify both '{first}' and '{second}' options")]
    ConflictingOptions {
        /// First option name.
        first: &'static str,
        /// Second option name.
        second: &'static str,
    },

    /// A duration or count that must be positive was zero.
    #[error("{field} must be positive, got {value}")]
    MustBePositive {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },

    /// The option needs a cargo feature that was not compiled in.
    #[error("option '{option}' requires the '{feature}' feature")]
    FeatureDisabled {
        /// Option name.
        option: &'static str,
        /// Cargo feature that enables it.
        feature: &'static str,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::connection("reset by peer").is_transient());
        assert!(StorageError::timeout("get_object").is_transient());
        assert!(!StorageError::not_found("k").is_transient());
        assert!(!StorageError::codec("k", CodecError::Authentication).is_transient());
        assert!(!StorageError::cancelled("k").is_transient());
    }

    #[test]
    fn test_with_logical_key_relabels_not_found() {
        let err = StorageError::not_found("acme/certs/a.crt").with_logical_key("certs/a.crt");
        assert!(matches!(err, StorageError::NotFound { ref key } if key == "certs/a.crt"));
    }

    #[test]
    fn test_with_logical_key_names_key_on_transport_errors() {
        let err = StorageError::timeout("put_object").with_logical_key("certs/a.crt");
        assert!(matches!(err, StorageError::Timeout { key: Some(ref key), .. } if key == "certs/a.crt"));
        assert_eq!(err.to_string(), "Operation timeout: put_object (key certs/a.crt)");

        let io = std::io::Error::other("socket closed");
        let err = StorageError::connection_with_source("put_object failed", io).with_logical_key("certs/a.crt");
        assert!(err.is_transient());
        assert_eq!(err.detail(), "Connection error: put_object failed (key certs/a.crt): socket closed");

        let err = StorageError::internal("access denied").with_logical_key("certs/a.crt");
        assert_eq!(err.to_string(), "Internal error: access denied (key certs/a.crt)");
    }

    #[test]
    fn test_with_logical_key_keeps_existing_key() {
        let err = StorageError::cancelled("issue/a").with_logical_key("other");
        assert!(matches!(err, StorageError::Cancelled { ref key } if key == "issue/a"));
    }

    #[test]
    fn test_codec_detail_names_cause_once() {
        let err = StorageError::codec("certs/a.crt", CodecError::Authentication);
        let cause = CodecError::Authentication.to_string();
        assert_eq!(err.detail(), format!("failed to read/decrypt data for key certs/a.crt: {cause}"));
        assert_eq!(err.detail().matches(cause.as_str()).count(), 1);
    }

    #[test]
    fn test_lock_acquisition_display() {
        let err = StorageError::LockAcquisition {
            key: "issue_cert_example.com".into(),
            waited: Duration::from_secs(15),
            last_error: None,
        };
        assert_eq!(err.to_string(), "acquiring lock failed for issue_cert_example.com after 15s");

        let err = StorageError::LockAcquisition {
            key: "k".into(),
            waited: Duration::from_millis(500),
            last_error: Some("Connection error: refused".into()),
        };
        assert!(err.to_string().ends_with("(last error: Connection error: refused)"));
    }

    #[test]
    fn test_detail_includes_source_chain() {
        let io = std::io::Error::other("socket closed");
        let err = StorageError::connection_with_source("put_object failed", io);
        assert_eq!(err.detail(), "Connection error: put_object failed: socket closed");
    }

    #[test]
    fn test_config_error_converts() {
        let err: StorageError = ConfigError::MissingBucket.into();
        assert!(matches!(err, StorageError::Config(ConfigError::MissingBucket)));
        assert_eq!(err.to_string(), "bucket is required");
    }
}
