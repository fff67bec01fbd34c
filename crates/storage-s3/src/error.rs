//! Error types for the S3 object store.
//!
//! This module maps AWS SDK failures onto the generic
//! [`StorageError`](certstore_storage::StorageError) type. The mapping keeps
//! the distinctions the certificate storage layer acts on: an absent object
//! is `NotFound`, a stalled call is `Timeout`, and anything worth retrying is
//! `Connection`.

use std::sync::Arc;

use aws_sdk_s3::{
    config::http::HttpResponse,
    error::{ProvideErrorMetadata, SdkError},
};
use certstore_storage::{BoxError, ConfigError, StorageError};
use thiserror::Error;

/// Result type alias for S3 object store operations.
pub type Result<T> = std::result::Result<T, S3StorageError>;

/// Service error codes that mean "no such object".
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NotFound"];

/// Service error codes worth retrying.
const THROTTLING_CODES: &[&str] = &[
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "RequestTimeout",
    "RequestTimeTooSkewed",
    "ServiceUnavailable",
    "InternalError",
];

/// Errors specific to the S3 object store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum S3StorageError {
    /// The object does not exist.
    #[error("object {name} not found")]
    NotFound {
        /// Object name.
        name: String,
    },

    /// The SDK gave up waiting for the service.
    #[error("S3 {operation} timed out for {name}")]
    Timeout {
        /// SDK operation name.
        operation: &'static str,
        /// Object name.
        name: String,
    },

    /// The request never got a well-formed response.
    #[error("S3 {operation} failed for {name}: transport error")]
    Transport {
        /// SDK operation name.
        operation: &'static str,
        /// Object name.
        name: String,
        /// The SDK error.
        #[source]
        source: BoxError,
    },

    /// The service answered with an error.
    #[error("S3 {operation} failed for {name}: {code} (HTTP {status})")]
    Service {
        /// SDK operation name.
        operation: &'static str,
        /// Object name.
        name: String,
        /// Service error code, or `"Unknown"`.
        code: String,
        /// HTTP status code, `0` if unavailable.
        status: u16,
        /// Whether the error is throttling or a server-side failure.
        transient: bool,
        /// The SDK error.
        #[source]
        source: BoxError,
    },

    /// The response body could not be read.
    #[error("failed to read S3 response body for {name}")]
    Body {
        /// Object name.
        name: String,
        /// The stream error.
        #[source]
        source: BoxError,
    },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl S3StorageError {
    /// Classifies an SDK error raised by `operation` on `name`.
    pub fn from_sdk<E>(operation: &'static str, name: &str, err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let name = name.to_owned();
        match &err {
            SdkError::TimeoutError(_) => Self::Timeout { operation, name },
            SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                Self::Transport { operation, name, source: Arc::new(err) }
            },
            SdkError::ServiceError(_) => {
                let status = err.raw_response().map_or(0, |resp| resp.status().as_u16());
                let code = err
                    .as_service_error()
                    .and_then(ProvideErrorMetadata::code)
                    .unwrap_or("Unknown")
                    .to_owned();
                if is_not_found(status, &code) {
                    return Self::NotFound { name };
                }
                let transient = is_transient(status, &code);
                Self::Service { operation, name, code, status, transient, source: Arc::new(err) }
            },
            _ => Self::Service {
                operation,
                name,
                code: "Unknown".to_owned(),
                status: 0,
                transient: false,
                source: Arc::new(err),
            },
        }
    }

    /// Returns `true` if the error is the not-exist condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if retrying may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } | Self::Body { .. } => true,
            Self::Service { transient, .. } => *transient,
            Self::NotFound { .. } | Self::Config(_) => false,
        }
    }
}

/// Returns `true` if a status/code pair means the object is absent.
///
/// A 404 for a missing bucket is not an absent object.
pub(crate) fn is_not_found(status: u16, code: &str) -> bool {
    code != "NoSuchBucket" && (status == 404 || NOT_FOUND_CODES.contains(&code))
}

fn is_transient(status: u16, code: &str) -> bool {
    status == 429 || status >= 500 || THROTTLING_CODES.contains(&code)
}

impl From<S3StorageError> for StorageError {
    fn from(err: S3StorageError) -> Self {
        match err {
            S3StorageError::NotFound { name } => StorageError::not_found(name),
            S3StorageError::Timeout { operation, name } => {
                tracing::debug!(operation, object = %name, "S3 call timed out in the SDK");
                StorageError::timeout(operation)
            },
            S3StorageError::Config(config) => StorageError::Config(config),
            err @ (S3StorageError::Transport { .. } | S3StorageError::Body { .. }) => {
                StorageError::connection_with_source(err.to_string(), err)
            },
            err @ S3StorageError::Service { transient: true, .. } => {
                StorageError::connection_with_source(err.to_string(), err)
            },
            err @ S3StorageError::Service { .. } => StorageError::internal_with_source(err.to_string(), err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service(code: &str, status: u16, transient: bool) -> S3StorageError {
        S3StorageError::Service {
            operation: "GetObject",
            name: "acme/certs/a.crt".into(),
            code: code.into(),
            status,
            transient,
            source: Arc::new(std::io::Error::other("boom")),
        }
    }

    #[test]
    fn test_not_found_classification() {
        assert!(is_not_found(404, "Unknown"));
        assert!(is_not_found(404, "NotFound"));
        assert!(is_not_found(0, "NoSuchKey"));
        assert!(!is_not_found(404, "NoSuchBucket"));
        assert!(!is_not_found(403, "AccessDenied"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(503, "SlowDown"));
        assert!(is_transient(500, "Unknown"));
        assert!(is_transient(429, "Unknown"));
        assert!(is_transient(400, "RequestTimeout"));
        assert!(!is_transient(403, "AccessDenied"));
        assert!(!is_transient(400, "InvalidArgument"));
    }

    #[test]
    fn test_not_found_maps_to_not_found() {
        let err: StorageError = S3StorageError::NotFound { name: "acme/certs/a.crt".into() }.into();
        assert!(matches!(err, StorageError::NotFound { ref key } if key == "acme/certs/a.crt"));
    }

    #[test]
    fn test_timeout_maps_to_timeout() {
        let err: StorageError =
            S3StorageError::Timeout { operation: "PutObject", name: "acme/k".into() }.into();
        assert!(matches!(err, StorageError::Timeout { ref operation, .. } if operation == "PutObject"));
    }

    #[test]
    fn test_throttling_maps_to_connection() {
        let err: StorageError = service("SlowDown", 503, true).into();
        assert!(err.is_transient());
        assert!(err.detail().contains("SlowDown (HTTP 503)"));
    }

    #[test]
    fn test_access_denied_maps_to_internal() {
        let err: StorageError = service("AccessDenied", 403, false).into();
        assert!(matches!(err, StorageError::Internal { .. }));
        assert!(!err.is_transient());
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[test]
    fn test_body_error_is_transient() {
        let err = S3StorageError::Body {
            name: "acme/k".into(),
            source: Arc::new(std::io::Error::other("connection reset")),
        };
        assert!(err.is_transient());
        let err: StorageError = err.into();
        assert!(err.detail().contains("connection reset"));
    }

    #[test]
    fn test_config_error_passes_through() {
        let err: StorageError = S3StorageError::Config(ConfigError::MissingBucket).into();
        assert!(matches!(err, StorageError::Config(ConfigError::MissingBucket)));
    }
}
