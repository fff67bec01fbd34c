//! Per-call time bounds for object-store operations.
//!
//! Object stores are remote services; a hung connection must not hang the
//! caller forever. [`with_timeout`] bounds a single store call and turns an
//! elapsed bound into [`StorageError::Timeout`].

use std::{future::Future, time::Duration};

use crate::error::{StorageError, StorageResult};

/// Executes `operation` with a time bound.
///
/// The operation's own result is returned unchanged when it finishes in
/// time. On expiry the future is dropped, which releases any response stream
/// it held.
pub(crate) async fn with_timeout<Fut, T>(
    operation_name: &'static str,
    limit: Duration,
    operation: Fut,
) -> StorageResult<T>
where
    Fut: Future<Output = StorageResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::debug!(
                operation = operation_name,
                timeout_ms = limit.as_millis() as u64,
                "object store call timed out",
            );
            Err(StorageError::timeout(operation_name))
        },
    }
}
