//! Lease locks on top of an object store.
//!
//! Object stores have no lock primitive and no conditional put, so mutual
//! exclusion is approximated with a *lease object*: a small object next to
//! the guarded key (`<object name>.lock`) whose body is the RFC3339 time at
//! which it was written.
//!
//! # Protocol
//!
//! Each poll reads the lease:
//!
//! - **absent**: write a fresh lease, acquired
//! - **unparseable**: overwrite it, acquired
//! - **older than `lock_timeout`**: the holder is presumed dead; overwrite, acquired
//! - **otherwise**: live; wait `poll_interval` and poll again
//!
//! The caller gives up with [`StorageError::LockAcquisition`] once it has
//! waited longer than `lock_timeout`. Store calls made while waiting are
//! bounded by the time left in that budget, so a stalled store cannot hold
//! the caller past it by more than a couple of poll intervals.
//!
//! # Guarantees
//!
//! This is best-effort exclusion. Two processes that both observe "absent"
//! (or both observe the same stale lease) will both write and both believe
//! they hold the lock; the last write wins the object but not the race.
//! The lease carries no holder identity and [`unlock`](LockCoordinator::unlock)
//! deletes whatever lease is present. Critical sections that can outlive
//! `lock_timeout` may be taken over by another process.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use fail::fail_point;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::ObjectStore,
    config::{LockConfig, TimeoutConfig},
    error::{StorageError, StorageResult},
    keys,
    metrics::Metrics,
    timeout::with_timeout,
};

/// Outcome of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// A lease was written by us.
    Acquired {
        /// `true` if an existing stale or unparseable lease was overwritten.
        reclaimed: bool,
    },
    /// A live lease written at `since` is held by someone.
    Held { since: DateTime<Utc> },
}

/// Renders the body of a lease written now.
#[must_use]
pub fn lease_body(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a lease body. Any RFC3339 timestamp is accepted.
#[must_use]
pub fn parse_lease(body: &[u8]) -> Option<DateTime<Utc>> {
    let text = std::str::from_utf8(body).ok()?;
    DateTime::parse_from_rfc3339(text.trim()).ok().map(|ts| ts.with_timezone(&Utc))
}

/// Returns `true` if a lease written at `written` is older than `max_age`.
///
/// Leases dated in the future are never stale.
fn is_stale(written: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match now.signed_duration_since(written).to_std() {
        Ok(age) => age > max_age,
        Err(_) => false,
    }
}

/// Acquires and releases lease locks on an [`ObjectStore`].
///
/// Cheap to share; all state lives in the store.
pub struct LockCoordinator<S: ?Sized> {
    store: Arc<S>,
    prefix: String,
    config: LockConfig,
    timeouts: TimeoutConfig,
    metrics: Metrics,
}

impl<S: ?Sized> Clone for LockCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix.clone(),
            config: self.config,
            timeouts: self.timeouts,
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for LockCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("prefix", &self.prefix)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore + ?Sized> LockCoordinator<S> {
    /// Creates a coordinator placing leases under `prefix`.
    pub fn new(store: Arc<S>, prefix: impl Into<String>, config: LockConfig, timeouts: TimeoutConfig) -> Self {
        Self { store, prefix: prefix.into(), config, timeouts, metrics: Metrics::new() }
    }

    /// Reports lock outcomes to `metrics` instead of a private collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the lock timing.
    #[must_use]
    pub fn config(&self) -> LockConfig {
        self.config
    }

    /// Returns the lease object name guarding `key`.
    #[must_use]
    pub fn lease_name(&self, key: &str) -> String {
        keys::lock_name(&self.prefix, key)
    }

    /// Blocks until the lease for `key` is held, the deadline passes, or
    /// `cancel` fires.
    ///
    /// Transient store errors while polling are logged and retried until the
    /// deadline; the last one is reported in the final error.
    ///
    /// # Errors
    ///
    /// - [`StorageError::LockAcquisition`] after waiting longer than `lock_timeout`
    /// - [`StorageError::Cancelled`] when `cancel` fires
    #[tracing::instrument(skip(self, cancel), fields(lease = %self.lease_name(key)))]
    pub async fn lock(&self, key: &str, cancel: &CancellationToken) -> StorageResult<()> {
        let lease = self.lease_name(key);
        let start = Instant::now();
        let mut last_error: Option<String> = None;
        let mut consecutive_failures = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(key));
            }

            let attempt = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(self.cancelled(key)),
                attempt = self.try_acquire(&lease, start) => attempt,
            };

            match attempt {
                Ok(Attempt::Acquired { reclaimed }) => {
                    let waited = start.elapsed();
                    self.metrics.record_lock_acquired(waited);
                    tracing::debug!(
                        key,
                        reclaimed,
                        waited_ms = waited.as_millis() as u64,
                        "lock acquired",
                    );
                    return Ok(());
                },
                Ok(Attempt::Held { since }) => {
                    consecutive_failures = 0;
                    self.metrics.record_lock_contended();
                    tracing::debug!(key, held_since = %since, "lock held elsewhere, waiting");
                },
                Err(err) => {
                    consecutive_failures += 1;
                    tracing::warn!(key, error = %err, "lock attempt failed, will retry");
                    last_error = Some(err.detail());
                },
            }

            // A failed write gets at least one more attempt before the deadline applies.
            let waited = start.elapsed();
            if waited > self.config.lock_timeout() && consecutive_failures != 1 {
                self.metrics.record_lock_timeout();
                tracing::warn!(key, waited_ms = waited.as_millis() as u64, "lock acquisition timed out");
                return Err(StorageError::LockAcquisition { key: key.to_owned(), waited, last_error });
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(self.cancelled(key)),
                () = tokio::time::sleep(self.config.poll_interval()) => {},
            }
        }
    }

    /// Releases the lease for `key`.
    ///
    /// The lease is deleted whoever wrote it. A missing lease is not an error.
    #[tracing::instrument(skip(self), fields(lease = %self.lease_name(key)))]
    pub async fn unlock(&self, key: &str) -> StorageResult<()> {
        let lease = self.lease_name(key);
        match with_timeout("delete_object", self.timeouts.write, self.store.delete_object(&lease)).await {
            Ok(()) => {},
            Err(err) if err.is_not_found() => {},
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to release lock");
                return Err(err);
            },
        }
        self.metrics.record_unlock();
        tracing::debug!(key, "lock released");
        Ok(())
    }

    /// Bounds one store call made while waiting.
    ///
    /// The per-call timeout is cut to what remains of `lock_timeout`, but never
    /// below one poll interval, so the retry granted after a failure still
    /// gets a real attempt.
    fn call_bound(&self, limit: Duration, start: Instant) -> Duration {
        let remaining = self.config.lock_timeout().saturating_sub(start.elapsed());
        limit.min(remaining.max(self.config.poll_interval()))
    }

    async fn try_acquire(&self, lease: &str, start: Instant) -> StorageResult<Attempt> {
        let read_bound = self.call_bound(self.timeouts.read, start);
        let body = match with_timeout("get_object", read_bound, self.store.get_object(lease)).await {
            Ok(body) => body,
            Err(err) if err.is_not_found() => {
                self.write_lease(lease, start).await?;
                return Ok(Attempt::Acquired { reclaimed: false });
            },
            Err(err) => return Err(err),
        };

        match parse_lease(&body) {
            None => {
                tracing::warn!(lease, body_len = body.len(), "unparseable lease, overwriting");
            },
            Some(written) if is_stale(written, Utc::now(), self.config.lock_timeout()) => {
                tracing::info!(lease, written = %written, "stale lease, overwriting");
            },
            Some(written) => return Ok(Attempt::Held { since: written }),
        }

        self.write_lease(lease, start).await?;
        self.metrics.record_lock_stale_reclaimed();
        Ok(Attempt::Acquired { reclaimed: true })
    }

    async fn write_lease(&self, lease: &str, start: Instant) -> StorageResult<()> {
        fail_point!("lock-before-write-lease", |_| {
            Err(StorageError::connection("injected lease write failure"))
        });

        let body = Bytes::from(lease_body(Utc::now()));
        let write_bound = self.call_bound(self.timeouts.write, start);
        with_timeout("put_object", write_bound, self.store.put_object(lease, body)).await
    }

    fn cancelled(&self, key: &str) -> StorageError {
        self.metrics.record_lock_cancelled();
        tracing::debug!(key, "lock acquisition cancelled");
        StorageError::cancelled(key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::memory::MemoryObjectStore;

    fn fast_config() -> LockConfig {
        LockConfig::builder()
            .lock_timeout(Duration::from_millis(200))
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    fn coordinator(store: &MemoryObjectStore) -> LockCoordinator<MemoryObjectStore> {
        LockCoordinator::new(Arc::new(store.clone()), "acme", fast_config(), TimeoutConfig::default())
    }

    #[test]
    fn test_lease_body_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(lease_body(ts), "2024-03-01T08:30:00.000Z");
        assert_eq!(parse_lease(lease_body(ts).as_bytes()), Some(ts));
    }

    #[test]
    fn test_parse_lease_accepts_any_rfc3339() {
        let parsed = parse_lease(b"2024-03-01T10:30:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap());
        assert!(parse_lease(b"2024-03-01T08:30:00.123456789Z").is_some());
    }

    #[test]
    fn test_parse_lease_rejects_garbage() {
        assert_eq!(parse_lease(b""), None);
        assert_eq!(parse_lease(b"not a timestamp"), None);
        assert_eq!(parse_lease(&[0xff, 0xfe]), None);
        assert_eq!(parse_lease(b"2024-03-01 08:30:00"), None);
    }

    #[test]
    fn test_is_stale() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let max_age = Duration::from_secs(15);
        assert!(is_stale(now - chrono::TimeDelta::seconds(16), now, max_age));
        assert!(!is_stale(now - chrono::TimeDelta::seconds(14), now, max_age));
        assert!(!is_stale(now + chrono::TimeDelta::seconds(60), now, max_age));
    }

    #[tokio::test]
    async fn test_lock_writes_parseable_lease() {
        let store = MemoryObjectStore::new();
        let locks = coordinator(&store);

        locks.lock("issue_cert_example.com", &CancellationToken::new()).await.unwrap();

        let body = store.get_object("acme/issue_cert_example.com.lock").await.unwrap();
        let written = parse_lease(&body).unwrap();
        assert!(Utc::now().signed_duration_since(written) < chrono::TimeDelta::seconds(5));
    }

    #[tokio::test]
    async fn test_unlock_removes_lease_and_tolerates_missing() {
        let store = MemoryObjectStore::new();
        let locks = coordinator(&store);

        locks.lock("k", &CancellationToken::new()).await.unwrap();
        locks.unlock("k").await.unwrap();
        assert!(store.is_empty());

        locks.unlock("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_live_lease_times_out() {
        let store = MemoryObjectStore::new();
        let held_until = Utc::now() + chrono::TimeDelta::hours(1);
        store.insert_with_modified("acme/k.lock", Bytes::from(lease_body(held_until)), Utc::now());

        let err = coordinator(&store).lock("k", &CancellationToken::new()).await.unwrap_err();
        match err {
            StorageError::LockAcquisition { key, waited, last_error } => {
                assert_eq!(key, "k");
                assert!(waited > Duration::from_millis(200));
                assert!(last_error.is_none());
            },
            other => panic!("expected LockAcquisition, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_lease_is_reclaimed() {
        let store = MemoryObjectStore::new();
        let stale = Utc::now() - chrono::TimeDelta::seconds(60);
        store.insert_with_modified("acme/k.lock", Bytes::from(lease_body(stale)), stale);

        let metrics = Metrics::new();
        let locks = coordinator(&store).with_metrics(metrics.clone());
        locks.lock("k", &CancellationToken::new()).await.unwrap();

        let rewritten = parse_lease(&store.get_object("acme/k.lock").await.unwrap()).unwrap();
        assert!(rewritten > stale);
        assert_eq!(metrics.snapshot().lock_stale_reclaimed_count, 1);
    }

    #[tokio::test]
    async fn test_malformed_lease_is_overwritten() {
        let store = MemoryObjectStore::new();
        store.put_object("acme/k.lock", Bytes::from_static(b"garbage")).await.unwrap();

        coordinator(&store).lock("k", &CancellationToken::new()).await.unwrap();

        let body = store.get_object("acme/k.lock").await.unwrap();
        assert!(parse_lease(&body).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_token_returns_immediately() {
        let store = MemoryObjectStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = coordinator(&store).lock("k", &cancel).await.unwrap_err();
        assert!(matches!(err, StorageError::Cancelled { ref key } if key == "k"));
        assert!(store.is_empty());
    }
}
