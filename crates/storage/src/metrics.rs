//! Storage metrics collection and monitoring
//!
//! This module provides in-process metrics for the certificate storage facade:
//!
//! - Operation counts (store, load, delete, list, stat)
//! - Operation latencies (cumulative microseconds and p50/p95/p99 percentiles)
//! - Lease-lock outcomes (acquired, contended polls, stale leases reclaimed,
//!   deadline failures, cancellations) and wait times
//! - Error counts by kind
//!
//! # Memory Ordering
//!
//! All counters use `Ordering::Relaxed`. Each counter is independent and only
//! ever incremented or reset, so `snapshot()` may observe counters at slightly
//! different instants. That is acceptable for telemetry.
//!
//! # Percentile Tracking
//!
//! Each operation type keeps a `LatencyHistogram`: a circular buffer of the
//! most recent 1024 samples (microseconds) behind a [`parking_lot::Mutex`].
//! Percentiles are computed at snapshot time by sorting a copy.
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use certstore_storage::metrics::Metrics;
//!
//! let metrics = Metrics::new();
//!
//! metrics.record_load(Duration::from_micros(100));
//! metrics.record_store(Duration::from_micros(200));
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.load_count, 1);
//! assert_eq!(snapshot.avg_load_latency_us(), 100.0);
//! assert_eq!(snapshot.load_percentiles.p50, 100);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::warn;

/// Default number of latency samples retained per operation type.
const DEFAULT_HISTOGRAM_WINDOW_SIZE: usize = 1024;

// ── LatencyPercentiles ──────────────────────────────────────────────────

/// Latency percentiles for a single operation type, in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyPercentiles {
    /// 50th percentile (median) latency in microseconds.
    pub p50: u64,
    /// 95th percentile latency in microseconds.
    pub p95: u64,
    /// 99th percentile latency in microseconds.
    pub p99: u64,
}

// ── LatencyHistogram ────────────────────────────────────────────────────

/// A bounded circular buffer of latency samples.
pub(crate) struct LatencyHistogram {
    inner: Mutex<HistogramInner>,
}

struct HistogramInner {
    buf: Vec<u64>,
    pos: usize,
    capacity: usize,
}

impl LatencyHistogram {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(HistogramInner { buf: Vec::with_capacity(capacity), pos: 0, capacity }) }
    }

    pub(crate) fn record(&self, value_us: u64) {
        let mut inner = self.inner.lock();
        let pos = inner.pos;
        if inner.buf.len() < inner.capacity {
            inner.buf.push(value_us);
        } else {
            inner.buf[pos] = value_us;
        }
        inner.pos = (pos + 1) % inner.capacity;
    }

    /// Returns all zeros if no samples have been recorded.
    pub(crate) fn percentiles(&self) -> LatencyPercentiles {
        let mut sorted = {
            let inner = self.inner.lock();
            if inner.buf.is_empty() {
                return LatencyPercentiles::default();
            }
            inner.buf.clone()
        };
        sorted.sort_unstable();
        let len = sorted.len();
        LatencyPercentiles {
            p50: sorted[percentile_index(len, 50)],
            p95: sorted[percentile_index(len, 95)],
            p99: sorted[percentile_index(len, 99)],
        }
    }

    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.buf.clear();
        inner.pos = 0;
    }
}

/// Nearest-rank index: `ceil(percentile/100 * len) - 1`, clamped to range.
fn percentile_index(len: usize, percentile: u32) -> usize {
    if len == 0 {
        return 0;
    }
    let rank = (u64::from(percentile) * len as u64).div_ceil(100) as usize;
    rank.saturating_sub(1).min(len - 1)
}

// ── MetricsSnapshot ─────────────────────────────────────────────────────

/// Metrics snapshot for export.
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct MetricsSnapshot {
    /// Total store operations.
    #[builder(default)]
    pub store_count: u64,
    /// Total load operations.
    #[builder(default)]
    pub load_count: u64,
    /// Total delete operations.
    #[builder(default)]
    pub delete_count: u64,
    /// Total list operations.
    #[builder(default)]
    pub list_count: u64,
    /// Total stat and exists operations.
    #[builder(default)]
    pub stat_count: u64,

    /// Cumulative store latency in microseconds.
    #[builder(default)]
    pub store_latency_us: u64,
    /// Cumulative load latency in microseconds.
    #[builder(default)]
    pub load_latency_us: u64,
    /// Cumulative delete latency in microseconds.
    #[builder(default)]
    pub delete_latency_us: u64,
    /// Cumulative list latency in microseconds.
    #[builder(default)]
    pub list_latency_us: u64,
    /// Cumulative stat latency in microseconds.
    #[builder(default)]
    pub stat_latency_us: u64,

    /// Store latency percentiles.
    #[builder(default)]
    pub store_percentiles: LatencyPercentiles,
    /// Load latency percentiles.
    #[builder(default)]
    pub load_percentiles: LatencyPercentiles,
    /// List latency percentiles.
    #[builder(default)]
    pub list_percentiles: LatencyPercentiles,

    /// Leases acquired.
    #[builder(default)]
    pub lock_acquired_count: u64,
    /// Polls that found a live lease held by someone else.
    #[builder(default)]
    pub lock_contended_count: u64,
    /// Leases taken over because they were stale or unparseable.
    #[builder(default)]
    pub lock_stale_reclaimed_count: u64,
    /// Acquisitions that hit the deadline.
    #[builder(default)]
    pub lock_timeout_count: u64,
    /// Acquisitions abandoned through cancellation.
    #[builder(default)]
    pub lock_cancelled_count: u64,
    /// Leases released.
    #[builder(default)]
    pub unlock_count: u64,
    /// Lock wait percentiles (time from first poll to acquisition).
    #[builder(default)]
    pub lock_wait_percentiles: LatencyPercentiles,

    /// Total failed operations.
    #[builder(default)]
    pub error_count: u64,
    /// Failures caused by a per-call time bound.
    #[builder(default)]
    pub timeout_count: u64,
    /// Payloads that failed to decode.
    #[builder(default)]
    pub codec_error_count: u64,
}

impl MetricsSnapshot {
    fn avg(total_us: u64, count: u64) -> f64 {
        if count == 0 {
            return 0.0;
        }
        total_us as f64 / count as f64
    }

    /// Average store latency in microseconds.
    #[must_use]
    pub fn avg_store_latency_us(&self) -> f64 {
        Self::avg(self.store_latency_us, self.store_count)
    }

    /// Average load latency in microseconds.
    #[must_use]
    pub fn avg_load_latency_us(&self) -> f64 {
        Self::avg(self.load_latency_us, self.load_count)
    }

    /// Average delete latency in microseconds.
    #[must_use]
    pub fn avg_delete_latency_us(&self) -> f64 {
        Self::avg(self.delete_latency_us, self.delete_count)
    }

    /// Average list latency in microseconds.
    #[must_use]
    pub fn avg_list_latency_us(&self) -> f64 {
        Self::avg(self.list_latency_us, self.list_count)
    }

    /// Total data operations (excluding lock traffic).
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        self.store_count + self.load_count + self.delete_count + self.list_count + self.stat_count
    }

    /// Error rate (errors / total operations).
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        let total = self.total_operations();
        if total == 0 {
            return 0.0;
        }
        self.error_count as f64 / total as f64
    }

    /// Fraction of lock attempts that ended without the lease.
    #[must_use]
    pub fn lock_failure_rate(&self) -> f64 {
        let failed = self.lock_timeout_count + self.lock_cancelled_count;
        let attempts = self.lock_acquired_count + failed;
        if attempts == 0 {
            return 0.0;
        }
        failed as f64 / attempts as f64
    }
}

// ── Metrics ─────────────────────────────────────────────────────────────

/// Collects operation counts, latencies, lock outcomes and error rates for a
/// storage facade.
///
/// Cheap to clone; clones share counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    store_count: AtomicU64,
    load_count: AtomicU64,
    delete_count: AtomicU64,
    list_count: AtomicU64,
    stat_count: AtomicU64,

    store_latency_us: AtomicU64,
    load_latency_us: AtomicU64,
    delete_latency_us: AtomicU64,
    list_latency_us: AtomicU64,
    stat_latency_us: AtomicU64,

    store_histogram: LatencyHistogram,
    load_histogram: LatencyHistogram,
    list_histogram: LatencyHistogram,
    lock_wait_histogram: LatencyHistogram,

    lock_acquired_count: AtomicU64,
    lock_contended_count: AtomicU64,
    lock_stale_reclaimed_count: AtomicU64,
    lock_timeout_count: AtomicU64,
    lock_cancelled_count: AtomicU64,
    unlock_count: AtomicU64,

    error_count: AtomicU64,
    timeout_count: AtomicU64,
    codec_error_count: AtomicU64,
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl Metrics {
    /// Creates a new metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                store_count: AtomicU64::new(0),
                load_count: AtomicU64::new(0),
                delete_count: AtomicU64::new(0),
                list_count: AtomicU64::new(0),
                stat_count: AtomicU64::new(0),
                store_latency_us: AtomicU64::new(0),
                load_latency_us: AtomicU64::new(0),
                delete_latency_us: AtomicU64::new(0),
                list_latency_us: AtomicU64::new(0),
                stat_latency_us: AtomicU64::new(0),
                store_histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
                load_histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
                list_histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
                lock_wait_histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
                lock_acquired_count: AtomicU64::new(0),
                lock_contended_count: AtomicU64::new(0),
                lock_stale_reclaimed_count: AtomicU64::new(0),
                lock_timeout_count: AtomicU64::new(0),
                lock_cancelled_count: AtomicU64::new(0),
                unlock_count: AtomicU64::new(0),
                error_count: AtomicU64::new(0),
                timeout_count: AtomicU64::new(0),
                codec_error_count: AtomicU64::new(0),
            }),
        }
    }

    /// Records a store operation.
    pub fn record_store(&self, duration: Duration) {
        let us = micros(duration);
        self.inner.store_count.fetch_add(1, Ordering::Relaxed);
        self.inner.store_latency_us.fetch_add(us, Ordering::Relaxed);
        self.inner.store_histogram.record(us);
    }

    /// Records a load operation.
    pub fn record_load(&self, duration: Duration) {
        let us = micros(duration);
        self.inner.load_count.fetch_add(1, Ordering::Relaxed);
        self.inner.load_latency_us.fetch_add(us, Ordering::Relaxed);
        self.inner.load_histogram.record(us);
    }

    /// Records a delete operation.
    pub fn record_delete(&self, duration: Duration) {
        self.inner.delete_count.fetch_add(1, Ordering::Relaxed);
        self.inner.delete_latency_us.fetch_add(micros(duration), Ordering::Relaxed);
    }

    /// Records a list operation.
    pub fn record_list(&self, duration: Duration) {
        let us = micros(duration);
        self.inner.list_count.fetch_add(1, Ordering::Relaxed);
        self.inner.list_latency_us.fetch_add(us, Ordering::Relaxed);
        self.inner.list_histogram.record(us);
    }

    /// Records a stat or exists operation.
    pub fn record_stat(&self, duration: Duration) {
        self.inner.stat_count.fetch_add(1, Ordering::Relaxed);
        self.inner.stat_latency_us.fetch_add(micros(duration), Ordering::Relaxed);
    }

    /// Records a successful lease acquisition after waiting `waited`.
    pub fn record_lock_acquired(&self, waited: Duration) {
        self.inner.lock_acquired_count.fetch_add(1, Ordering::Relaxed);
        self.inner.lock_wait_histogram.record(micros(waited));
    }

    /// Records a poll that found a live lease.
    pub fn record_lock_contended(&self) {
        self.inner.lock_contended_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a stale or unparseable lease being overwritten.
    pub fn record_lock_stale_reclaimed(&self) {
        self.inner.lock_stale_reclaimed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an acquisition that hit its deadline.
    pub fn record_lock_timeout(&self) {
        self.inner.lock_timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cancelled acquisition.
    pub fn record_lock_cancelled(&self) {
        self.inner.lock_cancelled_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lease release.
    pub fn record_unlock(&self) {
        self.inner.unlock_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed operation.
    pub fn record_error(&self) {
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an operation that exceeded its time bound.
    pub fn record_timeout(&self) {
        self.inner.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a payload that failed to decode.
    pub fn record_codec_error(&self) {
        self.inner.codec_error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time view of every counter.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            store_count: inner.store_count.load(Ordering::Relaxed),
            load_count: inner.load_count.load(Ordering::Relaxed),
            delete_count: inner.delete_count.load(Ordering::Relaxed),
            list_count: inner.list_count.load(Ordering::Relaxed),
            stat_count: inner.stat_count.load(Ordering::Relaxed),
            store_latency_us: inner.store_latency_us.load(Ordering::Relaxed),
            load_latency_us: inner.load_latency_us.load(Ordering::Relaxed),
            delete_latency_us: inner.delete_latency_us.load(Ordering::Relaxed),
            list_latency_us: inner.list_latency_us.load(Ordering::Relaxed),
            stat_latency_us: inner.stat_latency_us.load(Ordering::Relaxed),
            store_percentiles: inner.store_histogram.percentiles(),
            load_percentiles: inner.load_histogram.percentiles(),
            list_percentiles: inner.list_histogram.percentiles(),
            lock_acquired_count: inner.lock_acquired_count.load(Ordering::Relaxed),
            lock_contended_count: inner.lock_contended_count.load(Ordering::Relaxed),
            lock_stale_reclaimed_count: inner.lock_stale_reclaimed_count.load(Ordering::Relaxed),
            lock_timeout_count: inner.lock_timeout_count.load(Ordering::Relaxed),
            lock_cancelled_count: inner.lock_cancelled_count.load(Ordering::Relaxed),
            unlock_count: inner.unlock_count.load(Ordering::Relaxed),
            lock_wait_percentiles: inner.lock_wait_histogram.percentiles(),
            error_count: inner.error_count.load(Ordering::Relaxed),
            timeout_count: inner.timeout_count.load(Ordering::Relaxed),
            codec_error_count: inner.codec_error_count.load(Ordering::Relaxed),
        }
    }

    /// Resets all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.store_count,
            &inner.load_count,
            &inner.delete_count,
            &inner.list_count,
            &inner.stat_count,
            &inner.store_latency_us,
            &inner.load_latency_us,
            &inner.delete_latency_us,
            &inner.list_latency_us,
            &inner.stat_latency_us,
            &inner.lock_acquired_count,
            &inner.lock_contended_count,
            &inner.lock_stale_reclaimed_count,
            &inner.lock_timeout_count,
            &inner.lock_cancelled_count,
            &inner.unlock_count,
            &inner.error_count,
            &inner.timeout_count,
            &inner.codec_error_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        inner.store_histogram.reset();
        inner.load_histogram.reset();
        inner.list_histogram.reset();
        inner.lock_wait_histogram.reset();
    }

    /// Logs current metrics at INFO level.
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();

        if snapshot.total_operations() == 0 && snapshot.lock_acquired_count == 0 {
            return;
        }

        tracing::info!(
            store_count = snapshot.store_count,
            load_count = snapshot.load_count,
            delete_count = snapshot.delete_count,
            list_count = snapshot.list_count,
            stat_count = snapshot.stat_count,
            avg_store_latency_us = snapshot.avg_store_latency_us(),
            avg_load_latency_us = snapshot.avg_load_latency_us(),
            load_p99 = snapshot.load_percentiles.p99,
            store_p99 = snapshot.store_percentiles.p99,
            lock_acquired_count = snapshot.lock_acquired_count,
            lock_contended_count = snapshot.lock_contended_count,
            lock_stale_reclaimed_count = snapshot.lock_stale_reclaimed_count,
            lock_wait_p95 = snapshot.lock_wait_percentiles.p95,
            error_count = snapshot.error_count,
            error_rate = snapshot.error_rate(),
            "Storage metrics snapshot"
        );

        if snapshot.error_rate() > 0.05 {
            warn!(
                error_rate = snapshot.error_rate(),
                error_count = snapshot.error_count,
                total_ops = snapshot.total_operations(),
                "High storage error rate detected"
            );
        }

        if snapshot.lock_failure_rate() > 0.10 {
            warn!(
                lock_failure_rate = snapshot.lock_failure_rate(),
                lock_timeout_count = snapshot.lock_timeout_count,
                lock_cancelled_count = snapshot.lock_cancelled_count,
                "High lock failure rate detected"
            );
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Exposes the [`Metrics`] instance of a storage facade.
pub trait MetricsCollector {
    /// Returns a reference to the facade's metrics collector.
    fn metrics(&self) -> &Metrics;
}
