//! Conformance test suite for `MemoryObjectStore`.
//!
//! Each test function corresponds to a single conformance check, providing
//! fine-grained failure reporting. The `run_all` test exercises the full
//! suite as a one-liner to verify no tests are accidentally omitted.

#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use certstore_storage::{MemoryObjectStore, conformance};

const ROOT: &str = "conformance";

// ============================================================================
// Object (7 tests)
// ============================================================================

#[tokio::test]
async fn object_get_missing_is_not_found() {
    conformance::object_get_missing_is_not_found(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn object_put_then_get() {
    conformance::object_put_then_get(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn object_put_overwrites() {
    conformance::object_put_overwrites(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn object_delete_removes() {
    conformance::object_delete_removes(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn object_delete_missing_is_benign() {
    conformance::object_delete_missing_is_benign(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn object_binary_values_preserved() {
    conformance::object_binary_values_preserved(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn object_large_value_roundtrip() {
    conformance::object_large_value_roundtrip(&MemoryObjectStore::new(), ROOT).await;
}

// ============================================================================
// Stat (2 tests)
// ============================================================================

#[tokio::test]
async fn stat_reports_size() {
    conformance::stat_reports_size(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn stat_missing_is_not_found() {
    conformance::stat_missing_is_not_found(&MemoryObjectStore::new(), ROOT).await;
}

// ============================================================================
// Listing (4 tests)
// ============================================================================

#[tokio::test]
async fn list_recursive_returns_all() {
    conformance::list_recursive_returns_all(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn list_respects_directory_boundary() {
    conformance::list_respects_directory_boundary(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn list_non_recursive_groups_common_prefixes() {
    conformance::list_non_recursive_groups_common_prefixes(&MemoryObjectStore::new(), ROOT).await;
}

#[tokio::test]
async fn list_missing_prefix_is_empty() {
    conformance::list_missing_prefix_is_empty(&MemoryObjectStore::new(), ROOT).await;
}

// ============================================================================
// Concurrent (2 tests)
// ============================================================================

#[tokio::test]
async fn concurrent_puts_to_different_names() {
    conformance::concurrent_puts_to_different_names(Arc::new(MemoryObjectStore::new()), ROOT).await;
}

#[tokio::test]
async fn concurrent_reads_return_consistent_value() {
    conformance::concurrent_reads_return_consistent_value(Arc::new(MemoryObjectStore::new()), ROOT).await;
}

// ============================================================================
// Facade (4 tests)
// ============================================================================

#[tokio::test]
async fn facade_encrypted_roundtrip() {
    conformance::facade_encrypted_roundtrip(Arc::new(MemoryObjectStore::new()), ROOT).await;
}

#[tokio::test]
async fn facade_lock_blocks_while_held() {
    conformance::facade_lock_blocks_while_held(Arc::new(MemoryObjectStore::new()), ROOT).await;
}

#[tokio::test]
async fn facade_unlock_admits_waiter() {
    conformance::facade_unlock_admits_waiter(Arc::new(MemoryObjectStore::new()), ROOT).await;
}

#[tokio::test]
async fn facade_list_hides_leases() {
    conformance::facade_list_hides_leases(Arc::new(MemoryObjectStore::new()), ROOT).await;
}

// ============================================================================
// Full suite
// ============================================================================

#[tokio::test]
async fn run_all() {
    conformance::run_all(Arc::new(MemoryObjectStore::new()), ROOT).await;
}
