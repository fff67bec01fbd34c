#![allow(clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};

use certstore_storage::{
    CertificateStorage, CancellationToken, MemoryObjectStore, ObjectStorage, SecretBoxCodec,
    testutil::{TEST_ENCRYPTION_KEY, make_key, make_value, memory_storage},
};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const VALUE_SIZES: &[usize] = &[64, 1024, 65_536];

fn rt() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create tokio runtime")
}

/// Creates a facade pre-populated with `count` keys under `dir`, each
/// holding `value_size` bytes.
fn populated_storage(
    rt: &Runtime,
    encryption_key: Option<&str>,
    dir: &str,
    count: usize,
    value_size: usize,
) -> ObjectStorage<MemoryObjectStore> {
    let (_, storage) = memory_storage(encryption_key);
    let value = make_value(value_size);
    rt.block_on(async {
        for i in 0..count {
            storage.store(&make_key(dir, i), &value).await.expect("populate store failed");
        }
    });
    storage
}

fn mode_name(encryption_key: Option<&str>) -> &'static str {
    if encryption_key.is_some() { "encrypted" } else { "clear" }
}

// ---------------------------------------------------------------------------
// 1. codec
// ---------------------------------------------------------------------------

fn codec_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let codec = SecretBoxCodec::new(TEST_ENCRYPTION_KEY.as_bytes()).expect("valid key");

    for &size in VALUE_SIZES {
        let plaintext = make_value(size);
        let sealed = codec.seal(&plaintext).expect("seal failed");
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &plaintext, |b, p| {
            b.iter(|| codec.seal(p).expect("seal failed"));
        });
        group.bench_with_input(BenchmarkId::new("open", size), &sealed, |b, s| {
            b.iter(|| codec.open(s).expect("open failed"));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 2. store / load
// ---------------------------------------------------------------------------

fn value_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_operations");
    let rt = rt();

    for encryption_key in [None, Some(TEST_ENCRYPTION_KEY)] {
        let mode = mode_name(encryption_key);

        for &size in VALUE_SIZES {
            group.throughput(Throughput::Bytes(size as u64));

            let storage = populated_storage(&rt, encryption_key, "load", 1, size);
            let key = make_key("load", 0);
            group.bench_with_input(BenchmarkId::new(format!("load_{mode}"), size), &size, |b, _| {
                b.to_async(&rt).iter(|| {
                    let s = storage.clone();
                    let k = key.clone();
                    async move {
                        s.load(&k).await.expect("load failed");
                    }
                });
            });

            let (_, storage) = memory_storage(encryption_key);
            let counter = AtomicUsize::new(0);
            let value = make_value(size);
            group.bench_with_input(BenchmarkId::new(format!("store_{mode}"), size), &size, |b, _| {
                b.to_async(&rt).iter(|| {
                    let s = storage.clone();
                    let k = make_key("store", counter.fetch_add(1, Ordering::Relaxed));
                    let v = value.clone();
                    async move {
                        s.store(&k, &v).await.expect("store failed");
                    }
                });
            });
        }
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 3. list
// ---------------------------------------------------------------------------

fn list_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_operations");
    let rt = rt();

    for &count in &[10, 100, 1000] {
        let storage = populated_storage(&rt, None, "certificates/example.com", count, 64);
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("recursive", count), &count, |b, &n| {
            b.to_async(&rt).iter(|| {
                let s = storage.clone();
                async move {
                    let keys = s.list("certificates", true).await.expect("list failed");
                    assert_eq!(keys.len(), n);
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("non_recursive", count), &count, |b, _| {
            b.to_async(&rt).iter(|| {
                let s = storage.clone();
                async move {
                    let keys = s.list("certificates", false).await.expect("list failed");
                    assert_eq!(keys.len(), 1);
                }
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// 4. lock / unlock
// ---------------------------------------------------------------------------

fn lock_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_operations");
    let rt = rt();
    let (_, storage) = memory_storage(None);
    let cancel = CancellationToken::new();

    group.bench_function("uncontended_lock_unlock", |b| {
        b.to_async(&rt).iter(|| {
            let s = storage.clone();
            let token = cancel.clone();
            async move {
                s.lock("issue/example.com", &token).await.expect("lock failed");
                s.unlock("issue/example.com").await.expect("unlock failed");
            }
        });
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Group registration
// ---------------------------------------------------------------------------

criterion_group!(benches, codec_operations, value_operations, list_operations, lock_operations);
criterion_main!(benches);
