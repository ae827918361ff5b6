//! Performance benchmarks for the cache and message admission.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use courier::{
    CacheConfig, CacheEngine, FileStorage, Message, MessageId, MessageKind, MessageStore,
    MessageStoreConfig, SetOptions, SystemClock, Timestamp, TopicId,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn make_message(id: u64) -> Message {
    Message {
        id: MessageId::from(id),
        topic: TopicId::new("bench").unwrap(),
        sender_id: "u1".to_string(),
        sender_name: "Alice".to_string(),
        content: format!("message body {}", id),
        kind: MessageKind::Text,
        timestamp: Timestamp(id as i64),
    }
}

/// Benchmark reads from caches of varying fill
fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get");

    for size in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("entries", size), &size, |b, &size| {
            let cache = CacheEngine::new(CacheConfig::default().with_max_entries(size));
            for i in 0..size {
                cache
                    .set(&format!("key_{}", i), &json!({ "n": i }), SetOptions::new())
                    .unwrap();
            }

            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % size;
                black_box(cache.get_value(&format!("key_{}", i)));
            });
        });
    }

    group.finish();
}

/// Benchmark inserts into a full cache, each one evicting (linear scan)
fn bench_cache_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_eviction");

    for size in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("capacity", size), &size, |b, &size| {
            let cache = CacheEngine::new(CacheConfig::default().with_max_entries(size));
            for i in 0..size {
                cache.set(&format!("key_{}", i), &i, SetOptions::new()).unwrap();
            }

            let mut next = size;
            b.iter(|| {
                next += 1;
                cache.set(&format!("key_{}", next), &next, SetOptions::new()).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark persistent writes through the file mirror
fn bench_persistent_set(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let cache = CacheEngine::with_storage(CacheConfig::default(), storage, Arc::new(SystemClock));
    let value = json!({ "name": "Alice", "groups": ["g1", "g2", "g3"] });

    let mut i = 0u64;
    c.bench_function("persistent_set", |b| {
        b.iter(|| {
            i += 1;
            cache
                .set(&format!("profile_{}", i % 100), &value, SetOptions::new().persistent())
                .unwrap();
        });
    });
}

/// Benchmark message admission with write-through
fn bench_admit(c: &mut Criterion) {
    let mut group = c.benchmark_group("admit");

    for window in [20, 100] {
        group.bench_with_input(BenchmarkId::new("window", window), &window, |b, &window| {
            let store = MessageStore::new(
                Arc::new(CacheEngine::new(CacheConfig::default())),
                MessageStoreConfig::default().with_window_size(window),
            );

            let mut id = 0u64;
            b.iter(|| {
                id += 1;
                black_box(store.admit(make_message(id)));
            });
        });
    }

    group.finish();
}

/// Benchmark pattern invalidation over a full cache
fn bench_delete_by_pattern(c: &mut Criterion) {
    c.bench_function("delete_by_pattern_500", |b| {
        let cache = CacheEngine::new(CacheConfig::default());
        b.iter(|| {
            for i in 0..500 {
                let key = if i % 2 == 0 { format!("user_{}", i) } else { format!("group_{}", i) };
                cache.set(&key, &i, SetOptions::new()).unwrap();
            }
            black_box(cache.delete_by_pattern("^user_").unwrap());
            cache.clear();
        });
    });
}

criterion_group!(
    benches,
    bench_cache_get,
    bench_cache_eviction,
    bench_persistent_set,
    bench_admit,
    bench_delete_by_pattern,
);
criterion_main!(benches);
