//! LSMKV - Performance Benchmarks
//! Measures throughput of core engine operations using Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lsmkv::engine::memtable::MemTable;
use lsmkv::engine::rbtree::RbTree;
use lsmkv::engine::wal::Wal;
use lsmkv::types::Entry;
use lsmkv::{Config, LsmTree};

fn filled_memtable(n: usize) -> MemTable {
    let mut table = MemTable::new(usize::MAX);
    for i in 0..n {
        let key = format!("key_{:06}", i).into_bytes();
        let value = format!("value_{:06}", i).into_bytes();
        table.put(key, Some(value));
    }
    table
}

fn bench_memtable_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("memtable");

    group.bench_function("insert_1000", |b| {
        b.iter(|| black_box(filled_memtable(1000)));
    });

    group.bench_function("get_hit", |b| {
        let table = filled_memtable(1000);
        b.iter(|| {
            let _ = black_box(table.get(b"key_000500"));
        });
    });

    group.bench_function("get_miss", |b| {
        let table = filled_memtable(1000);
        b.iter(|| {
            let _ = black_box(table.get(b"nonexistent_key"));
        });
    });

    group.bench_function("entries_1000", |b| {
        let table = filled_memtable(1000);
        b.iter(|| black_box(table.entries()));
    });

    group.finish();
}

fn bench_rbtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("rbtree");

    group.bench_function("put_del_1000", |b| {
        b.iter(|| {
            let mut tree = RbTree::new();
            for i in 0..1000u32 {
                tree.put(i.to_be_bytes().to_vec(), Some(vec![0u8; 8]));
            }
            for i in (0..1000u32).step_by(2) {
                tree.del(&i.to_be_bytes());
            }
            black_box(tree.len())
        });
    });

    group.bench_function("get_near_min", |b| {
        let mut tree = RbTree::new();
        for i in (0..2000u32).step_by(2) {
            tree.put(i.to_be_bytes().to_vec(), Some(Vec::new()));
        }
        b.iter(|| black_box(tree.get_near_min(&1001u32.to_be_bytes()).is_some()));
    });

    group.finish();
}

fn bench_wal_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("wal");

    group.bench_function("append_100", |b| {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = Wal::open(dir.path(), 16 * 1024 * 1024, false).unwrap();

        b.iter(|| {
            for i in 0..100 {
                let key = format!("key_{:06}", i).into_bytes();
                let value = format!("value_{:06}", i).into_bytes();
                wal.write(black_box(&Entry::put(key, value))).unwrap();
            }
        });
    });

    group.finish();
}

fn bench_engine_e2e(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_e2e");

    for size in [100, 500, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("put_get_cycle", size),
            size,
            |b, &size| {
                b.iter(|| {
                    let dir = tempfile::tempdir().unwrap();
                    let config = Config::new(dir.path())
                        .with_flush_threshold(16 * 1024)
                        .with_sync_writes(false);
                    let tree = LsmTree::open(config).unwrap();

                    for i in 0..size {
                        let key = format!("key_{:06}", i).into_bytes();
                        let value = format!("value_{:06}", i).into_bytes();
                        tree.put(key, value).unwrap();
                    }

                    for i in 0..size {
                        let key = format!("key_{:06}", i);
                        let _ = black_box(tree.get(key.as_bytes()));
                    }
                    tree.close().unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_memtable_operations,
    bench_rbtree,
    bench_wal_operations,
    bench_engine_e2e
);
criterion_main!(benches);
