//! Benchmarks for arena borrow and bulk release.

#![allow(clippy::unwrap_used, missing_docs)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use sqlsession_pool::{ValueArena, ValuePool};
use sqlsession_types::{SqlValue, ValueKind};

/// Borrow `n` slots of mixed kinds then clear, with a warm pool.
fn bench_acquire_clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_acquire_clear");

    for n in [4usize, 64, 1024] {
        let pool = Arc::new(ValuePool::with_max_idle(4096));
        let mut arena = ValueArena::with_capacity(pool, n);

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                for i in 0..n {
                    let kind = ValueKind::ALL[i % 4];
                    black_box(arena.acquire_kind(kind).unwrap());
                }
                arena.clear();
            })
        });
    }

    group.finish();
}

/// Borrow, scan and clear one row's worth of slots.
fn bench_scan_row(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_scan_row");
    let pool = Arc::new(ValuePool::with_max_idle(4096));
    let mut arena = ValueArena::new(pool);
    let row = [
        SqlValue::Int(42),
        SqlValue::String("alice@example.com".into()),
        SqlValue::Float(12.5),
        SqlValue::Bool(true),
    ];

    group.bench_function("four_columns", |b| {
        b.iter(|| {
            let id = arena.int64().unwrap();
            let email = arena.string().unwrap();
            let score = arena.float64().unwrap();
            let active = arena.bool().unwrap();
            id.scan(black_box(&row[0])).unwrap();
            email.scan(black_box(&row[1])).unwrap();
            score.scan(black_box(&row[2])).unwrap();
            active.scan(black_box(&row[3])).unwrap();
            arena.clear();
        })
    });

    // Baseline without recycling: fresh pool per iteration.
    group.bench_function("four_columns_cold", |b| {
        b.iter(|| {
            let mut arena = ValueArena::new(Arc::new(ValuePool::with_max_idle(0)));
            let id = arena.int64().unwrap();
            id.scan(black_box(&row[0])).unwrap();
            black_box(arena.string().unwrap());
            black_box(arena.float64().unwrap());
            black_box(arena.bool().unwrap());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_acquire_clear, bench_scan_row);

criterion_main!(benches);
