//! Benchmarks for the pool checkout and return hot path.
//!
//! All connections come from the in-memory mock backend, so the numbers
//! measure pool bookkeeping rather than I/O.

#![allow(missing_docs, clippy::unwrap_used)]

use std::hint::black_box;
use std::time::Duration;

use connpool::{BoxError, Connection, Pool, PoolConfig};
use connpool_testing::{MockBackend, MockConnection};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn build_pool(rt: &Runtime, min: u32, max: u32, test_on_checkout: bool) -> Pool<MockConnection> {
    let config = PoolConfig::new()
        .min_connections(min)
        .max_connections(max)
        .connection_timeout(Duration::from_secs(30))
        .test_on_checkout(test_on_checkout);
    let backend = MockBackend::default();
    rt.block_on(Pool::new(config, backend.factory())).unwrap()
}

/// Single-task checkout and return of a warm connection.
fn bench_checkout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("checkout");

    for test_on_checkout in [true, false] {
        let pool = build_pool(&rt, 1, 1, test_on_checkout);
        let label = if test_on_checkout { "validated" } else { "unvalidated" };

        group.bench_function(BenchmarkId::new("get_release", label), |b| {
            b.to_async(&rt).iter(|| async {
                let conn = pool.get().await.unwrap();
                black_box(conn.metadata().id);
                conn.release().await;
            })
        });
    }

    let pool = build_pool(&rt, 1, 1, true);
    group.bench_function("try_get", |b| {
        b.to_async(&rt).iter(|| async {
            let conn = pool.try_get().await.unwrap();
            black_box(conn.is_some());
        })
    });

    group.finish();
}

/// `handle` under contention: more concurrent callers than connections.
fn bench_handle_contended(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("handle_contended");

    for callers in [4usize, 16, 64] {
        let pool = build_pool(&rt, 2, 8, true);
        group.throughput(Throughput::Elements(callers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(callers), &callers, |b, &callers| {
            b.to_async(&rt).iter(|| {
                let pool = pool.clone();
                async move {
                    let mut tasks = Vec::with_capacity(callers);
                    for _ in 0..callers {
                        let pool = pool.clone();
                        tasks.push(tokio::spawn(async move {
                            pool.handle(|conn| {
                                Box::pin(async move {
                                    conn.execute(String::new()).await.map_err(BoxError::from)
                                })
                            })
                            .await
                        }));
                    }
                    for task in tasks {
                        task.await.unwrap().unwrap();
                    }
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_checkout, bench_handle_contended);
criterion_main!(benches);
