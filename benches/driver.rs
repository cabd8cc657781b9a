//! Caching driver benchmarks.
//!
//! Run with: cargo bench --bench driver

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rowcache::{
  CachingDriver, DefaultKeyDeriver, Driver, DriverConfig, KeyDeriver, QueryContext, SqliteDriver,
  Value,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn create_runtime() -> Runtime {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
}

async fn seeded_sqlite(rows: usize) -> SqliteDriver {
  let driver = SqliteDriver::in_memory().await.unwrap();
  driver
    .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age REAL)")
    .await
    .unwrap();
  for i in 0..rows {
    driver
      .exec(
        &mut QueryContext::new(),
        "INSERT INTO users (name, age) VALUES (?1, ?2)",
        &[Value::from(format!("user{}", i)), Value::from(20.0 + i as f64)],
      )
      .await
      .unwrap();
  }
  driver
}

fn bench_query(c: &mut Criterion) {
  let rt = create_runtime();
  let mut group = c.benchmark_group("query");

  for rows in [10usize, 100, 1000] {
    group.throughput(Throughput::Elements(rows as u64));
    let (backend, cached) = rt.block_on(async {
      let backend: Arc<dyn Driver> = Arc::new(seeded_sqlite(rows).await);
      let cached = CachingDriver::new(backend.clone(), DriverConfig::default());
      // warm the entry
      cached
        .query(&mut QueryContext::new(), "SELECT * FROM users", &[])
        .await
        .unwrap()
        .collect_values()
        .await
        .unwrap();
      (backend, cached)
    });

    group.bench_with_input(BenchmarkId::new("backend", rows), &rows, |b, _| {
      b.iter(|| {
        rt.block_on(async {
          let out = backend
            .query(&mut QueryContext::new(), "SELECT * FROM users", &[])
            .await
            .unwrap();
          black_box(out.collect_values().await.unwrap());
        });
      });
    });

    group.bench_with_input(BenchmarkId::new("cache_hit", rows), &rows, |b, _| {
      b.iter(|| {
        rt.block_on(async {
          let out = cached
            .query(&mut QueryContext::new(), "SELECT * FROM users", &[])
            .await
            .unwrap();
          black_box(out.collect_values().await.unwrap());
        });
      });
    });
  }

  group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
  let deriver = DefaultKeyDeriver;
  let args = vec![
    Value::from(42i64),
    Value::from("alice@example.com"),
    Value::from(3.5f64),
    Value::Null,
  ];

  c.bench_function("derive_key", |b| {
    b.iter(|| {
      black_box(
        deriver
          .derive(
            "SELECT id, name FROM users WHERE id = ?1 AND email = ?2 AND score > ?3",
            black_box(&args),
          )
          .unwrap(),
      );
    });
  });
}

criterion_group!(benches, bench_query, bench_key_derivation);
criterion_main!(benches);
