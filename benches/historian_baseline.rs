//! Historian performance baselines
//!
//! Establishes baseline throughput for the write path (direct and batched)
//! and for range queries over the redb-backed store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dsa_historian::{Database, DatabaseConfig, RedbDatabase, Value, ValueData};
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn bench_direct_writes(c: &mut Criterion) {
	let rt = Runtime::new().unwrap();

	c.bench_function("history_write_single", |b| {
		let temp_dir = TempDir::new().expect("Failed to create temp dir");
		let config = DatabaseConfig::with_path(temp_dir.path().join("bench.redb"));
		let db = RedbDatabase::open(config).unwrap();
		let mut t = 0_i64;

		b.iter(|| {
			rt.block_on(async {
				t += 1;
				let value = Value::new(ValueData::Number(t as f64), t);
				db.write(black_box("/bench/value"), &value, t).await.unwrap();
			})
		})
	});
}

fn bench_range_query(c: &mut Criterion) {
	let rt = Runtime::new().unwrap();

	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let config = DatabaseConfig::with_path(temp_dir.path().join("bench.redb"));
	let db = RedbDatabase::open(config).unwrap();
	rt.block_on(async {
		for t in 0..1_000_i64 {
			let value = Value::new(ValueData::Number(t as f64), t);
			db.write("/bench/value", &value, t).await.unwrap();
		}
	});

	c.bench_function("history_query_1k_rows", |b| {
		b.iter(|| {
			rt.block_on(async {
				let rows =
					dsa_historian::get_history(&db, black_box("/bench/value"), 0, 1_000).await.unwrap();
				assert_eq!(rows.len(), 1_000);
			})
		})
	});
}

criterion_group!(benches, bench_direct_writes, bench_range_query);
criterion_main!(benches);
