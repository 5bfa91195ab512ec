//! In-memory history store for tests and ephemeral runs.

use crate::database::{Database, DatabaseResult, QueryRowHandler};
use crate::value::{QueryData, Value};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keeps every row in a per-path vector, in write order.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
	rows: Mutex<HashMap<String, Vec<(Value, i64)>>>,
}

impl MemoryDatabase {
	pub fn new() -> Self {
		Self::default()
	}

	/// All rows stored for a path, in write order.
	pub fn rows(&self, path: &str) -> Vec<(Value, i64)> {
		self.rows
			.lock()
			.unwrap()
			.get(path)
			.cloned()
			.unwrap_or_default()
	}

	/// Total row count across all paths.
	pub fn row_count(&self) -> usize {
		self.rows.lock().unwrap().values().map(Vec::len).sum()
	}
}

#[async_trait]
impl Database for MemoryDatabase {
	async fn write(&self, path: &str, value: &Value, timestamp: i64) -> DatabaseResult<()> {
		self.rows
			.lock()
			.unwrap()
			.entry(path.to_string())
			.or_default()
			.push((value.clone(), timestamp));
		Ok(())
	}

	async fn query(
		&self, path: &str, from: i64, to: i64, handler: &mut dyn QueryRowHandler,
	) -> DatabaseResult<()> {
		let mut selected: Vec<(Value, i64)> = self
			.rows(path)
			.into_iter()
			.filter(|(_, t)| (from..=to).contains(t))
			.collect();
		// Stable sort keeps write order within a millisecond.
		selected.sort_by_key(|(_, t)| *t);
		for (value, timestamp) in selected {
			handler.handle(QueryData { value, timestamp });
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::ValueData;

	#[tokio::test]
	async fn test_memory_query_orders_by_time() {
		let db = MemoryDatabase::new();
		for t in [200_i64, 100, 300] {
			db.write("/p", &Value::new(ValueData::Number(t as f64), t), t)
				.await
				.unwrap();
		}

		let mut times = Vec::new();
		let mut push = |row: QueryData| times.push(row.timestamp);
		db.query("/p", 0, 1_000, &mut push).await.unwrap();
		assert_eq!(times, vec![100, 200, 300]);
	}

	#[tokio::test]
	async fn test_memory_range_bounds_inclusive() {
		let db = MemoryDatabase::new();
		for t in [100_i64, 200, 300] {
			db.write("/p", &Value::new(ValueData::Number(0.0), t), t)
				.await
				.unwrap();
		}

		let mut count = 0;
		let mut push = |_row: QueryData| count += 1;
		db.query("/p", 100, 200, &mut push).await.unwrap();
		assert_eq!(count, 2);
	}
}
