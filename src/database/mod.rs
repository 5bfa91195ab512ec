//! Persistence layer for watched values.
//!
//! This module defines the append-only [`Database`] contract the ingestion
//! engine writes through, a [`redb`]-backed implementation for durable
//! history, an in-memory implementation for tests, and the
//! [`DatabaseProvider`] that owns the subscription pool and the watch group
//! lifecycle.

pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod redb_database;
pub mod tables;

pub use config::DatabaseConfig;
pub use error::{DatabaseError, DatabaseResult};
pub use memory::MemoryDatabase;
pub use provider::{DatabaseProvider, RedbProvider};
pub use redb_database::RedbDatabase;

use crate::value::{QueryData, Value};
use async_trait::async_trait;

/// Receives one row at a time from a history query, in ascending time order.
pub trait QueryRowHandler: Send {
	fn handle(&mut self, row: QueryData);
}

impl<F: FnMut(QueryData) + Send> QueryRowHandler for F {
	fn handle(&mut self, row: QueryData) {
		self(row)
	}
}

/// Append-only value store the watch groups write through.
///
/// Implementations may batch internally but must preserve per-path write
/// order as observed on a single thread, and must be safe to call from the
/// flush task.
#[async_trait]
pub trait Database: Send + Sync {
	/// Persist one value for a path at the given epoch-millisecond timestamp.
	async fn write(&self, path: &str, value: &Value, timestamp: i64) -> DatabaseResult<()>;

	/// Stream all rows for a path in `[from, to]` (inclusive, epoch millis)
	/// to the handler, ordered by stored timestamp ascending.
	async fn query(
		&self, path: &str, from: i64, to: i64, handler: &mut dyn QueryRowHandler,
	) -> DatabaseResult<()>;
}
