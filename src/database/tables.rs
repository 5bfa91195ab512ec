//! Table definitions for redb storage.
//!
//! Centralizing table definitions here ensures consistency and makes schema
//! evolution easier.

use crate::database::error::DatabaseResult;
use redb::{Database, TableDefinition};
use std::sync::Arc;

/// History rows.
///
/// Key layout (big-endian, lexicographically ordered):
///   - bytes 0..8   path hash (u64)
///   - bytes 8..16  order-preserving timestamp (see [`encode_timestamp`])
///   - bytes 16..24 global write sequence (u64)
///
/// The value is a JSON-encoded [`HistoryRow`](crate::database::redb_database::HistoryRow);
/// it carries the full path so hash collisions can be filtered out on read.
pub const HISTORY_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("history");

/// Persisted watch group settings (group name -> JSON settings).
pub const GROUPS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("watch_groups");

/// Store-level counters (see key constants below).
pub const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key for the next global write sequence in META_TABLE.
// Incremented transactionally with every history insert so that rows written
// in the same millisecond keep their order across restarts.
pub const WRITE_SEQUENCE_KEY: &str = "write_sequence";

/// Schema version for migration tracking.
pub const SCHEMA_VERSION: u32 = 1;

/// Initialize all database tables.
pub fn initialize_tables(database: &Arc<Database>) -> DatabaseResult<()> {
	let write_txn = database.begin_write()?;
	{
		let _history_table = write_txn.open_table(HISTORY_TABLE)?;
		let _groups_table = write_txn.open_table(GROUPS_TABLE)?;
		let _meta_table = write_txn.open_table(META_TABLE)?;
	}
	write_txn.commit()?;
	Ok(())
}

/// Map an epoch-millisecond timestamp onto `u64` so that byte-wise key order
/// matches numeric order, including pre-epoch (negative) times.
pub fn encode_timestamp(timestamp: i64) -> u64 {
	(timestamp as u64) ^ (1 << 63)
}

pub fn decode_timestamp(encoded: u64) -> i64 {
	(encoded ^ (1 << 63)) as i64
}

/// Hash a watched path for key prefixing.
pub fn path_hash(path: &str) -> u64 {
	use std::collections::hash_map::DefaultHasher;
	use std::hash::{Hash, Hasher};

	let mut hasher = DefaultHasher::new();
	path.hash(&mut hasher);
	hasher.finish()
}
