//! redb-backed history store.
//!
//! One history table holds every group's rows; keys are prefixed with the
//! path hash so a range scan serves a single path's time window. A global
//! write sequence, persisted alongside each row, keeps same-millisecond rows
//! in write order across restarts.

use crate::database::{
	config::DatabaseConfig,
	error::{DatabaseError, DatabaseResult},
	tables, Database, QueryRowHandler,
};
use crate::value::{QueryData, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Stored form of one history row.
///
/// The path rides along so reads can reject hash-collided keys.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryRow {
	pub path: String,
	pub value: Value,
}

pub struct RedbDatabase {
	database: Arc<redb::Database>,
	config: DatabaseConfig,
	sequence: AtomicU64,
}

impl RedbDatabase {
	/// Open (or create) the database file named by the configuration.
	pub fn open(config: DatabaseConfig) -> DatabaseResult<Self> {
		config
			.validate()
			.map_err(DatabaseError::InvalidConfiguration)?;
		if let Some(parent) = config.database_path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent)?;
			}
		}
		let database = Arc::new(redb::Database::create(&config.database_path)?);
		tables::initialize_tables(&database)?;
		Self::from_shared(database, config)
	}

	/// Wrap an already-open redb handle. Groups created by one provider all
	/// share the same file.
	pub fn from_shared(
		database: Arc<redb::Database>, config: DatabaseConfig,
	) -> DatabaseResult<Self> {
		let sequence = Self::load_sequence(&database)?;
		debug!(sequence, "opened history store");
		Ok(Self { database, config, sequence: AtomicU64::new(sequence) })
	}

	pub fn raw_database(&self) -> Arc<redb::Database> {
		self.database.clone()
	}

	fn load_sequence(database: &Arc<redb::Database>) -> DatabaseResult<u64> {
		let read_txn = database.begin_read()?;
		let meta = read_txn.open_table(tables::META_TABLE)?;
		Ok(meta
			.get(tables::WRITE_SEQUENCE_KEY)?
			.map(|v| v.value())
			.unwrap_or(0))
	}

	fn history_key(path: &str, timestamp: i64, sequence: u64) -> [u8; 24] {
		let mut key = [0u8; 24];
		key[..8].copy_from_slice(&tables::path_hash(path).to_be_bytes());
		key[8..16].copy_from_slice(&tables::encode_timestamp(timestamp).to_be_bytes());
		key[16..].copy_from_slice(&sequence.to_be_bytes());
		key
	}

	fn check_size_limit(&self) {
		if self.config.max_database_size == 0 {
			return;
		}
		if let Ok(meta) = std::fs::metadata(&self.config.database_path) {
			if meta.len() > self.config.max_database_size {
				warn!(
					size = meta.len(),
					limit = self.config.max_database_size,
					"history database has grown past the configured size limit"
				);
			}
		}
	}
}

#[async_trait]
impl Database for RedbDatabase {
	async fn write(&self, path: &str, value: &Value, timestamp: i64) -> DatabaseResult<()> {
		let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
		let key = Self::history_key(path, timestamp, sequence);
		let row = HistoryRow { path: path.to_string(), value: value.clone() };
		let row_bytes = serde_json::to_vec(&row)
			.map_err(|e| DatabaseError::Serialization(e.to_string()))?;

		let write_txn = self.database.begin_write()?;
		{
			let mut history = write_txn.open_table(tables::HISTORY_TABLE)?;
			history.insert(key.as_slice(), row_bytes.as_slice())?;
			let mut meta = write_txn.open_table(tables::META_TABLE)?;
			meta.insert(tables::WRITE_SEQUENCE_KEY, sequence + 1)?;
		}
		write_txn.commit()?;

		if sequence % 256 == 0 {
			self.check_size_limit();
		}
		Ok(())
	}

	async fn query(
		&self, path: &str, from: i64, to: i64, handler: &mut dyn QueryRowHandler,
	) -> DatabaseResult<()> {
		let start = Self::history_key(path, from, 0);
		let end = Self::history_key(path, to, u64::MAX);

		let read_txn = self.database.begin_read()?;
		let history = read_txn.open_table(tables::HISTORY_TABLE)?;
		for item in history.range(start.as_slice()..=end.as_slice())? {
			let (key, row_bytes) = item?;
			let row: HistoryRow = serde_json::from_slice(row_bytes.value())
				.map_err(|e| DatabaseError::Deserialization(e.to_string()))?;
			if row.path != path {
				// Hash collision with another path in the same key range.
				continue;
			}
			let mut encoded = [0u8; 8];
			encoded.copy_from_slice(&key.value()[8..16]);
			let timestamp = tables::decode_timestamp(u64::from_be_bytes(encoded));
			handler.handle(QueryData { value: row.value, timestamp });
		}
		Ok(())
	}
}
