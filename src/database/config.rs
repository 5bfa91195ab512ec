//! Configuration for the redb-backed history store.

use std::path::PathBuf;

/// Configuration for database-backed history storage.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	/// Path where the database file will be stored.
	pub database_path: PathBuf,

	/// Maximum size of the database file in bytes (0 = unlimited). Purely
	/// advisory; a warning is logged when the file grows past it.
	pub max_database_size: u64,
}

impl DatabaseConfig {
	/// Configuration rooted at the given database file path.
	pub fn with_path(path: PathBuf) -> Self {
		Self { database_path: path, ..Self::default() }
	}

	/// Validate configuration parameters.
	pub fn validate(&self) -> Result<(), String> {
		if self.database_path.as_os_str().is_empty() {
			return Err("Database path must not be empty".to_string());
		}
		Ok(())
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			database_path: std::env::temp_dir().join("dsa_historian.redb"),
			max_database_size: 0,
		}
	}
}
