//! Error types for database operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
	#[error("Database initialization failed: {0}")]
	InitializationFailed(String),

	#[error("Serialization error: {0}")]
	Serialization(String),

	#[error("Deserialization error: {0}")]
	Deserialization(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("redb database error: {0}")]
	RedbError(#[from] redb::Error),

	#[error("redb transaction error: {0}")]
	RedbTransactionError(#[from] redb::TransactionError),

	#[error("redb commit error: {0}")]
	RedbCommitError(#[from] redb::CommitError),

	#[error("redb table error: {0}")]
	RedbTableError(#[from] redb::TableError),

	#[error("redb storage error: {0}")]
	RedbStorageError(#[from] redb::StorageError),

	#[error("Invalid configuration: {0}")]
	InvalidConfiguration(String),
}

impl DatabaseError {
	/// Check if this error indicates that the operation should be retried
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			DatabaseError::IoError(_)
				| DatabaseError::RedbTransactionError(_)
				| DatabaseError::RedbCommitError(_)
		)
	}

	/// Check if this error indicates stored data cannot be trusted
	pub fn is_corruption(&self) -> bool {
		matches!(
			self,
			DatabaseError::Deserialization(_)
				| DatabaseError::RedbStorageError(redb::StorageError::Corrupted(_))
		)
	}
}

impl From<redb::DatabaseError> for DatabaseError {
	fn from(e: redb::DatabaseError) -> Self {
		DatabaseError::RedbError(redb::Error::from(e))
	}
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_categorization() {
		let io_error = DatabaseError::IoError(std::io::Error::new(
			std::io::ErrorKind::TimedOut,
			"timed out",
		));
		assert!(io_error.is_retryable());
		assert!(!io_error.is_corruption());

		let decode_error = DatabaseError::Deserialization("bad row".to_string());
		assert!(!decode_error.is_retryable());
		assert!(decode_error.is_corruption());

		let config_error = DatabaseError::InvalidConfiguration("empty path".to_string());
		assert!(!config_error.is_retryable());
		assert!(!config_error.is_corruption());
	}

	#[test]
	fn test_error_display() {
		let error = DatabaseError::InitializationFailed("test failure".to_string());
		let display = format!("{}", error);
		assert!(display.contains("Database initialization failed"));
		assert!(display.contains("test failure"));
	}
}
