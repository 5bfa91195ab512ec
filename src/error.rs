use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistorianError {
	#[error("Database error: {0}")]
	Database(#[from] crate::database::DatabaseError),

	#[error("Invalid watch path: {path:?}")]
	InvalidPath { path: String },

	#[error("No watch group named {name:?}")]
	GroupNotFound { name: String },

	#[error("No watch for path {path:?}")]
	WatchNotFound { path: String },

	#[error("Watch group {name:?} already exists")]
	GroupExists { name: String },

	#[error("Bus request failed: {0}")]
	Bus(String),
}

pub type Result<T> = std::result::Result<T, HistorianError>;
