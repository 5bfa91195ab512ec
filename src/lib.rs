//! Historian for the DSA IoT bus.
//!
//! Watches subscribe to live values on the bus through a shared
//! [`SubscriptionPool`]; each [`WatchGroup`] applies a logging policy
//! (every sample, interval-sampled, or on-change), buffers accepted updates,
//! and flushes them into a [`Database`]. Persisted values are served back as
//! time-range queries and fanned out to real-time listeners.

pub mod database;
pub mod error;
pub mod group;
pub mod history;
pub mod path_utils;
pub mod subscription;
pub mod value;
pub mod watch;

pub use database::{
	Database, DatabaseConfig, DatabaseError, DatabaseProvider, DatabaseResult, MemoryDatabase,
	QueryRowHandler, RedbDatabase, RedbProvider,
};
pub use error::{HistorianError, Result};
pub use group::{LoggingType, WatchGroup, WatchGroupSettings, WatchUpdate};
pub use history::{get_history, get_history_alias};
pub use subscription::{SubscriptionBus, SubscriptionPool};
pub use value::{value_changed, QueryData, SubscriptionUpdate, Value, ValueData};
pub use watch::{HandlerId, QueryDataHandler, Watch};
