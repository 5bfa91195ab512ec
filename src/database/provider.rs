//! Providers own everything the groups look up: the subscription pool, the
//! backing store, and the group registry itself.

use crate::database::{
	config::DatabaseConfig,
	error::{DatabaseError, DatabaseResult},
	redb_database::RedbDatabase,
	tables, Database,
};
use crate::error::{HistorianError, Result};
use crate::group::{WatchGroup, WatchGroupSettings};
use crate::subscription::{SubscriptionBus, SubscriptionPool};
use crate::value::QueryData;
use crate::watch::Watch;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, error, info};

/// Supplies the shared subscription pool and a database per group, and hooks
/// watch creation. A provider must outlive every group it produced.
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
	fn pool(&self) -> &Arc<SubscriptionPool>;

	/// The historian link's own bus path, used to build action aliases.
	fn link_path(&self) -> &str;

	/// Produce the database a new group will write through.
	async fn create_database(&self, group: &str) -> DatabaseResult<Arc<dyn Database>>;

	/// Called for every watch added to any of this provider's groups.
	fn on_watch_added(&self, _watch: &Arc<Watch>) {}

	/// Persist a group's policy so it survives a restart.
	async fn persist_group_settings(&self, _group: &str, _settings: &WatchGroupSettings) {}

	/// Previously persisted policy for a group, if any.
	async fn load_group_settings(&self, _group: &str) -> Option<WatchGroupSettings> {
		None
	}
}

/// redb-backed provider: one database file shared by all groups, one
/// subscription pool shared by all watches.
pub struct RedbProvider {
	history: Arc<RedbDatabase>,
	pool: Arc<SubscriptionPool>,
	link_path: String,
	groups: RwLock<HashMap<String, Arc<WatchGroup>>>,
}

impl RedbProvider {
	pub fn open(
		config: DatabaseConfig, link_path: impl Into<String>, bus: Arc<dyn SubscriptionBus>,
	) -> DatabaseResult<Arc<Self>> {
		let db_path = config.database_path.clone();
		let history = Arc::new(RedbDatabase::open(config)?);
		info!(path = %db_path.display(), "historian database open");
		Ok(Arc::new(Self {
			history,
			pool: Arc::new(SubscriptionPool::new(bus)),
			link_path: link_path.into(),
			groups: RwLock::new(HashMap::new()),
		}))
	}

	/// Create a group, restoring persisted settings when present (the
	/// freshly supplied settings are used, and persisted, otherwise), and
	/// start its scheduled tasks.
	pub async fn add_group(
		self: &Arc<Self>, name: &str, settings: WatchGroupSettings,
	) -> Result<Arc<WatchGroup>> {
		if self.groups.read().unwrap().contains_key(name) {
			return Err(HistorianError::GroupExists { name: name.to_string() });
		}
		let settings = match self.load_group_settings(name).await {
			Some(restored) => restored,
			None => settings.sanitized(),
		};
		let db = self.create_database(name).await?;
		let provider: Arc<dyn DatabaseProvider> = self.clone();
		let provider: Weak<dyn DatabaseProvider> = Arc::downgrade(&provider);
		let group = WatchGroup::new(name, db, self.pool.clone(), provider, settings.clone());
		{
			let mut groups = self.groups.write().unwrap();
			if groups.contains_key(name) {
				return Err(HistorianError::GroupExists { name: name.to_string() });
			}
			groups.insert(name.to_string(), group.clone());
		}
		self.persist_group_settings(name, &settings).await;
		group.subscribe();
		info!(group = name, "watch group created");
		Ok(group)
	}

	pub fn group(&self, name: &str) -> Result<Arc<WatchGroup>> {
		self.groups
			.read()
			.unwrap()
			.get(name)
			.cloned()
			.ok_or_else(|| HistorianError::GroupNotFound { name: name.to_string() })
	}

	pub fn groups(&self) -> Vec<Arc<WatchGroup>> {
		self.groups.read().unwrap().values().cloned().collect()
	}

	/// Unsubscribe and drop a group (the `delete` action).
	pub async fn remove_group(&self, name: &str) -> Result<()> {
		let group = self
			.groups
			.write()
			.unwrap()
			.remove(name)
			.ok_or_else(|| HistorianError::GroupNotFound { name: name.to_string() })?;
		group.unsubscribe().await;
		info!(group = name, "watch group deleted");
		Ok(())
	}

	/// Range-query the history of a watched path (the `getHistory` action).
	/// The path must belong to a watch of the named group.
	pub async fn get_history(
		&self, group: &str, path: &str, from: i64, to: i64,
	) -> Result<Vec<QueryData>> {
		let group = self.group(group)?;
		if group.watch(path).is_none() {
			return Err(HistorianError::WatchNotFound { path: path.to_string() });
		}
		Ok(crate::history::get_history(group.db().as_ref(), path, from, to).await?)
	}
}

#[async_trait]
impl DatabaseProvider for RedbProvider {
	fn pool(&self) -> &Arc<SubscriptionPool> {
		&self.pool
	}

	fn link_path(&self) -> &str {
		&self.link_path
	}

	async fn create_database(&self, _group: &str) -> DatabaseResult<Arc<dyn Database>> {
		// All groups share the provider's history store; per-path keys keep
		// their rows apart.
		Ok(self.history.clone())
	}

	fn on_watch_added(&self, watch: &Arc<Watch>) {
		debug!(path = watch.path(), "watch registered with provider");
	}

	async fn persist_group_settings(&self, group: &str, settings: &WatchGroupSettings) {
		let bytes = match serde_json::to_vec(settings) {
			Ok(bytes) => bytes,
			Err(e) => {
				error!(group, error = %e, "failed to encode group settings");
				return;
			}
		};
		let database = self.history.raw_database();
		let result: DatabaseResult<()> = (|| {
			let write_txn = database.begin_write()?;
			{
				let mut table = write_txn.open_table(tables::GROUPS_TABLE)?;
				table.insert(group, bytes.as_slice())?;
			}
			write_txn.commit()?;
			Ok(())
		})();
		if let Err(e) = result {
			error!(group, error = %e, "failed to persist group settings");
		}
	}

	async fn load_group_settings(&self, group: &str) -> Option<WatchGroupSettings> {
		let database = self.history.raw_database();
		let result: DatabaseResult<Option<WatchGroupSettings>> = (|| {
			let read_txn = database.begin_read()?;
			let table = read_txn.open_table(tables::GROUPS_TABLE)?;
			let Some(bytes) = table.get(group)? else {
				return Ok(None);
			};
			serde_json::from_slice(bytes.value())
				.map(Some)
				.map_err(|e| DatabaseError::Deserialization(e.to_string()))
		})();
		match result {
			Ok(settings) => settings,
			Err(e) => {
				error!(group, error = %e, "failed to load group settings");
				None
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::group::LoggingType;
	use async_trait::async_trait;
	use tempfile::TempDir;

	struct NoopBus;

	#[async_trait]
	impl SubscriptionBus for NoopBus {
		async fn subscribe(&self, _path: &str) -> Result<()> {
			Ok(())
		}

		async fn unsubscribe(&self, _path: &str) -> Result<()> {
			Ok(())
		}

		async fn set(&self, _path: &str, _value: serde_json::Value) -> Result<()> {
			Ok(())
		}
	}

	fn open_provider(dir: &TempDir) -> Arc<RedbProvider> {
		let config = DatabaseConfig::with_path(dir.path().join("historian.redb"));
		RedbProvider::open(config, "/downstream/history", Arc::new(NoopBus)).unwrap()
	}

	#[tokio::test]
	async fn test_duplicate_group_rejected() {
		let dir = TempDir::new().unwrap();
		let provider = open_provider(&dir);
		provider
			.add_group("g", WatchGroupSettings::default())
			.await
			.unwrap();
		let err = provider
			.add_group("g", WatchGroupSettings::default())
			.await
			.unwrap_err();
		assert!(matches!(err, HistorianError::GroupExists { .. }));
	}

	#[tokio::test]
	async fn test_get_history_requires_known_watch() {
		let dir = TempDir::new().unwrap();
		let provider = open_provider(&dir);
		provider
			.add_group("g", WatchGroupSettings::default())
			.await
			.unwrap();

		let err = provider.get_history("g", "/unknown", 0, 100).await.unwrap_err();
		assert!(matches!(err, HistorianError::WatchNotFound { .. }));

		let err = provider.get_history("missing", "/p", 0, 100).await.unwrap_err();
		assert!(matches!(err, HistorianError::GroupNotFound { .. }));
	}

	#[tokio::test]
	async fn test_group_settings_survive_reopen() {
		let dir = TempDir::new().unwrap();
		let edited = WatchGroupSettings {
			buffer_flush_seconds: 0,
			logging_type: LoggingType::PointChange,
			interval_seconds: 60,
		};
		{
			let provider = open_provider(&dir);
			let group = provider
				.add_group("g", WatchGroupSettings::default())
				.await
				.unwrap();
			group.edit_settings(edited.clone()).await;
		}
		let provider = open_provider(&dir);
		let group = provider
			.add_group("g", WatchGroupSettings::default())
			.await
			.unwrap();
		assert_eq!(*group.settings(), edited);
	}
}
