// Common test utilities for integration tests
// Provides an in-memory provider and a recording bus so group behavior can
// be exercised without a real DSA link or a database file.
#![allow(dead_code)]

use async_trait::async_trait;
use dsa_historian::{
	Database, DatabaseProvider, DatabaseResult, MemoryDatabase, Result, SubscriptionBus,
	SubscriptionPool, SubscriptionUpdate, Value, ValueData, Watch, WatchGroup, WatchGroupSettings,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Records every bus-side call for assertions.
#[derive(Default)]
pub struct RecordingBus {
	pub subscribes: Mutex<Vec<String>>,
	pub unsubscribes: Mutex<Vec<String>>,
	pub sets: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl SubscriptionBus for RecordingBus {
	async fn subscribe(&self, path: &str) -> Result<()> {
		self.subscribes.lock().unwrap().push(path.to_string());
		Ok(())
	}

	async fn unsubscribe(&self, path: &str) -> Result<()> {
		self.unsubscribes.lock().unwrap().push(path.to_string());
		Ok(())
	}

	async fn set(&self, path: &str, value: serde_json::Value) -> Result<()> {
		self.sets.lock().unwrap().push((path.to_string(), value));
		Ok(())
	}
}

/// Provider over a MemoryDatabase with in-memory settings persistence.
pub struct MemoryProvider {
	pool: Arc<SubscriptionPool>,
	db: Arc<MemoryDatabase>,
	bus: Arc<RecordingBus>,
	settings: Mutex<HashMap<String, WatchGroupSettings>>,
}

impl MemoryProvider {
	pub fn new() -> Arc<Self> {
		let bus = Arc::new(RecordingBus::default());
		Arc::new(Self {
			pool: Arc::new(SubscriptionPool::new(bus.clone())),
			db: Arc::new(MemoryDatabase::new()),
			bus,
			settings: Mutex::new(HashMap::new()),
		})
	}

	pub fn db(&self) -> Arc<MemoryDatabase> {
		self.db.clone()
	}

	pub fn bus(&self) -> Arc<RecordingBus> {
		self.bus.clone()
	}

	pub async fn add_group(
		self: &Arc<Self>, name: &str, settings: WatchGroupSettings,
	) -> Arc<WatchGroup> {
		let provider: Arc<dyn DatabaseProvider> = self.clone();
		let provider: Weak<dyn DatabaseProvider> = Arc::downgrade(&provider);
		let db: Arc<dyn Database> = self.db.clone();
		let group = WatchGroup::new(name, db, self.pool.clone(), provider, settings);
		group.subscribe();
		group
	}
}

#[async_trait]
impl DatabaseProvider for MemoryProvider {
	fn pool(&self) -> &Arc<SubscriptionPool> {
		&self.pool
	}

	fn link_path(&self) -> &str {
		"/downstream/history"
	}

	async fn create_database(&self, _group: &str) -> DatabaseResult<Arc<dyn Database>> {
		Ok(self.db.clone())
	}

	async fn persist_group_settings(&self, group: &str, settings: &WatchGroupSettings) {
		self.settings
			.lock()
			.unwrap()
			.insert(group.to_string(), settings.clone());
	}

	async fn load_group_settings(&self, group: &str) -> Option<WatchGroupSettings> {
		self.settings.lock().unwrap().get(group).cloned()
	}
}

/// A numeric value with an explicit timestamp.
pub fn num(n: f64, timestamp: i64) -> Value {
	Value::new(ValueData::Number(n), timestamp)
}

/// A subscription update carrying a numeric value.
pub fn update(path: &str, n: f64, timestamp: i64) -> SubscriptionUpdate {
	SubscriptionUpdate::new(path, Some(num(n, timestamp)))
}

/// Numbers stored for a path, in row order.
pub fn stored_numbers(db: &MemoryDatabase, path: &str) -> Vec<(f64, i64)> {
	db.rows(path)
		.into_iter()
		.map(|(value, time)| match value.data() {
			ValueData::Number(n) => (*n, time),
			other => panic!("expected number, got {other:?}"),
		})
		.collect()
}

/// Give spawned group tasks a moment to run.
#[allow(dead_code)]
pub async fn settle() {
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}

#[allow(dead_code)]
pub fn watch_of(group: &WatchGroup, path: &str) -> Arc<Watch> {
	group.watch(path).expect("watch should exist")
}
