//! Subscription multiplexing between the bus and the watches.
//!
//! The bus allows a single live subscription per path; the pool fans each
//! path's updates out to every watch listening on it and keeps the bus-side
//! subscription alive for exactly as long as at least one watch needs it.

use crate::error::Result;
use crate::value::SubscriptionUpdate;
use crate::watch::Watch;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// The historian's view of the DSA link it runs on.
#[async_trait]
pub trait SubscriptionBus: Send + Sync {
	/// Open the single bus-side subscription for a path.
	async fn subscribe(&self, path: &str) -> Result<()>;

	/// Close the bus-side subscription for a path.
	async fn unsubscribe(&self, path: &str) -> Result<()>;

	/// Write a value to an arbitrary bus path (used for the `@@getHistory`
	/// action aliases).
	async fn set(&self, path: &str, value: serde_json::Value) -> Result<()>;
}

/// Gives N watches one shared bus subscription per path.
pub struct SubscriptionPool {
	bus: Arc<dyn SubscriptionBus>,
	watches: Mutex<HashMap<String, HashMap<Uuid, Arc<Watch>>>>,
}

impl SubscriptionPool {
	pub fn new(bus: Arc<dyn SubscriptionBus>) -> Self {
		Self { bus, watches: Mutex::new(HashMap::new()) }
	}

	pub fn bus(&self) -> &Arc<dyn SubscriptionBus> {
		&self.bus
	}

	/// Attach a watch to a path. The first watcher on a path opens the bus
	/// subscription; re-attaching the same watch is idempotent.
	pub async fn subscribe(&self, path: &str, watch: &Arc<Watch>) -> Result<()> {
		let first = {
			let mut watches = self.watches.lock().unwrap();
			let entry = watches.entry(path.to_string()).or_default();
			let was_empty = entry.is_empty();
			entry.insert(watch.id(), watch.clone());
			was_empty
		};
		if first {
			debug!(path, "first watcher on path, subscribing on the bus");
			self.bus.subscribe(path).await?;
		}
		Ok(())
	}

	/// Detach a watch from a path. When the path's watcher set empties, the
	/// bus subscription is closed.
	pub async fn unsubscribe(&self, path: &str, watch: &Arc<Watch>) -> Result<()> {
		let emptied = {
			let mut watches = self.watches.lock().unwrap();
			match watches.get_mut(path) {
				Some(entry) => {
					entry.remove(&watch.id());
					if entry.is_empty() {
						watches.remove(path);
						true
					} else {
						false
					}
				}
				None => false,
			}
		};
		if emptied {
			debug!(path, "last watcher left path, unsubscribing on the bus");
			self.bus.unsubscribe(path).await?;
		}
		Ok(())
	}

	/// Deliver one bus update to every watch attached to its path. Delivery
	/// is sequential per watch; order across watches is unspecified.
	pub async fn dispatch(&self, update: SubscriptionUpdate) {
		let targets: Vec<Arc<Watch>> = {
			let watches = self.watches.lock().unwrap();
			watches
				.get(&update.path)
				.map(|entry| entry.values().cloned().collect())
				.unwrap_or_default()
		};
		for watch in targets {
			watch.on_data(update.clone()).await;
		}
	}

	/// Number of watches currently attached to a path.
	pub fn watcher_count(&self, path: &str) -> usize {
		self.watches
			.lock()
			.unwrap()
			.get(path)
			.map(HashMap::len)
			.unwrap_or(0)
	}
}
