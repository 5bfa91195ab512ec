//! Per-path ingestion sink.
//!
//! A watch receives every subscription update for one bus path, feeds its
//! group's policy engine, remembers the markers the UI reports (first and
//! last written time, last written value) and fans written rows out to
//! real-time listeners.

use crate::error::Result;
use crate::group::WatchGroup;
use crate::path_utils::encode_watch_path;
use crate::value::{QueryData, SubscriptionUpdate, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use tracing::{error, warn};
use uuid::Uuid;

/// A real-time listener notified after each database write for a watch.
pub trait QueryDataHandler: Send + Sync {
	fn handle(&self, data: &QueryData);
}

/// Token returned from [`Watch::add_handler`]; pass it back to
/// [`Watch::remove_handler`] to cancel the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

impl std::fmt::Debug for Watch {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Watch").field("id", &self.id).field("path", &self.path).finish()
	}
}

pub struct Watch {
	id: Uuid,
	/// Decoded bus path (escape sequences applied exactly once, by the group).
	path: String,
	group: Weak<WatchGroup>,
	enabled: AtomicBool,

	/// Most recent value seen on the bus, written or not.
	last_seen: Mutex<Option<Value>>,
	/// Change-detection marker for POINT_CHANGE; owned by the group policy.
	last_value: Mutex<Option<Value>>,
	/// Most recent update pending the next interval tick.
	last_watch_update: Mutex<Option<SubscriptionUpdate>>,

	last_written_value: Mutex<Option<Value>>,
	last_written_time: Mutex<Option<i64>>,
	start_date: OnceLock<i64>,
	end_date: Mutex<Option<i64>>,

	rt_handlers: RwLock<Vec<(u64, Arc<dyn QueryDataHandler>)>>,
	next_handler_id: AtomicU64,
}

impl Watch {
	pub fn new(group: Weak<WatchGroup>, path: String) -> Arc<Self> {
		Arc::new(Self {
			id: Uuid::new_v4(),
			path,
			group,
			enabled: AtomicBool::new(true),
			last_seen: Mutex::new(None),
			last_value: Mutex::new(None),
			last_watch_update: Mutex::new(None),
			last_written_value: Mutex::new(None),
			last_written_time: Mutex::new(None),
			start_date: OnceLock::new(),
			end_date: Mutex::new(None),
			rt_handlers: RwLock::new(Vec::new()),
			next_handler_id: AtomicU64::new(0),
		})
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::SeqCst)
	}

	/// Called by the pool for every update delivered on this watch's path.
	pub async fn on_data(self: &Arc<Self>, update: SubscriptionUpdate) {
		*self.last_seen.lock().unwrap() = update.value.clone();
		let Some(group) = self.group.upgrade() else {
			return;
		};
		if group.can_write_on_new_data() {
			group.write(self, update).await;
		} else {
			*self.last_watch_update.lock().unwrap() = Some(update);
		}
	}

	/// Toggle the pool subscription for this watch. Idempotent at the pool.
	pub async fn set_enabled(self: &Arc<Self>, enabled: bool) -> Result<()> {
		self.enabled.store(enabled, Ordering::SeqCst);
		let Some(group) = self.group.upgrade() else {
			return Ok(());
		};
		if enabled {
			group.pool().subscribe(&self.path, self).await
		} else {
			group.pool().unsubscribe(&self.path, self).await
		}
	}

	/// Detach from the group and the pool.
	pub async fn unsubscribe(self: &Arc<Self>) {
		let Some(group) = self.group.upgrade() else {
			return;
		};
		group.remove_from_watches(self);
		if let Err(e) = group.pool().unsubscribe(&self.path, self).await {
			warn!(path = %self.path, error = %e, "bus unsubscribe failed");
		}
	}

	/// The update the interval sampler should enqueue on the next tick, if
	/// any. Falls back to the last value seen on the bus so a value that
	/// arrived before the sampler started is still captured.
	pub fn last_watch_update(&self) -> Option<SubscriptionUpdate> {
		let mut pending = self.last_watch_update.lock().unwrap();
		if pending.is_none() {
			if let Some(value) = self.last_seen.lock().unwrap().clone() {
				*pending = Some(SubscriptionUpdate::new(self.path.clone(), Some(value)));
			}
		}
		pending.clone()
	}

	pub fn last_value(&self) -> Option<Value> {
		self.last_value.lock().unwrap().clone()
	}

	pub(crate) fn set_last_value(&self, value: Option<Value>) {
		*self.last_value.lock().unwrap() = value;
	}

	/// Called by the group after a successful write. Sets the start date
	/// exactly once and moves the end date forward to the value's timestamp.
	pub fn handle_last_written(&self, value: &Value) {
		let time = value.timestamp();
		*self.last_written_value.lock().unwrap() = Some(value.clone());
		let _ = self.start_date.set(time);
		*self.end_date.lock().unwrap() = Some(time);
		*self.last_written_time.lock().unwrap() = Some(time);
	}

	pub fn last_written_value(&self) -> Option<Value> {
		self.last_written_value.lock().unwrap().clone()
	}

	pub fn last_written_time(&self) -> Option<i64> {
		*self.last_written_time.lock().unwrap()
	}

	pub fn start_date(&self) -> Option<i64> {
		self.start_date.get().copied()
	}

	pub fn end_date(&self) -> Option<i64> {
		*self.end_date.lock().unwrap()
	}

	/// Register a real-time listener; the returned token cancels it.
	pub fn add_handler(&self, handler: Arc<dyn QueryDataHandler>) -> HandlerId {
		let id = self.next_handler_id.fetch_add(1, Ordering::SeqCst);
		self.rt_handlers.write().unwrap().push((id, handler));
		HandlerId(id)
	}

	pub fn remove_handler(&self, id: HandlerId) {
		self.rt_handlers
			.write()
			.unwrap()
			.retain(|(handler_id, _)| *handler_id != id.0);
	}

	/// Fan a written row out to every registered listener.
	///
	/// The handler list is copied under the read lock and invoked outside it,
	/// so a handler may re-enter `add_handler`/`remove_handler` on the same
	/// watch. A panicking handler is isolated; the rest still run.
	pub fn notify_handlers(&self, data: &QueryData) {
		let handlers: Vec<Arc<dyn QueryDataHandler>> = {
			let guard = self.rt_handlers.read().unwrap();
			guard.iter().map(|(_, h)| h.clone()).collect()
		};
		for handler in handlers {
			if catch_unwind(AssertUnwindSafe(|| handler.handle(data))).is_err() {
				error!(path = %self.path, "real-time handler panicked");
			}
		}
	}

	/// Write the `@@getHistory` alias next to the watched path so bus
	/// clients can reach this watch's history action.
	pub async fn add_get_history_alias(&self) -> Result<()> {
		let Some(group) = self.group.upgrade() else {
			return Ok(());
		};
		let Some(provider) = group.provider() else {
			return Ok(());
		};
		let payload = crate::history::get_history_alias(
			provider.link_path(),
			group.name(),
			&encode_watch_path(&self.path),
		);
		let alias_path = format!("{}/@@getHistory", self.path);
		group.pool().bus().set(&alias_path, payload).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::ValueData;
	use std::sync::atomic::AtomicUsize;

	struct Recording {
		calls: AtomicUsize,
	}

	impl QueryDataHandler for Recording {
		fn handle(&self, _data: &QueryData) {
			self.calls.fetch_add(1, Ordering::SeqCst);
		}
	}

	struct Panicking;

	impl QueryDataHandler for Panicking {
		fn handle(&self, _data: &QueryData) {
			panic!("boom");
		}
	}

	fn detached(path: &str) -> Arc<Watch> {
		Watch::new(Weak::new(), path.to_string())
	}

	fn row(n: f64, t: i64) -> QueryData {
		QueryData { value: Value::new(ValueData::Number(n), t), timestamp: t }
	}

	#[test]
	fn test_handle_last_written_sets_start_date_once() {
		let watch = detached("/p");
		assert_eq!(watch.start_date(), None);

		watch.handle_last_written(&Value::new(ValueData::Number(1.0), 100));
		assert_eq!(watch.start_date(), Some(100));
		assert_eq!(watch.end_date(), Some(100));

		watch.handle_last_written(&Value::new(ValueData::Number(2.0), 300));
		assert_eq!(watch.start_date(), Some(100));
		assert_eq!(watch.end_date(), Some(300));
		assert_eq!(watch.last_written_time(), Some(300));
		assert_eq!(
			watch.last_written_value(),
			Some(Value::new(ValueData::Number(2.0), 300))
		);
	}

	#[test]
	fn test_handler_registration_and_removal() {
		let watch = detached("/p");
		let recording = Arc::new(Recording { calls: AtomicUsize::new(0) });

		let id = watch.add_handler(recording.clone());
		watch.notify_handlers(&row(1.0, 100));
		assert_eq!(recording.calls.load(Ordering::SeqCst), 1);

		watch.remove_handler(id);
		watch.notify_handlers(&row(2.0, 200));
		assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_panicking_handler_does_not_block_others() {
		let watch = detached("/p");
		let recording = Arc::new(Recording { calls: AtomicUsize::new(0) });
		watch.add_handler(Arc::new(Panicking));
		watch.add_handler(recording.clone());

		watch.notify_handlers(&row(1.0, 100));
		assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_last_watch_update_falls_back_to_last_seen() {
		let watch = detached("/p");
		assert!(watch.last_watch_update().is_none());

		// No group attached, so the update is only recorded as last-seen.
		let value = Value::new(ValueData::Number(7.0), 100);
		watch
			.on_data(SubscriptionUpdate::new("/p", Some(value.clone())))
			.await;

		let pending = watch.last_watch_update().expect("fallback update");
		assert_eq!(pending.value, Some(value));
	}
}
