//! Watch groups: the policy engine of the historian.
//!
//! A group owns a set of watches sharing one logging policy, a FIFO buffer
//! of pending updates, and up to two scheduled tasks: a buffer flush that
//! drains the queue into the database, and an interval sampler that
//! snapshots each watch's latest value. Policy edits cancel and restart the
//! tasks under one lock so reconfiguration is observed atomically.

mod queue;
mod settings;

pub use queue::WatchUpdate;
pub use settings::{LoggingType, WatchGroupSettings};

use crate::database::{Database, DatabaseProvider};
use crate::error::{HistorianError, Result};
use crate::path_utils::decode_node_name;
use crate::subscription::SubscriptionPool;
use crate::value::{value_changed, QueryData, SubscriptionUpdate};
use crate::watch::Watch;
use chrono::Utc;
use queue::UpdateQueue;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

impl std::fmt::Debug for WatchGroup {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WatchGroup").field("name", &self.name).finish()
	}
}

pub struct WatchGroup {
	name: String,
	db: Arc<dyn Database>,
	pool: Arc<SubscriptionPool>,
	provider: Weak<dyn DatabaseProvider>,

	settings: RwLock<Arc<WatchGroupSettings>>,
	queue: UpdateQueue,
	watches: RwLock<Vec<Arc<Watch>>>,

	/// Serializes reconfiguration: both task handles are swapped under it.
	reconfigure_lock: tokio::sync::Mutex<()>,
	/// Serializes queue drains so a batch is written FIFO end to end.
	drain_lock: tokio::sync::Mutex<()>,
	flush_task: Mutex<Option<JoinHandle<()>>>,
	interval_task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchGroup {
	pub fn new(
		name: impl Into<String>, db: Arc<dyn Database>, pool: Arc<SubscriptionPool>,
		provider: Weak<dyn DatabaseProvider>, settings: WatchGroupSettings,
	) -> Arc<Self> {
		Arc::new(Self {
			name: name.into(),
			db,
			pool,
			provider,
			settings: RwLock::new(Arc::new(settings.sanitized())),
			queue: UpdateQueue::default(),
			watches: RwLock::new(Vec::new()),
			reconfigure_lock: tokio::sync::Mutex::new(()),
			drain_lock: tokio::sync::Mutex::new(()),
			flush_task: Mutex::new(None),
			interval_task: Mutex::new(None),
		})
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Watches should never write to the database directly unless absolutely
	/// necessary; queries go through here.
	pub fn db(&self) -> &Arc<dyn Database> {
		&self.db
	}

	pub fn pool(&self) -> &Arc<SubscriptionPool> {
		&self.pool
	}

	pub fn provider(&self) -> Option<Arc<dyn DatabaseProvider>> {
		self.provider.upgrade()
	}

	/// The current policy snapshot.
	pub fn settings(&self) -> Arc<WatchGroupSettings> {
		self.settings.read().unwrap().clone()
	}

	pub fn watches(&self) -> Vec<Arc<Watch>> {
		self.watches.read().unwrap().clone()
	}

	pub fn watch(&self, path: &str) -> Option<Arc<Watch>> {
		self.watches
			.read()
			.unwrap()
			.iter()
			.find(|w| w.path() == path)
			.cloned()
	}

	pub fn queue_len(&self) -> usize {
		self.queue.len()
	}

	/// Whether `on_data` should feed the policy engine immediately. In
	/// INTERVAL mode updates wait for the sampler instead.
	pub fn can_write_on_new_data(&self) -> bool {
		self.settings().logging_type != LoggingType::Interval
	}

	fn is_buffering(&self) -> bool {
		self.flush_task.lock().unwrap().is_some()
	}

	/// Add a watch for the given raw node name (bus path escapes are decoded
	/// exactly once here).
	pub async fn add_watch_path(self: &Arc<Self>, raw_name: &str) -> Result<Arc<Watch>> {
		if raw_name.trim().is_empty() {
			return Err(HistorianError::InvalidPath { path: raw_name.to_string() });
		}
		let path = decode_node_name(raw_name);
		let watch = Watch::new(Arc::downgrade(self), path);
		self.watches.write().unwrap().push(watch.clone());
		self.pool.subscribe(watch.path(), &watch).await?;
		if let Some(provider) = self.provider.upgrade() {
			provider.on_watch_added(&watch);
		}
		if let Err(e) = watch.add_get_history_alias().await {
			warn!(path = watch.path(), error = %e, "failed to write getHistory alias");
		}
		self.start_interval_sampler_if_needed();
		info!(group = %self.name, path = watch.path(), "watch added");
		Ok(watch)
	}

	pub(crate) fn remove_from_watches(&self, watch: &Arc<Watch>) {
		self.watches.write().unwrap().retain(|w| w.id() != watch.id());
	}

	/// Rebuild the `@@getHistory` alias on every watch in the group.
	pub async fn restore_get_history_aliases(&self) {
		for watch in self.watches() {
			if let Err(e) = watch.add_get_history_alias().await {
				warn!(path = watch.path(), error = %e, "failed to restore getHistory alias");
			}
		}
	}

	/// Apply the group's logging policy to one update and persist it if the
	/// policy says so.
	pub async fn write(&self, watch: &Arc<Watch>, update: SubscriptionUpdate) {
		let settings = self.settings();
		let do_write = match settings.logging_type {
			LoggingType::AllData => true,
			LoggingType::Interval => false,
			LoggingType::PointChange => {
				let changed = value_changed(watch.last_value().as_ref(), update.value.as_ref());
				if changed {
					watch.set_last_value(update.value.clone());
				}
				changed
			}
		};
		if !do_write {
			return;
		}

		let pending = WatchUpdate::new(watch.clone(), update);
		if self.is_buffering() {
			self.queue.push(pending);
			return;
		}
		// No flush task: older queued updates must reach the database before
		// this one.
		if !self.queue.is_empty() {
			self.handle_queue().await;
		}
		self.db_write(&pending).await;
		if let Some(value) = pending.update.value.as_ref() {
			watch.handle_last_written(value);
		}
	}

	/// Drain the queue: read the size once, write that many rows, and report
	/// only the batch tail through `handle_last_written`.
	async fn handle_queue(&self) {
		let _guard = self.drain_lock.lock().await;
		let size = self.queue.len();
		let mut tail: Option<WatchUpdate> = None;
		for _ in 0..size {
			let Some(update) = self.queue.pop() else {
				break;
			};
			self.db_write(&update).await;
			tail = Some(update);
		}
		if let Some(update) = tail {
			if let Some(value) = update.update.value.as_ref() {
				update.watch.handle_last_written(value);
			}
		}
	}

	/// Persist one update. A null value is discarded silently; a database
	/// failure is logged and the update lost. On success the watch's
	/// real-time handlers see the written row.
	async fn db_write(&self, update: &WatchUpdate) {
		let Some(value) = update.update.value.as_ref() else {
			return;
		};
		let timestamp = if self.settings().logging_type == LoggingType::Interval {
			update.interval_timestamp
		} else {
			value.timestamp()
		};
		let watch = &update.watch;
		match self.db.write(watch.path(), value, timestamp).await {
			Ok(()) => {
				watch.notify_handlers(&QueryData { value: value.clone(), timestamp });
			}
			Err(e) if e.is_retryable() => {
				warn!(path = watch.path(), error = %e, "transient database failure, update dropped");
			}
			Err(e) => {
				error!(path = watch.path(), error = %e, "database write failed, update dropped");
			}
		}
	}

	/// One sampler tick: enqueue the latest pending update of every enabled
	/// watch, all stamped with the same wall-clock time. The sampler never
	/// writes directly; with buffering disabled the queue is drained right
	/// after enqueueing, since no flush task will come for it.
	async fn sample_tick(&self) {
		let now = Utc::now().timestamp_millis();
		for watch in self.watches() {
			if !watch.is_enabled() {
				continue;
			}
			if let Some(update) = watch.last_watch_update() {
				self.queue.push(WatchUpdate::stamped(watch.clone(), update, now));
			}
		}
		if !self.is_buffering() {
			self.handle_queue().await;
		}
	}

	/// Start whichever scheduled tasks the current policy requires.
	pub fn subscribe(self: &Arc<Self>) {
		self.start_interval_sampler_if_needed();
		self.start_buffer_flush_if_needed();
	}

	fn start_interval_sampler_if_needed(self: &Arc<Self>) {
		let settings = self.settings();
		if settings.logging_type != LoggingType::Interval || settings.interval_seconds <= 0 {
			return;
		}
		let mut slot = self.interval_task.lock().unwrap();
		if slot.is_some() {
			return;
		}
		let period = Duration::from_secs(settings.interval_seconds as u64);
		let group = Arc::downgrade(self);
		debug!(group = %self.name, period_secs = settings.interval_seconds, "starting interval sampler");
		*slot = Some(tokio::spawn(async move {
			let mut ticker = interval(period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			loop {
				ticker.tick().await;
				let Some(group) = group.upgrade() else {
					break;
				};
				group.sample_tick().await;
			}
		}));
	}

	fn start_buffer_flush_if_needed(self: &Arc<Self>) {
		let settings = self.settings();
		if settings.buffer_flush_seconds <= 0 {
			return;
		}
		let mut slot = self.flush_task.lock().unwrap();
		if slot.is_some() {
			return;
		}
		let period = Duration::from_secs(settings.buffer_flush_seconds as u64);
		let group = Arc::downgrade(self);
		debug!(group = %self.name, period_secs = settings.buffer_flush_seconds, "starting buffer flush");
		*slot = Some(tokio::spawn(async move {
			let mut ticker = interval_at(Instant::now() + period, period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			loop {
				ticker.tick().await;
				let Some(group) = group.upgrade() else {
					break;
				};
				group.handle_queue().await;
			}
		}));
	}

	fn cancel_interval_sampler(&self) {
		if let Some(task) = self.interval_task.lock().unwrap().take() {
			task.abort();
		}
	}

	fn cancel_buffer_flush(&self) {
		if let Some(task) = self.flush_task.lock().unwrap().take() {
			task.abort();
		}
	}

	/// Replace the group's policy. Both tasks are cancelled and restarted
	/// under the reconfiguration lock, so after this returns the schedulers
	/// reflect the new parameters. Queued updates survive the edit; the next
	/// flush or direct write drains them in order.
	pub async fn edit_settings(self: &Arc<Self>, settings: WatchGroupSettings) {
		let sanitized = settings.sanitized();
		{
			let _guard = self.reconfigure_lock.lock().await;
			self.cancel_interval_sampler();
			self.cancel_buffer_flush();
			*self.settings.write().unwrap() = Arc::new(sanitized.clone());
			self.start_interval_sampler_if_needed();
			self.start_buffer_flush_if_needed();
		}
		info!(
			group = %self.name,
			logging_type = %sanitized.logging_type,
			buffer_flush_seconds = sanitized.buffer_flush_seconds,
			interval_seconds = sanitized.interval_seconds,
			"group settings updated"
		);
		if let Some(provider) = self.provider.upgrade() {
			provider.persist_group_settings(&self.name, &sanitized).await;
		}
	}

	/// Detach every watch and stop both tasks. In-flight queued updates are
	/// discarded.
	pub async fn unsubscribe(&self) {
		self.cancel_interval_sampler();
		self.cancel_buffer_flush();
		self.queue.clear();
		let watches: Vec<Arc<Watch>> = self.watches.write().unwrap().drain(..).collect();
		for watch in watches {
			if let Err(e) = self.pool.unsubscribe(watch.path(), &watch).await {
				warn!(path = watch.path(), error = %e, "bus unsubscribe failed");
			}
		}
		info!(group = %self.name, "group unsubscribed");
	}

	/// Stop the scheduled work; the queue is left for collection.
	pub fn close(&self) {
		self.cancel_buffer_flush();
		self.cancel_interval_sampler();
	}
}

impl Drop for WatchGroup {
	fn drop(&mut self) {
		if let Some(task) = self.flush_task.lock().unwrap().take() {
			task.abort();
		}
		if let Some(task) = self.interval_task.lock().unwrap().take() {
			task.abort();
		}
	}
}
