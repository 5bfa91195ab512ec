//! FIFO buffer between policy decisions and database writes.

use crate::value::SubscriptionUpdate;
use crate::watch::Watch;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One update waiting in a group's buffer.
#[derive(Clone)]
pub struct WatchUpdate {
	pub watch: Arc<Watch>,
	pub update: SubscriptionUpdate,
	/// Wall-clock stamp applied at enqueue time by the interval sampler; it
	/// overrides the value's own timestamp at write time in INTERVAL mode.
	/// Zero when the update did not come from the sampler.
	pub interval_timestamp: i64,
}

impl WatchUpdate {
	pub fn new(watch: Arc<Watch>, update: SubscriptionUpdate) -> Self {
		Self { watch, update, interval_timestamp: 0 }
	}

	pub fn stamped(watch: Arc<Watch>, update: SubscriptionUpdate, timestamp: i64) -> Self {
		Self { watch, update, interval_timestamp: timestamp }
	}
}

/// Multi-producer FIFO of pending updates.
#[derive(Default)]
pub(crate) struct UpdateQueue {
	inner: Mutex<VecDeque<WatchUpdate>>,
}

impl UpdateQueue {
	pub fn push(&self, update: WatchUpdate) {
		self.inner.lock().unwrap().push_back(update);
	}

	pub fn pop(&self) -> Option<WatchUpdate> {
		self.inner.lock().unwrap().pop_front()
	}

	pub fn len(&self) -> usize {
		self.inner.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.lock().unwrap().is_empty()
	}

	pub fn clear(&self) {
		self.inner.lock().unwrap().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::{Value, ValueData};
	use std::sync::Weak;

	fn update(n: f64) -> WatchUpdate {
		let watch = Watch::new(Weak::new(), "/p".to_string());
		WatchUpdate::new(
			watch,
			SubscriptionUpdate::new("/p", Some(Value::new(ValueData::Number(n), n as i64))),
		)
	}

	#[test]
	fn test_queue_is_fifo() {
		let queue = UpdateQueue::default();
		for n in 0..5 {
			queue.push(update(n as f64));
		}
		assert_eq!(queue.len(), 5);

		let mut drained = Vec::new();
		while let Some(u) = queue.pop() {
			drained.push(u.update.value.unwrap().timestamp());
		}
		assert_eq!(drained, vec![0, 1, 2, 3, 4]);
		assert!(queue.is_empty());
	}

	#[test]
	fn test_clear_discards_in_flight_updates() {
		let queue = UpdateQueue::default();
		queue.push(update(1.0));
		queue.push(update(2.0));
		queue.clear();
		assert!(queue.pop().is_none());
	}
}
