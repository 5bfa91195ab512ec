//! Value carriers delivered by the bus and persisted by the historian.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Payload variants a DSA node can expose.
///
/// Equality is structural; it drives the POINT_CHANGE logging decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ValueData {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	/// Arbitrary structured data (maps, lists) as delivered on the wire.
	Dynamic(serde_json::Value),
	/// A time value, epoch milliseconds.
	Time(i64),
}

/// An immutable value with the epoch-millisecond timestamp it was produced at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
	data: ValueData,
	timestamp: i64,
}

impl Value {
	pub fn new(data: ValueData, timestamp: i64) -> Self {
		Self { data, timestamp }
	}

	/// A value stamped with the current wall-clock time.
	pub fn now(data: ValueData) -> Self {
		Self::new(data, Utc::now().timestamp_millis())
	}

	pub fn data(&self) -> &ValueData {
		&self.data
	}

	pub fn timestamp(&self) -> i64 {
		self.timestamp
	}
}

/// What the bus delivered for one subscription update.
///
/// An absent value models the bus publishing null; it participates in change
/// detection but is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionUpdate {
	pub path: String,
	pub value: Option<Value>,
	pub metadata: Option<serde_json::Value>,
}

impl SubscriptionUpdate {
	pub fn new(path: impl Into<String>, value: Option<Value>) -> Self {
		Self { path: path.into(), value, metadata: None }
	}

	pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
		self.metadata = Some(metadata);
		self
	}
}

/// One persisted row: the value and the timestamp it was stored under.
///
/// The stored timestamp can differ from the value's own timestamp when the
/// group samples on an interval.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryData {
	pub value: Value,
	pub timestamp: i64,
}

/// The POINT_CHANGE predicate: exactly one side is absent, or both are
/// present and structurally unequal. Timestamps do not participate.
pub fn value_changed(prev: Option<&Value>, curr: Option<&Value>) -> bool {
	match (prev, curr) {
		(None, None) => false,
		(Some(_), None) | (None, Some(_)) => true,
		(Some(p), Some(c)) => p.data() != c.data(),
	}
}
