//! Watch group policy parameters and their persisted form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which updates a group persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoggingType {
	/// Every non-null update is written.
	#[default]
	#[serde(rename = "ALL_DATA")]
	AllData,
	/// Nothing is written directly; the interval sampler snapshots each
	/// watch's latest value on a fixed period.
	#[serde(rename = "INTERVAL")]
	Interval,
	/// An update is written only when it differs from the last seen value.
	#[serde(rename = "POINT_CHANGE")]
	PointChange,
}

impl LoggingType {
	pub const ALL: [LoggingType; 3] =
		[LoggingType::AllData, LoggingType::Interval, LoggingType::PointChange];

	pub fn name(&self) -> &'static str {
		match self {
			LoggingType::AllData => "ALL_DATA",
			LoggingType::Interval => "INTERVAL",
			LoggingType::PointChange => "POINT_CHANGE",
		}
	}
}

impl fmt::Display for LoggingType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for LoggingType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ALL_DATA" => Ok(LoggingType::AllData),
			"INTERVAL" => Ok(LoggingType::Interval),
			"POINT_CHANGE" => Ok(LoggingType::PointChange),
			other => Err(format!("unknown logging type: {other:?}")),
		}
	}
}

/// One immutable snapshot of a group's policy. Edits swap the whole record
/// under the group's reconfiguration lock; scheduled tasks capture the
/// snapshot they started under.
///
/// The serialized field names match the persisted config keys (`bft`, `lt`,
/// `i`); missing entries fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchGroupSettings {
	/// Seconds between buffer flushes; `<= 0` disables buffering and writes
	/// go straight to the database.
	#[serde(rename = "bft", default = "default_buffer_flush_seconds")]
	pub buffer_flush_seconds: i64,

	#[serde(rename = "lt", default)]
	pub logging_type: LoggingType,

	/// Seconds between interval samples; only used when the logging type is
	/// INTERVAL. `0` disables the sampler.
	#[serde(rename = "i", default = "default_interval_seconds")]
	pub interval_seconds: i64,
}

fn default_buffer_flush_seconds() -> i64 {
	5
}

fn default_interval_seconds() -> i64 {
	5
}

impl Default for WatchGroupSettings {
	fn default() -> Self {
		Self {
			buffer_flush_seconds: default_buffer_flush_seconds(),
			logging_type: LoggingType::default(),
			interval_seconds: default_interval_seconds(),
		}
	}
}

impl WatchGroupSettings {
	/// Clamp negative durations to 0 (disabled).
	pub fn sanitized(mut self) -> Self {
		if self.buffer_flush_seconds < 0 {
			self.buffer_flush_seconds = 0;
		}
		if self.interval_seconds < 0 {
			self.interval_seconds = 0;
		}
		self
	}
}
