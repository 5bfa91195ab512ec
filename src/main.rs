use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use dsa_historian::{
	DatabaseConfig, DatabaseProvider, RedbProvider, SubscriptionBus, SubscriptionUpdate, Value,
	ValueData, WatchGroupSettings,
};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "dsa-historian")]
#[command(
	about = "Historian demo: watches simulated bus values and persists them with the configured logging policy"
)]
struct Cli {
	/// Path to the historian database file
	#[arg(short, long, default_value = "historian.redb")]
	database: PathBuf,

	/// Watch group name
	#[arg(short, long, default_value = "demo")]
	group: String,

	/// Bus paths to watch
	#[arg(short = 'p', long = "path", default_value = "/downstream/rng/value")]
	paths: Vec<String>,

	/// Logging type: ALL_DATA, INTERVAL or POINT_CHANGE
	#[arg(short, long, default_value = "ALL_DATA")]
	logging_type: String,

	/// Seconds between interval samples
	#[arg(short, long, default_value_t = 5)]
	interval: i64,

	/// Seconds between buffer flushes (0 writes immediately)
	#[arg(short, long, default_value_t = 5)]
	buffer_flush: i64,

	/// How long to run the simulated publisher, in seconds
	#[arg(long, default_value_t = 15)]
	run_seconds: u64,

	/// Enable verbose logging
	#[arg(short, long)]
	verbose: bool,
}

/// Stands in for the DSA link: subscription management and alias writes are
/// logged instead of going over the wire.
struct SimulatedBus;

#[async_trait]
impl SubscriptionBus for SimulatedBus {
	async fn subscribe(&self, path: &str) -> dsa_historian::Result<()> {
		info!(path, "bus subscribe");
		Ok(())
	}

	async fn unsubscribe(&self, path: &str) -> dsa_historian::Result<()> {
		info!(path, "bus unsubscribe");
		Ok(())
	}

	async fn set(&self, path: &str, value: serde_json::Value) -> dsa_historian::Result<()> {
		debug!(path, %value, "bus set");
		Ok(())
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
	tracing_subscriber::fmt().with_max_level(level).init();

	let settings = WatchGroupSettings {
		buffer_flush_seconds: cli.buffer_flush,
		logging_type: cli
			.logging_type
			.parse()
			.map_err(|e: String| anyhow::anyhow!(e))?,
		interval_seconds: cli.interval,
	};

	let provider = RedbProvider::open(
		DatabaseConfig::with_path(cli.database.clone()),
		"/downstream/history",
		Arc::new(SimulatedBus),
	)
	.context("failed to open historian database")?;

	let group = provider.add_group(&cli.group, settings.clone()).await?;
	if *group.settings() != settings {
		// A previous run persisted different settings; the CLI wins.
		group.edit_settings(settings.clone()).await;
	}

	for path in &cli.paths {
		group.add_watch_path(path).await?;
	}

	info!(
		group = %cli.group,
		paths = cli.paths.len(),
		run_seconds = cli.run_seconds,
		"publishing simulated values"
	);
	let mut publishers = Vec::new();
	for path in cli.paths.clone() {
		let pool = provider.pool().clone();
		let deadline = tokio::time::Instant::now() + Duration::from_secs(cli.run_seconds);
		publishers.push(tokio::spawn(async move {
			while tokio::time::Instant::now() < deadline {
				let n: f64 = rand::rng().random_range(0.0..100.0);
				let value = Value::now(ValueData::Number((n * 10.0).round() / 10.0));
				pool.dispatch(SubscriptionUpdate::new(path.clone(), Some(value))).await;
				tokio::time::sleep(Duration::from_millis(500)).await;
			}
		}));
	}
	for publisher in publishers {
		publisher.await?;
	}

	// Let the flush task drain whatever is still buffered.
	if settings.buffer_flush_seconds > 0 {
		tokio::time::sleep(Duration::from_secs(settings.buffer_flush_seconds as u64 + 1)).await;
	}

	let now = chrono::Utc::now().timestamp_millis();
	for path in &cli.paths {
		let rows = provider.get_history(&cli.group, path, 0, now).await?;
		info!(path = %path, rows = rows.len(), "stored history");
		for row in rows.iter().rev().take(5).rev() {
			info!(
				time = %chrono::DateTime::from_timestamp_millis(row.timestamp)
					.map(|t| t.to_rfc3339())
					.unwrap_or_default(),
				value = ?row.value.data(),
				"row"
			);
		}
	}

	group.close();
	info!("historian demo finished");
	Ok(())
}
