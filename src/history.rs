//! Range-query front end for watched paths and the bus-side action alias.

use crate::database::{Database, DatabaseResult};
use crate::value::QueryData;
use serde_json::json;

/// Collect a path's history in `[from, to]` (inclusive, epoch millis),
/// ordered by stored timestamp ascending.
pub async fn get_history(
	db: &dyn Database, path: &str, from: i64, to: i64,
) -> DatabaseResult<Vec<QueryData>> {
	let mut rows = Vec::new();
	let mut collect = |row: QueryData| rows.push(row);
	db.query(path, from, to, &mut collect).await?;
	Ok(rows)
}

/// The merge payload written at `{watched_path}/@@getHistory` so bus clients
/// can reach the watch's history action.
pub fn get_history_alias(
	link_path: &str, group_name: &str, encoded_name: &str,
) -> serde_json::Value {
	let action_path = format!(
		"{}/{}/{}/getHistory",
		link_path.trim_end_matches('/'),
		group_name,
		encoded_name
	);
	json!({
		"@": "merge",
		"type": "paths",
		"val": [action_path],
	})
}
