// crates/db/src/queries/mod.rs
// Job and status-update queries for the agent status SQLite database.

pub mod jobs;
pub mod updates;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are stored as RFC 3339 text with microsecond precision.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: &str, raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

/// JSON object columns (`metadata`, `payload`). Empty text reads as `{}`.
pub(crate) fn decode_json_map(
    column: &str,
    raw: &str,
) -> Result<agent_status_core::JsonMap, sqlx::Error> {
    if raw.is_empty() {
        return Ok(agent_status_core::JsonMap::new());
    }
    serde_json::from_str(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
