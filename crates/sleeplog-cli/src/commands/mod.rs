pub mod config;
pub mod interval;
pub mod stats;

use chrono::{DateTime, Utc};
use sleeplog_core::{Config, SqliteSegmentStore};
use tracing::debug;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Open the store named in the user's config.
pub fn open_store() -> Result<SqliteSegmentStore, Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    debug!(file = %config.storage.database_file, "opening interval store");
    Ok(SqliteSegmentStore::open_default(&config.storage.database_file)?)
}

/// Parse an RFC 3339 timestamp argument.
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
