mod config;
pub mod migrations;
mod segment_store;
mod sqlite;
mod worker;

pub use config::{Config, EditorConfig, StorageConfig};
pub use segment_store::SegmentStore;
pub use sqlite::SqliteSegmentStore;
pub use worker::{DbLocation, DbWorker};

use std::path::PathBuf;

use crate::error::Result;

/// Returns the data directory, creating it if needed.
///
/// `SLEEPLOG_DATA_DIR` wins when set. Otherwise `~/.config/sleeplog/`, or
/// `~/.config/sleeplog-dev/` when `SLEEPLOG_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("SLEEPLOG_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("SLEEPLOG_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("sleeplog-dev")
            } else {
                base_dir.join("sleeplog")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
