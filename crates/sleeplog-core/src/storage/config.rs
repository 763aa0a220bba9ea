//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Timeline editor tuning (default and minimum durations, snapping, gesture timings)
//! - Database file location
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::calendar::MINUTES_PER_DAY;
use crate::error::{ConfigError, Result};

/// Timeline editor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Length of an interval created by long-press.
    #[serde(default = "default_duration_min")]
    pub default_duration_min: i32,
    /// Shortest span a live gesture may produce.
    #[serde(default = "default_min_duration_min")]
    pub min_duration_min: i32,
    /// Granularity handle minutes are rounded to when a drag ends.
    #[serde(default = "default_snap_minutes")]
    pub snap_minutes: i32,
    /// Longest gap between two taps that still counts as a double-tap.
    #[serde(default = "default_double_tap_max_ms")]
    pub double_tap_max_ms: u64,
    /// Shortest hold that counts as a long-press.
    #[serde(default = "default_long_press_min_ms")]
    pub long_press_min_ms: u64,
    /// Fraction of a column width of horizontal travel per day shift in a body drag.
    #[serde(default = "default_body_day_shift_fraction")]
    pub body_day_shift_fraction: f64,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_duration_min() -> i32 {
    480
}
fn default_min_duration_min() -> i32 {
    60
}
fn default_snap_minutes() -> i32 {
    5
}
fn default_double_tap_max_ms() -> u64 {
    300
}
fn default_long_press_min_ms() -> u64 {
    250
}
fn default_body_day_shift_fraction() -> f64 {
    0.5
}
fn default_database_file() -> String {
    "sleeplog.db".into()
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_duration_min: default_duration_min(),
            min_duration_min: default_min_duration_min(),
            snap_minutes: default_snap_minutes(),
            double_tap_max_ms: default_double_tap_max_ms(),
            long_press_min_ms: default_long_press_min_ms(),
            body_day_shift_fraction: default_body_day_shift_fraction(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
        }
    }
}

impl EditorConfig {
    /// Copy with values forced into ranges the editor can honour.
    ///
    /// Minimum duration stays within one day, the default duration is never
    /// shorter than the minimum, and snapping is at least one minute.
    pub fn validated(&self) -> Self {
        let min_duration_min = self.min_duration_min.clamp(1, MINUTES_PER_DAY - 1);
        let fraction = if self.body_day_shift_fraction.is_finite() && self.body_day_shift_fraction > 0.0 {
            self.body_day_shift_fraction
        } else {
            default_body_day_shift_fraction()
        };
        Self {
            default_duration_min: self.default_duration_min.max(min_duration_min),
            min_duration_min,
            snap_minutes: self.snap_minutes.clamp(1, MINUTES_PER_DAY),
            double_tap_max_ms: self.double_tap_max_ms,
            long_press_min_ms: self.long_press_min_ms,
            body_day_shift_fraction: fraction,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("'{value}' is not a boolean")))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        return Err(invalid("cannot replace a whole section".into()));
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn default_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`, writing defaults there if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or defaults cannot be saved.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|err| {
                ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                }
                .into()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(err) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
            .into()),
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|err| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value has the wrong type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: err.to_string(),
        })?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }
}
