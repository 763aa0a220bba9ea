//! Core error types for sleeplog-core.
//!
//! Two families live here. [`CoreError`] and its children describe failures
//! of the store, configuration and pure calendar helpers. [`EditError`] is
//! what the edit controller hands back to the interaction surface: every
//! variant carries a short message meant for a transient notification.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for sleeplog-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The worker thread owning the connection is gone
    #[error("Database worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),
}

/// Validation errors.
///
/// These signal malformed input to pure helpers (a bad day key, an inverted
/// range handed to the store) and are programming errors rather than
/// user-facing rejections.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Malformed local day key
    #[error("Invalid day key '{0}': expected YYYY-MM-DD")]
    InvalidDayKey(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::Custom(format!("TOML parse error: {err}"))
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::Custom(format!("TOML serialize error: {err}"))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Rejections and failures surfaced at the edit session boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// End is not after start once coordinates are resolved to instants.
    #[error("end must be after start")]
    InvalidSpan,

    /// Candidate overlaps another committed interval.
    #[error("interval overlaps an existing sleep record")]
    Overlap,

    /// The store rejected or failed the read/write.
    #[error("store failure: {0}")]
    Store(String),

    /// Operation needs an active session and there is none.
    #[error("no interval is being edited")]
    NoSession,

    /// A session is already active; exit it first.
    #[error("another interval is already being edited")]
    SessionActive,

    /// Open (still recording) intervals cannot be edited.
    #[error("interval is still recording and cannot be edited")]
    OpenInterval,

    /// A commit for this session is still outstanding.
    #[error("a save is already in progress")]
    CommitInProgress,
}

impl EditError {
    /// Short text for a transient notification.
    pub fn user_message(&self) -> &'static str {
        match self {
            EditError::InvalidSpan => "End time must be after start time.",
            EditError::Overlap => "This overlaps another sleep record.",
            EditError::Store(_) => "Could not save your changes.",
            EditError::NoSession => "Nothing is being edited.",
            EditError::SessionActive => "Finish the current edit first.",
            EditError::OpenInterval => "This sleep is still being recorded.",
            EditError::CommitInProgress => "Still saving, try again in a moment.",
        }
    }

    /// Expected timing races rather than failures.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            EditError::NoSession | EditError::SessionActive | EditError::OpenInterval
        )
    }
}

impl From<CoreError> for EditError {
    fn from(err: CoreError) -> Self {
        EditError::Store(err.to_string())
    }
}
