//! Sleep interval records and the per-day aggregate derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::calendar::DayKey;
use crate::error::ValidationError;

/// How an interval came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalSource {
    /// Drawn or tapped by the user.
    Manual,
    /// Started or stopped by an automation trigger.
    Automated,
}

impl IntervalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automated => "automated",
        }
    }
}

impl fmt::Display for IntervalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "automated" => Ok(Self::Automated),
            other => Err(ValidationError::InvalidValue {
                field: "source".into(),
                message: format!("unknown interval source '{other}'"),
            }),
        }
    }
}

/// A persisted sleep record.
///
/// `end` is `None` while the sleep is still being recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepInterval {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub source: IntervalSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SleepInterval {
    /// A closed interval with a fresh id.
    ///
    /// # Errors
    /// Returns an error if `end <= start`.
    pub fn closed(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: IntervalSource,
    ) -> Result<Self, ValidationError> {
        Self::closed_with_id(new_interval_id(), start, end, source)
    }

    /// A closed interval with a caller-chosen id.
    ///
    /// # Errors
    /// Returns an error if `end <= start`.
    pub fn closed_with_id(
        id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source: IntervalSource,
    ) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        let now = Utc::now();
        Ok(Self {
            id: id.into(),
            start,
            end: Some(end),
            source,
            created_at: now,
            updated_at: now,
        })
    }

    /// An open interval starting at `start`.
    pub fn open(start: DateTime<Utc>, source: IntervalSource) -> Self {
        let now = Utc::now();
        Self {
            id: new_interval_id(),
            start,
            end: None,
            source,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration in minutes, `None` while open.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.end.map(|end| (end - self.start).num_minutes())
    }
}

/// Total sleep minutes attributed to one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAggregate {
    pub local_date: DayKey,
    pub total_minutes: i64,
    pub last_computed_at: DateTime<Utc>,
}

/// Fresh opaque interval identifier.
pub fn new_interval_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
