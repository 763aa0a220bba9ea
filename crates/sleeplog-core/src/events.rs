use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::DayKey;
use crate::editor::{EditPhase, SessionCoordinates};

/// Every state change in the editor produces an Event.
/// The rendering layer drains them to reload days and show notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        interval_id: String,
        phase: EditPhase,
        origin_day: DayKey,
        at: DateTime<Utc>,
    },
    /// Interval persisted; redraw the listed days.
    IntervalCommitted {
        interval_id: String,
        affected_days: Vec<DayKey>,
        at: DateTime<Utc>,
    },
    IntervalDeleted {
        interval_id: String,
        affected_days: Vec<DayKey>,
        at: DateTime<Utc>,
    },
    /// Session cleared. `discarded` is true when pending edits were dropped.
    SessionEnded {
        interval_id: String,
        discarded: bool,
        at: DateTime<Utc>,
    },
    /// A failed commit restored the last saved position.
    CoordinatesReverted {
        interval_id: String,
        coords: SessionCoordinates,
        at: DateTime<Utc>,
    },
    /// Short notification text for the user.
    EditFailed {
        message: String,
        informational: bool,
        at: DateTime<Utc>,
    },
}
