use serde::{Deserialize, Serialize};

use crate::calendar::DayKey;
use crate::interval::SleepInterval;

/// Hand-off messages from the interaction layer to the edit controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EditorCommand {
    /// Long-press on empty space of `day` at `minute`.
    StartNew { day: DayKey, minute: i32 },
    /// Long-press on an existing interval drawn in the `day` column.
    StartExisting { interval: SleepInterval, day: DayKey },
    /// A drag ended; the live coordinates hold its final position.
    GestureFinished,
    Commit,
    Exit,
    Delete,
    ForceExit,
    /// Editing surface is going away.
    Teardown,
}
