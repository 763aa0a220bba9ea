//! Handle coordinates relative to a session's anchor day.
//!
//! A handle is a minute-of-day plus a signed day offset. Everything here is
//! integer arithmetic on those two numbers; instants only appear when a
//! session is resolved for commit.

use serde::{Deserialize, Serialize};

use crate::calendar::MINUTES_PER_DAY;

const DAY: i64 = MINUTES_PER_DAY as i64;

/// Which end of an interval a gesture grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handle {
    Start,
    End,
}

/// One handle: minute in `[0, 1440)` once normalized, plus a day offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HandlePosition {
    pub minute: i32,
    pub day_offset: i32,
}

impl HandlePosition {
    pub fn new(minute: i32, day_offset: i32) -> Self {
        Self { minute, day_offset }
    }

    /// Minutes since the anchor day's midnight.
    pub fn total_minutes(&self) -> i64 {
        i64::from(self.day_offset) * DAY + i64::from(self.minute)
    }

    pub fn from_total_minutes(total: i64) -> Self {
        Self {
            minute: total.rem_euclid(DAY) as i32,
            day_offset: total.div_euclid(DAY) as i32,
        }
    }

    /// Fold minute overflow/underflow into the day offset.
    pub fn normalized(self) -> Self {
        Self::from_total_minutes(self.total_minutes())
    }

    /// Shift by minutes and whole days, then normalize.
    pub fn shifted(self, minutes: i32, days: i32) -> Self {
        Self {
            minute: self.minute.saturating_add(minutes),
            day_offset: self.day_offset.saturating_add(days),
        }
        .normalized()
    }

    /// Round the minute to the nearest multiple of `granularity`.
    ///
    /// Rounding up past 1439 rolls into the next day.
    pub fn snapped(self, granularity: i32) -> Self {
        let g = granularity.max(1);
        let base = self.normalized();
        Self {
            minute: (base.minute + g / 2).div_euclid(g) * g,
            day_offset: base.day_offset,
        }
        .normalized()
    }
}

/// Both handles of the interval being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionCoordinates {
    pub start: HandlePosition,
    pub end: HandlePosition,
}

impl SessionCoordinates {
    pub fn new(start: HandlePosition, end: HandlePosition) -> Self {
        Self { start, end }
    }

    /// Coordinates for a freshly created interval on the anchor day.
    ///
    /// When `start_minute + duration` reaches midnight the end lands on the
    /// next day (exactly 1440 becomes 00:00 of day +1).
    pub fn for_new(start_minute: i32, duration_min: i32) -> Self {
        let start = HandlePosition::new(start_minute, 0).normalized();
        let end = HandlePosition::from_total_minutes(start.total_minutes() + i64::from(duration_min));
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.end.total_minutes() - self.start.total_minutes()
    }

    /// Day ordering, minimum duration and minute ranges all hold.
    pub fn is_valid(&self, min_duration: i32) -> bool {
        let in_range = |h: &HandlePosition| (0..MINUTES_PER_DAY).contains(&h.minute);
        in_range(&self.start)
            && in_range(&self.end)
            && self.end.day_offset >= self.start.day_offset
            && self.duration_minutes() >= i64::from(min_duration)
    }

    /// Place the end handle at `candidate`, keeping the invariants.
    ///
    /// An end on a day before the start is pinned to minute 0 of the start's
    /// day. If the span then drops under `min_duration`, the start handle is
    /// pushed earlier to make room.
    pub fn with_end(self, candidate: HandlePosition, min_duration: i32) -> Self {
        let mut end = candidate.normalized();
        let mut start = self.start;
        if end.day_offset < start.day_offset {
            end = HandlePosition::new(0, start.day_offset);
        }
        if end.total_minutes() - start.total_minutes() < i64::from(min_duration) {
            start = HandlePosition::from_total_minutes(end.total_minutes() - i64::from(min_duration));
        }
        Self { start, end }
    }

    /// Place the start handle at `candidate`, keeping the invariants.
    ///
    /// A start on a day after the end is pinned to minute 1439 of the end's
    /// day. If the span then drops under `min_duration`, the end handle is
    /// pushed later.
    pub fn with_start(self, candidate: HandlePosition, min_duration: i32) -> Self {
        let mut start = candidate.normalized();
        let mut end = self.end;
        if start.day_offset > end.day_offset {
            start = HandlePosition::new(MINUTES_PER_DAY - 1, end.day_offset);
        }
        if end.total_minutes() - start.total_minutes() < i64::from(min_duration) {
            end = HandlePosition::from_total_minutes(start.total_minutes() + i64::from(min_duration));
        }
        Self { start, end }
    }

    pub fn with_handle(self, handle: Handle, candidate: HandlePosition, min_duration: i32) -> Self {
        match handle {
            Handle::Start => self.with_start(candidate, min_duration),
            Handle::End => self.with_end(candidate, min_duration),
        }
    }

    pub fn handle(&self, handle: Handle) -> HandlePosition {
        match handle {
            Handle::Start => self.start,
            Handle::End => self.end,
        }
    }

    /// Move both handles together, preserving the duration.
    pub fn shifted(self, minutes: i32, days: i32) -> Self {
        Self {
            start: self.start.shifted(minutes, days),
            end: self.end.shifted(minutes, days),
        }
    }
}
