//! Mapping between UTC instants and local (day, minute-of-day) coordinates.
//!
//! The vertical axis of the timeline is "minutes since local midnight". All
//! conversions go through the calendar's timezone rule at call time, so a
//! past instant re-evaluated after the device changes zone (or across a DST
//! change) may land on a different coordinate. That is accepted.

use chrono::{
    DateTime, LocalResult, Local, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone, Timelike,
    Utc,
};
use serde::{Deserialize, Serialize};

use super::DayKey;

/// Minutes in a nominal local day; the timeline column height.
pub const MINUTES_PER_DAY: i32 = 1440;

/// One piece of an interval, wholly inside one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySlice {
    pub day: DayKey,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DaySlice {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Visible span of an interval inside one day column, in `[0, 1440]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteSpan {
    pub start_minute: i32,
    pub end_minute: i32,
}

impl MinuteSpan {
    pub fn len(&self) -> i32 {
        self.end_minute - self.start_minute
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}

/// Local calendar rules for a timezone.
///
/// Defaults to the device zone ([`Local`]); tests pin a named zone.
#[derive(Debug, Clone, Copy)]
pub struct LocalCalendar<Tz: TimeZone = Local> {
    tz: Tz,
}

impl LocalCalendar<Local> {
    /// Calendar following the device's current timezone rule.
    pub fn system() -> Self {
        Self { tz: Local }
    }
}

impl Default for LocalCalendar<Local> {
    fn default() -> Self {
        Self::system()
    }
}

impl<Tz: TimeZone> LocalCalendar<Tz> {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Local day and minute-of-day of an instant. Seconds are truncated.
    pub fn to_local_day_and_minutes(&self, instant: DateTime<Utc>) -> (DayKey, i32) {
        let local = instant.with_timezone(&self.tz).naive_local();
        let minute = (local.hour() * 60 + local.minute()) as i32;
        (DayKey::new(local.date()), minute)
    }

    /// Instant for a local day and minute-of-day.
    ///
    /// `minute` may fall outside `[0, 1440)`: 1500 is minute 60 of the next
    /// day, -30 is 23:30 of the previous one. Local times skipped by a DST
    /// jump resolve with the offset in effect before the jump; repeated local
    /// times resolve to the earlier instant.
    pub fn from_local_day_and_minutes(&self, day: DayKey, minute: i32) -> DateTime<Utc> {
        let day_shift = minute.div_euclid(MINUTES_PER_DAY);
        let minute = minute.rem_euclid(MINUTES_PER_DAY);
        let date = day.add_days(i64::from(day_shift)).date();
        let naive = NaiveDateTime::new(date, NaiveTime::MIN) + TimeDelta::minutes(i64::from(minute));
        self.resolve_local(naive)
    }

    /// Instant of local midnight starting `day`.
    pub fn local_midnight(&self, day: DayKey) -> DateTime<Utc> {
        self.from_local_day_and_minutes(day, 0)
    }

    /// Half-open instant window `[midnight(day), midnight(day + 1))`.
    pub fn day_window(&self, day: DayKey) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.local_midnight(day), self.local_midnight(day.next()))
    }

    /// Real length of a local day in minutes (1380 or 1500 on DST days).
    pub fn day_length_minutes(&self, day: DayKey) -> i64 {
        let (start, end) = self.day_window(day);
        (end - start).num_minutes()
    }

    /// Signed calendar-day distance from `anchor` to the local date of `instant`.
    pub fn day_offset_from(&self, anchor: DayKey, instant: DateTime<Utc>) -> i64 {
        let (day, _) = self.to_local_day_and_minutes(instant);
        anchor.days_until(day)
    }

    /// Partition `[start, end)` into contiguous pieces, one per local day.
    ///
    /// Returns an empty list when `end <= start`.
    pub fn split_interval_by_local_day(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DaySlice> {
        let mut slices = Vec::new();
        if end <= start {
            return slices;
        }

        let (mut day, _) = self.to_local_day_and_minutes(start);
        let mut cursor = start;
        while cursor < end {
            let next_midnight = self.local_midnight(day.next());
            let piece_end = end.min(next_midnight);
            if piece_end > cursor {
                slices.push(DaySlice {
                    day,
                    start: cursor,
                    end: piece_end,
                });
                cursor = piece_end;
            }
            day = day.next();
        }
        slices
    }

    /// Days touched by `[start, end)`; the start day alone for an empty span.
    pub fn days_touched(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Vec<DayKey> {
        let (first, _) = self.to_local_day_and_minutes(start);
        match end {
            Some(end) if end > start => self
                .split_interval_by_local_day(start, end)
                .into_iter()
                .map(|slice| slice.day)
                .collect(),
            _ => vec![first],
        }
    }

    /// Clip an interval to the `[0, 1440]` column of `day`, for drawing.
    ///
    /// An open interval runs to the end of the day. Returns `None` when
    /// nothing of the interval is visible on that day.
    pub fn clamp_interval_to_local_day(
        &self,
        day: DayKey,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Option<MinuteSpan> {
        let (day_start, day_end) = self.day_window(day);
        let end = end.unwrap_or(day_end);
        let visible_start = start.max(day_start);
        let visible_end = end.min(day_end);
        if visible_end <= visible_start {
            return None;
        }

        let start_minute = if visible_start == day_start {
            0
        } else {
            self.to_local_day_and_minutes(visible_start).1
        };
        let end_minute = if visible_end == day_end {
            MINUTES_PER_DAY
        } else {
            self.to_local_day_and_minutes(visible_end).1
        };

        let span = MinuteSpan {
            start_minute,
            end_minute,
        };
        (!span.is_empty()).then_some(span)
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                // Inside a DST gap: apply the offset from a day earlier.
                let probe = naive - TimeDelta::days(1);
                let offset = self.tz.offset_from_utc_datetime(&probe).fix();
                let utc = naive - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
                Utc.from_utc_datetime(&utc)
            }
        }
    }
}
