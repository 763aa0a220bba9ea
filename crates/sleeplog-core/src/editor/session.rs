//! The single in-progress edit.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::coords::{HandlePosition, SessionCoordinates};
use crate::calendar::{DayKey, LocalCalendar};
use crate::interval::{new_interval_id, IntervalSource, SleepInterval};

/// Where the editor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPhase {
    Idle,
    CreatingNew,
    Editing,
}

/// Last persisted state: the coordinates and the exact instants they came from.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Checkpoint {
    coords: SessionCoordinates,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// State of one edit, owned by the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    target_id: String,
    origin_day: DayKey,
    has_saved: bool,
    is_dirty: bool,
    coords: SessionCoordinates,
    /// Restored when a commit fails.
    committed: Option<Checkpoint>,
    source: IntervalSource,
    created_at: Option<DateTime<Utc>>,
}

impl EditSession {
    /// A session for an interval that does not exist in the store yet.
    pub fn new_unsaved(origin_day: DayKey, coords: SessionCoordinates) -> Self {
        Self {
            target_id: new_interval_id(),
            origin_day,
            has_saved: false,
            is_dirty: true,
            coords,
            committed: None,
            source: IntervalSource::Manual,
            created_at: None,
        }
    }

    /// A session over a persisted closed interval, anchored at `origin_day`.
    ///
    /// Day offsets compare local calendar dates, never raw instants.
    pub fn for_existing<Tz: TimeZone>(
        interval: &SleepInterval,
        end: DateTime<Utc>,
        origin_day: DayKey,
        calendar: &LocalCalendar<Tz>,
    ) -> Self {
        let position = |instant: DateTime<Utc>| {
            let (_, minute) = calendar.to_local_day_and_minutes(instant);
            HandlePosition::new(minute, calendar.day_offset_from(origin_day, instant) as i32)
        };
        let coords = SessionCoordinates::new(position(interval.start), position(end));
        Self {
            target_id: interval.id.clone(),
            origin_day,
            has_saved: true,
            is_dirty: false,
            coords,
            committed: Some(Checkpoint {
                coords,
                start: interval.start,
                end,
            }),
            source: interval.source,
            created_at: Some(interval.created_at),
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn origin_day(&self) -> DayKey {
        self.origin_day
    }

    pub fn has_saved(&self) -> bool {
        self.has_saved
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn coords(&self) -> SessionCoordinates {
        self.coords
    }

    pub fn phase(&self) -> EditPhase {
        if self.has_saved {
            EditPhase::Editing
        } else {
            EditPhase::CreatingNew
        }
    }

    pub fn mark_dirty(&mut self, coords: SessionCoordinates) {
        self.coords = coords;
        self.is_dirty = true;
    }

    /// Record a successful write of the current coordinates as `[start, end)`.
    pub(crate) fn mark_saved(&mut self, start: DateTime<Utc>, end: DateTime<Utc>, still_dirty: bool) {
        if self.created_at.is_none() {
            self.created_at = Some(Utc::now());
        }
        self.has_saved = true;
        self.committed = Some(Checkpoint {
            coords: self.coords,
            start,
            end,
        });
        self.is_dirty = still_dirty;
    }

    /// Restore the last persisted coordinates, if any.
    pub(crate) fn revert(&mut self) -> Option<SessionCoordinates> {
        let committed = self.committed?;
        self.coords = committed.coords;
        self.is_dirty = false;
        Some(committed.coords)
    }

    /// Current coordinates as UTC instants.
    ///
    /// A handle still sitting where it was last saved keeps its saved
    /// instant, so a repeated wall-clock hour or dropped seconds never move
    /// a handle the user did not touch.
    pub fn resolve<Tz: TimeZone>(&self, calendar: &LocalCalendar<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
        let at = |h: HandlePosition| {
            calendar.from_local_day_and_minutes(self.origin_day.add_days(i64::from(h.day_offset)), h.minute)
        };
        match self.committed {
            Some(saved) => (
                if self.coords.start == saved.coords.start { saved.start } else { at(self.coords.start) },
                if self.coords.end == saved.coords.end { saved.end } else { at(self.coords.end) },
            ),
            None => (at(self.coords.start), at(self.coords.end)),
        }
    }

    /// Instants of the last persisted span.
    pub fn committed_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.committed.map(|saved| (saved.start, saved.end))
    }

    /// The row a commit writes for already resolved instants.
    pub fn to_interval(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> SleepInterval {
        let now = Utc::now();
        SleepInterval {
            id: self.target_id.clone(),
            start,
            end: Some(end),
            source: self.source,
            created_at: self.created_at.unwrap_or(now),
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use chrono_tz::America::New_York;

    fn day(d: u32) -> DayKey {
        DayKey::from_ymd(2025, 6, d).unwrap()
    }

    #[test]
    fn new_session_is_creating_and_dirty() {
        let session = EditSession::new_unsaved(day(1), SessionCoordinates::for_new(1380, 480));
        assert_eq!(session.phase(), EditPhase::CreatingNew);
        assert!(session.is_dirty());
        assert!(!session.has_saved());
    }

    #[test]
    fn resolves_overnight_span() {
        let cal = LocalCalendar::new(New_York);
        let session = EditSession::new_unsaved(day(1), SessionCoordinates::for_new(1380, 480));
        let (start, end) = session.resolve(&cal);
        assert_eq!(end - start, Duration::minutes(480));
        assert_eq!(cal.to_local_day_and_minutes(start), (day(1), 1380));
        assert_eq!(cal.to_local_day_and_minutes(end), (day(2), 420));
    }

    #[test]
    fn existing_offsets_follow_local_dates() {
        let cal = LocalCalendar::new(New_York);
        let start = cal.from_local_day_and_minutes(day(1), 1380);
        let end = cal.from_local_day_and_minutes(day(2), 420);
        let iv = SleepInterval::closed(start, end, IntervalSource::Manual).unwrap();

        let anchored_on_second = EditSession::for_existing(&iv, end, day(2), &cal);
        let coords = anchored_on_second.coords();
        assert_eq!(coords.start, HandlePosition::new(1380, -1));
        assert_eq!(coords.end, HandlePosition::new(420, 0));
        assert_eq!(anchored_on_second.phase(), EditPhase::Editing);
        assert!(!anchored_on_second.is_dirty());
        assert_eq!(anchored_on_second.resolve(&cal), (start, end));
    }

    #[test]
    fn revert_restores_committed_coordinates() {
        let mut session = EditSession::new_unsaved(day(1), SessionCoordinates::for_new(600, 60));
        assert_eq!(session.revert(), None);
        let cal = LocalCalendar::new(New_York);
        let (start, end) = session.resolve(&cal);
        session.mark_saved(start, end, false);
        let saved = session.coords();
        session.mark_dirty(saved.shifted(30, 0));
        assert!(session.is_dirty());
        assert_eq!(session.revert(), Some(saved));
        assert_eq!(session.coords(), saved);
        assert!(!session.is_dirty());
    }

    #[test]
    fn untouched_handle_keeps_its_repeated_hour_instant() {
        let cal = LocalCalendar::new(New_York);
        let fall_back = DayKey::from_ymd(2025, 11, 2).unwrap();
        // 01:15 EST, the second pass through 01:xx that night.
        let start = "2025-11-02T06:15:00Z".parse::<DateTime<Utc>>().unwrap();
        let end = "2025-11-02T08:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let iv = SleepInterval::closed(start, end, IntervalSource::Manual).unwrap();

        let mut session = EditSession::for_existing(&iv, end, fall_back, &cal);
        assert_eq!(session.coords().start, HandlePosition::new(75, 0));
        assert_eq!(session.resolve(&cal), (start, end));

        let moved = session.coords().with_end(HandlePosition::new(240, 0), 60);
        session.mark_dirty(moved);
        let (new_start, new_end) = session.resolve(&cal);
        assert_eq!(new_start, start);
        assert_eq!(new_end, "2025-11-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert_eq!(session.committed_span(), Some((start, end)));
    }

    #[test]
    fn untouched_handle_keeps_seconds() {
        let cal = LocalCalendar::new(New_York);
        let start = "2025-06-02T03:00:42Z".parse::<DateTime<Utc>>().unwrap();
        let end = "2025-06-02T11:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let iv = SleepInterval::closed(start, end, IntervalSource::Automated).unwrap();
        let mut session = EditSession::for_existing(&iv, end, day(1), &cal);
        session.mark_dirty(session.coords().with_end(HandlePosition::new(480, 1), 60));
        assert_eq!(session.resolve(&cal).0, start);
    }

    #[test]
    fn interval_keeps_target_id() {
        let cal = LocalCalendar::new(New_York);
        let session = EditSession::new_unsaved(day(1), SessionCoordinates::for_new(600, 60));
        let (start, end) = session.resolve(&cal);
        let iv = session.to_interval(start, end);
        assert_eq!(iv.id, session.target_id());
        assert_eq!(iv.duration_minutes(), Some(60));
    }
}
