//! Integration tests for the timeline editor.
//!
//! Drives the edit controller and gesture translator against an in-memory
//! SQLite store pinned to America/New_York.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use tokio::sync::mpsc;

use sleeplog_core::editor::{
    ColumnGeometry, DragTarget, Handle, HandlePosition, LongPress, SessionCoordinates,
};
use sleeplog_core::{
    CoreError, DayAggregate, DayKey, EditController, EditError, EditPhase, EditorConfig, Event,
    GestureTranslator, IntervalSource, LocalCalendar, SegmentStore, SleepInterval,
    SqliteSegmentStore,
};

/// Store wrapper that can be told to fail writes and counts deletes.
struct FlakyStore {
    inner: SqliteSegmentStore<Tz>,
    fail_writes: AtomicBool,
    deletes: AtomicUsize,
}

impl FlakyStore {
    fn new(calendar: LocalCalendar<Tz>) -> Self {
        Self {
            inner: SqliteSegmentStore::open_in_memory(calendar).unwrap(),
            fail_writes: AtomicBool::new(false),
            deletes: AtomicUsize::new(0),
        }
    }

    fn check_write(&self) -> sleeplog_core::error::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoreError::Custom("disk I/O error".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for FlakyStore {
    async fn create_open_interval(
        &self,
        source: IntervalSource,
    ) -> sleeplog_core::error::Result<String> {
        self.check_write()?;
        self.inner.create_open_interval(source).await
    }

    async fn close_most_recent_open_interval(
        &self,
        end: Option<DateTime<Utc>>,
    ) -> sleeplog_core::error::Result<Option<String>> {
        self.check_write()?;
        self.inner.close_most_recent_open_interval(end).await
    }

    async fn upsert_interval(&self, interval: SleepInterval) -> sleeplog_core::error::Result<String> {
        self.check_write()?;
        self.inner.upsert_interval(interval).await
    }

    async fn delete_interval(&self, id: &str) -> sleeplog_core::error::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.inner.delete_interval(id).await
    }

    async fn get_interval(&self, id: &str) -> sleeplog_core::error::Result<Option<SleepInterval>> {
        self.inner.get_interval(id).await
    }

    async fn intervals_overlapping_local_day(
        &self,
        day: DayKey,
    ) -> sleeplog_core::error::Result<Vec<SleepInterval>> {
        self.inner.intervals_overlapping_local_day(day).await
    }

    async fn closed_intervals_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> sleeplog_core::error::Result<Vec<SleepInterval>> {
        self.inner.closed_intervals_overlapping(start, end).await
    }

    async fn list_recent(&self, limit: usize) -> sleeplog_core::error::Result<Vec<SleepInterval>> {
        self.inner.list_recent(limit).await
    }

    async fn import_intervals(
        &self,
        intervals: Vec<SleepInterval>,
    ) -> sleeplog_core::error::Result<usize> {
        self.check_write()?;
        self.inner.import_intervals(intervals).await
    }

    async fn day_aggregate(&self, day: DayKey) -> sleeplog_core::error::Result<Option<DayAggregate>> {
        self.inner.day_aggregate(day).await
    }

    async fn aggregates_between(
        &self,
        from: DayKey,
        to: DayKey,
    ) -> sleeplog_core::error::Result<Vec<DayAggregate>> {
        self.inner.aggregates_between(from, to).await
    }
}

struct Harness {
    calendar: LocalCalendar<Tz>,
    store: Arc<FlakyStore>,
    controller: EditController<FlakyStore, Tz>,
    events: mpsc::UnboundedReceiver<Event>,
}

fn harness_with(config: EditorConfig) -> Harness {
    let calendar = LocalCalendar::new(New_York);
    let store = Arc::new(FlakyStore::new(calendar));
    let (tx, events) = mpsc::unbounded_channel();
    let controller = EditController::new(Arc::clone(&store), calendar, &config, tx);
    Harness {
        calendar,
        store,
        controller,
        events,
    }
}

fn harness() -> Harness {
    harness_with(EditorConfig::default())
}

impl Harness {
    fn at(&self, day: DayKey, minute: i32) -> DateTime<Utc> {
        self.calendar.from_local_day_and_minutes(day, minute)
    }

    async fn seed(&self, day: DayKey, start_min: i32, end_day: DayKey, end_min: i32) -> SleepInterval {
        let iv = SleepInterval::closed(
            self.at(day, start_min),
            self.at(end_day, end_min),
            IntervalSource::Manual,
        )
        .unwrap();
        self.store.upsert_interval(iv.clone()).await.unwrap();
        iv
    }

    async fn total(&self, day: DayKey) -> i64 {
        self.store
            .day_aggregate(day)
            .await
            .unwrap()
            .map_or(0, |agg| agg.total_minutes)
    }

    async fn all(&self) -> Vec<SleepInterval> {
        self.store.list_recent(100).await.unwrap()
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Move the live handles and hand them to the controller, as a drag would.
    fn drag_to(&mut self, coords: SessionCoordinates) {
        self.controller.live().publish(coords);
        self.controller.mark_dirty().unwrap();
    }
}

fn day(d: u32) -> DayKey {
    DayKey::from_ymd(2025, 6, d).unwrap()
}

fn pos(minute: i32, day_offset: i32) -> HandlePosition {
    HandlePosition::new(minute, day_offset)
}

#[tokio::test]
async fn test_create_overnight_splits_aggregates() {
    let mut h = harness();
    let id = h.controller.start_new(day(1), 23 * 60).await.unwrap();

    let coords = h.controller.session().unwrap().coords();
    assert_eq!(coords.start, pos(1380, 0));
    assert_eq!(coords.end, pos(420, 1));

    let stored = h.store.get_interval(&id).await.unwrap().unwrap();
    assert_eq!(stored.start, h.at(day(1), 1380));
    assert_eq!(stored.end, Some(h.at(day(2), 420)));
    assert_eq!(h.total(day(1)).await, 60);
    assert_eq!(h.total(day(2)).await, 420);

    h.controller.exit().await.unwrap();
    assert_eq!(h.controller.phase(), EditPhase::Idle);
    assert_eq!(h.all().await.len(), 1);
}

#[tokio::test]
async fn test_create_ending_at_midnight_rolls_to_next_day() {
    let config = EditorConfig {
        default_duration_min: 60,
        ..EditorConfig::default()
    };
    let mut h = harness_with(config);
    let id = h.controller.start_new(day(1), 1380).await.unwrap();

    let coords = h.controller.session().unwrap().coords();
    assert_eq!(coords.start, pos(1380, 0));
    assert_eq!(coords.end, pos(0, 1));

    let stored = h.store.get_interval(&id).await.unwrap().unwrap();
    assert_eq!(stored.end, Some(h.calendar.local_midnight(day(2))));
    assert_eq!(h.total(day(1)).await, 60);
    assert_eq!(h.total(day(2)).await, 0);
    h.controller.exit().await.unwrap();
}

#[tokio::test]
async fn test_recommit_is_idempotent() {
    let mut h = harness();
    let id = h.controller.start_new(day(1), 1320).await.unwrap();

    h.controller.commit().await.unwrap();
    h.controller.commit().await.unwrap();
    h.controller.exit().await.unwrap();
    h.controller.exit().await.unwrap();

    let all = h.all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
    assert_eq!(all[0].duration_minutes(), Some(480));
}

#[tokio::test]
async fn test_delete_before_save_skips_store() {
    let mut h = harness();
    h.controller.begin_new(day(1), 600).unwrap();
    assert_eq!(h.controller.phase(), EditPhase::CreatingNew);

    h.controller.delete().await.unwrap();

    assert_eq!(h.controller.phase(), EditPhase::Idle);
    assert_eq!(h.store.deletes.load(Ordering::SeqCst), 0);
    assert!(h.all().await.is_empty());
    assert!(!h.controller.live().is_editing());
}

#[tokio::test]
async fn test_delete_saved_interval_clears_days() {
    let mut h = harness();
    let id = h.controller.start_new(day(1), 1380).await.unwrap();
    h.drain();

    h.controller.delete().await.unwrap();

    assert_eq!(h.controller.phase(), EditPhase::Idle);
    assert_eq!(h.store.deletes.load(Ordering::SeqCst), 1);
    assert!(h.store.get_interval(&id).await.unwrap().is_none());
    assert_eq!(h.total(day(1)).await, 0);
    assert_eq!(h.total(day(2)).await, 0);

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::IntervalDeleted { affected_days, .. } if affected_days == &vec![day(1), day(2)]
    )));
}

#[tokio::test]
async fn test_force_exit_from_every_state() {
    let mut h = harness();
    h.controller.force_exit();
    assert_eq!(h.controller.phase(), EditPhase::Idle);

    h.controller.begin_new(day(1), 600).unwrap();
    h.controller.force_exit();
    assert_eq!(h.controller.phase(), EditPhase::Idle);

    h.controller.start_new(day(1), 600).await.unwrap();
    h.drag_to(SessionCoordinates::new(pos(540, 0), pos(1080, 0)));
    h.controller.force_exit();
    assert_eq!(h.controller.phase(), EditPhase::Idle);
    assert!(!h.controller.live().is_editing());

    let all = h.all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].start, h.at(day(1), 600));
}

#[tokio::test]
async fn test_create_over_existing_is_rejected() {
    let mut h = harness();
    h.seed(day(1), 1320, day(2), 360).await;

    let err = h.controller.start_new(day(1), 1380).await.unwrap_err();

    assert_eq!(err, EditError::Overlap);
    assert_eq!(h.controller.phase(), EditPhase::Idle);
    assert!(!h.controller.live().is_editing());
    assert_eq!(h.all().await.len(), 1);
    assert!(h.drain().iter().any(|e| matches!(
        e,
        Event::EditFailed { informational: false, message, .. } if message == EditError::Overlap.user_message()
    )));
}

#[tokio::test]
async fn test_overlapping_move_keeps_session() {
    let mut h = harness();
    h.seed(day(1), 1320, day(2), 120).await;
    let second = h.seed(day(2), 180, day(2), 300).await;

    h.controller.start_existing(&second, day(2)).unwrap();
    let coords = h.controller.session().unwrap().coords();
    assert_eq!(coords, SessionCoordinates::new(pos(180, 0), pos(300, 0)));

    let moved = SessionCoordinates::new(pos(60, 0), pos(240, 0));
    h.drag_to(moved);
    assert_eq!(h.controller.commit().await.unwrap_err(), EditError::Overlap);

    let session = h.controller.session().unwrap();
    assert!(session.is_dirty());
    assert_eq!(session.coords(), moved);

    assert_eq!(h.controller.exit().await.unwrap_err(), EditError::Overlap);
    assert_eq!(h.controller.phase(), EditPhase::Editing);

    h.controller.force_exit();
    let stored = h.store.get_interval(&second.id).await.unwrap().unwrap();
    assert_eq!(stored.start, second.start);
    assert_eq!(stored.end, second.end);
}

#[tokio::test]
async fn test_touching_neighbour_is_allowed() {
    let mut h = harness();
    h.seed(day(1), 1320, day(2), 120).await;
    let second = h.seed(day(2), 180, day(2), 300).await;

    h.controller.start_existing(&second, day(2)).unwrap();
    h.drag_to(SessionCoordinates::new(pos(120, 0), pos(300, 0)));
    h.controller.exit().await.unwrap();

    let stored = h.store.get_interval(&second.id).await.unwrap().unwrap();
    assert_eq!(stored.start, h.at(day(2), 120));
    assert_eq!(h.total(day(2)).await, 120 + 180);
}

#[tokio::test]
async fn test_move_recomputes_vacated_days() {
    let mut h = harness();
    let iv = h.seed(day(1), 1380, day(2), 420).await;

    h.controller.start_existing(&iv, day(1)).unwrap();
    h.drag_to(SessionCoordinates::new(pos(1380, 2), pos(420, 3)));
    h.drain();
    h.controller.exit().await.unwrap();

    assert_eq!(h.total(day(1)).await, 0);
    assert_eq!(h.total(day(2)).await, 0);
    assert_eq!(h.total(day(3)).await, 60);
    assert_eq!(h.total(day(4)).await, 420);

    let events = h.drain();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::IntervalCommitted { affected_days, .. }
            if affected_days == &vec![day(1), day(2), day(3), day(4)]
    )));
}

#[tokio::test]
async fn test_store_failure_reverts_coordinates() {
    let mut h = harness();
    let iv = h.seed(day(1), 1380, day(2), 420).await;
    h.controller.start_existing(&iv, day(2)).unwrap();
    let original = h.controller.session().unwrap().coords();
    assert_eq!(original, SessionCoordinates::new(pos(1380, -1), pos(420, 0)));

    h.drag_to(SessionCoordinates::new(pos(1320, -1), pos(480, 0)));
    h.drain();
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let err = h.controller.commit().await.unwrap_err();
    assert!(matches!(err, EditError::Store(_)));

    let session = h.controller.session().unwrap();
    assert_eq!(session.coords(), original);
    assert!(!session.is_dirty());
    assert_eq!(h.controller.live().snapshot(), original);
    assert!(!h.controller.live().is_committing());

    let events = h.drain();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::CoordinatesReverted { coords, .. } if *coords == original)));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::EditFailed { message, .. } if message == "Could not save your changes."
    )));

    let stored = h.store.get_interval(&iv.id).await.unwrap().unwrap();
    assert_eq!(stored.start, iv.start);
}

#[tokio::test]
async fn test_store_failure_on_create_destroys_session() {
    let mut h = harness();
    h.store.fail_writes.store(true, Ordering::SeqCst);

    let err = h.controller.start_new(day(1), 600).await.unwrap_err();

    assert!(matches!(err, EditError::Store(_)));
    assert_eq!(h.controller.phase(), EditPhase::Idle);
    assert!(h.all().await.is_empty());
}

#[tokio::test]
async fn test_create_inside_spring_forward_gap_is_invalid() {
    let config = EditorConfig {
        default_duration_min: 60,
        ..EditorConfig::default()
    };
    let mut h = harness_with(config);
    let spring_forward = DayKey::from_ymd(2025, 3, 9).unwrap();

    // 02:00 does not exist that night; it and 03:00 EDT are the same instant.
    let err = h.controller.start_new(spring_forward, 120).await.unwrap_err();

    assert_eq!(err, EditError::InvalidSpan);
    assert_eq!(h.controller.phase(), EditPhase::Idle);
    assert!(!h.controller.live().is_editing());
    assert!(h.all().await.is_empty());
    assert_eq!(h.total(spring_forward).await, 0);
}

#[tokio::test]
async fn test_invalid_span_commit_keeps_session() {
    let config = EditorConfig {
        default_duration_min: 60,
        ..EditorConfig::default()
    };
    let mut h = harness_with(config);
    let spring_forward = DayKey::from_ymd(2025, 3, 9).unwrap();
    let id = h.controller.start_new(spring_forward, 60).await.unwrap();
    let saved = h.store.get_interval(&id).await.unwrap().unwrap();

    let collapsed = SessionCoordinates::new(pos(120, 0), pos(180, 0));
    h.drag_to(collapsed);
    h.drain();
    assert_eq!(h.controller.commit().await.unwrap_err(), EditError::InvalidSpan);

    let session = h.controller.session().unwrap();
    assert_eq!(session.coords(), collapsed);
    assert!(session.is_dirty());
    assert_eq!(h.controller.phase(), EditPhase::Editing);
    assert_eq!(h.controller.live().snapshot(), collapsed);
    assert!(!h.drain().iter().any(|e| matches!(e, Event::CoordinatesReverted { .. })));

    let stored = h.store.get_interval(&id).await.unwrap().unwrap();
    assert_eq!(stored.start, saved.start);
    assert_eq!(stored.end, saved.end);
}

#[tokio::test]
async fn test_end_edit_keeps_start_in_repeated_hour() {
    let mut h = harness();
    let fall_back = DayKey::from_ymd(2025, 11, 2).unwrap();
    // Starts at 01:15 EST, the second time the clock shows 01:15 that night.
    let start: DateTime<Utc> = "2025-11-02T06:15:00Z".parse().unwrap();
    let end: DateTime<Utc> = "2025-11-02T08:00:00Z".parse().unwrap();
    let iv = SleepInterval::closed(start, end, IntervalSource::Manual).unwrap();
    h.store.upsert_interval(iv.clone()).await.unwrap();

    h.controller.start_existing(&iv, fall_back).unwrap();
    let coords = h.controller.session().unwrap().coords();
    assert_eq!(coords.start, pos(75, 0));

    h.drag_to(coords.with_end(pos(240, 0), 60));
    h.controller.exit().await.unwrap();

    let moved_end: DateTime<Utc> = "2025-11-02T09:00:00Z".parse().unwrap();
    let stored = h.store.get_interval(&iv.id).await.unwrap().unwrap();
    assert_eq!(stored.start, start);
    assert_eq!(stored.end, Some(moved_end));
}

#[tokio::test]
async fn test_teardown_falls_back_to_force_exit() {
    let mut h = harness();
    let iv = h.seed(day(1), 600, day(1), 700).await;
    h.controller.start_existing(&iv, day(1)).unwrap();
    h.drag_to(SessionCoordinates::new(pos(600, 0), pos(760, 0)));
    h.store.fail_writes.store(true, Ordering::SeqCst);

    h.controller.teardown().await;

    assert_eq!(h.controller.phase(), EditPhase::Idle);
    let stored = h.store.get_interval(&iv.id).await.unwrap().unwrap();
    assert_eq!(stored.end, iv.end);
}

#[tokio::test]
async fn test_open_interval_cannot_be_edited() {
    let mut h = harness();
    let id = h.store.create_open_interval(IntervalSource::Automated).await.unwrap();
    let open = h.store.get_interval(&id).await.unwrap().unwrap();

    let err = h.controller.start_existing(&open, day(1)).unwrap_err();

    assert_eq!(err, EditError::OpenInterval);
    assert!(err.is_informational());
    assert_eq!(h.controller.phase(), EditPhase::Idle);
}

#[tokio::test]
async fn test_gestures_drive_controller() {
    let mut h = harness();
    let (tx, mut commands) = mpsc::unbounded_channel();
    let mut gestures = GestureTranslator::new(
        h.controller.live(),
        h.controller.config(),
        ColumnGeometry::new(100.0, 1440.0),
        tx,
    );

    // Long-press at 22:00 on empty space.
    let outcome = gestures.long_press(day(1), 120.0, Duration::from_millis(400), None);
    assert_eq!(outcome, LongPress::StartNew { minute: 1320 });
    let command = commands.try_recv().unwrap();
    h.controller.handle(command).await.unwrap();
    assert_eq!(h.controller.phase(), EditPhase::Editing);

    // While editing, another long-press does nothing.
    assert_eq!(
        gestures.long_press(day(1), 600.0, Duration::from_millis(400), None),
        LongPress::Ignored
    );

    // Drag the end handle up by 31 minutes; it snaps to 06:30.
    assert!(gestures.begin_drag(DragTarget::Handle(Handle::End)));
    gestures.update_drag(0.0, -31.0);
    let done = gestures.end_drag(0.0, -31.0).unwrap();
    assert_eq!(done.end, pos(390, 1));
    let command = commands.try_recv().unwrap();
    h.controller.handle(command).await.unwrap();
    assert!(h.controller.session().unwrap().is_dirty());

    h.controller.exit().await.unwrap();
    let all = h.all().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].start, h.at(day(1), 1320));
    assert_eq!(all[0].end, Some(h.at(day(2), 390)));
    assert_eq!(h.total(day(2)).await, 390);

    let by_day: BTreeMap<_, _> = h.controller.intervals_for_days(&[day(1), day(2), day(3)]).await.unwrap();
    assert_eq!(by_day[&day(1)].len(), 1);
    assert_eq!(by_day[&day(2)].len(), 1);
    assert!(by_day[&day(3)].is_empty());
}
