//! Control-thread owner of the edit session.
//!
//! The controller is the only code that awaits store I/O on behalf of the
//! editor. Store failures stop here: callers get an [`EditError`] and an
//! [`Event::EditFailed`] is published for the notification surface.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Local, TimeZone, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::command::EditorCommand;
use super::coords::SessionCoordinates;
use super::live::LiveCoordinates;
use super::session::{EditPhase, EditSession};
use crate::calendar::{DayKey, LocalCalendar, MINUTES_PER_DAY};
use crate::error::EditError;
use crate::events::Event;
use crate::interval::SleepInterval;
use crate::overlap::has_overlap;
use crate::storage::{EditorConfig, SegmentStore};

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Drives the Idle / CreatingNew / Editing state machine.
pub struct EditController<S, Tz = Local>
where
    S: SegmentStore + 'static,
    Tz: TimeZone,
{
    store: Arc<S>,
    calendar: LocalCalendar<Tz>,
    config: EditorConfig,
    live: Arc<LiveCoordinates>,
    session: Option<EditSession>,
    events: EventSender,
}

impl<S, Tz> EditController<S, Tz>
where
    S: SegmentStore + 'static,
    Tz: TimeZone + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<S>,
        calendar: LocalCalendar<Tz>,
        config: &EditorConfig,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            calendar,
            config: config.validated(),
            live: LiveCoordinates::new(),
            session: None,
            events,
        }
    }

    /// Coordinates shared with the gesture translator and the renderer.
    pub fn live(&self) -> Arc<LiveCoordinates> {
        Arc::clone(&self.live)
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn calendar(&self) -> &LocalCalendar<Tz> {
        &self.calendar
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> EditPhase {
        self.session
            .as_ref()
            .map_or(EditPhase::Idle, EditSession::phase)
    }

    /// Intervals overlapping each day, for drawing the columns.
    pub async fn intervals_for_days(
        &self,
        days: &[DayKey],
    ) -> crate::error::Result<BTreeMap<DayKey, Vec<SleepInterval>>> {
        self.store.intervals_for_days(days).await
    }

    /// Enter CreatingNew at `minute` of `day` without touching the store.
    ///
    /// The minute is clamped so the minimum duration fits before midnight.
    pub fn begin_new(&mut self, day: DayKey, minute: i32) -> Result<(), EditError> {
        if self.session.is_some() {
            return Err(self.reject(EditError::SessionActive));
        }
        let minute = minute.clamp(0, MINUTES_PER_DAY - self.config.min_duration_min);
        let coords = SessionCoordinates::for_new(minute, self.config.default_duration_min);
        self.enter(EditSession::new_unsaved(day, coords));
        Ok(())
    }

    /// First write of a CreatingNew session. Any failure destroys the session.
    ///
    /// On success the session stays dirty so later adjustments are saved on exit.
    pub async fn auto_commit_new(&mut self) -> Result<String, EditError> {
        let Some(session) = self.session.as_ref() else {
            return Err(self.reject(EditError::NoSession));
        };
        let id = session.target_id().to_string();
        if session.has_saved() {
            return Ok(id);
        }
        match self.persist(true).await {
            Ok(()) => Ok(id),
            Err(err) => {
                self.clear(true);
                Err(self.reject(err))
            }
        }
    }

    /// Long-press on empty space: create and immediately persist.
    pub async fn start_new(&mut self, day: DayKey, minute: i32) -> Result<String, EditError> {
        self.begin_new(day, minute)?;
        self.auto_commit_new().await
    }

    /// Long-press on an existing interval drawn in the `day` column.
    pub fn start_existing(&mut self, interval: &SleepInterval, day: DayKey) -> Result<(), EditError> {
        if self.session.is_some() {
            return Err(self.reject(EditError::SessionActive));
        }
        let Some(end) = interval.end else {
            return Err(self.reject(EditError::OpenInterval));
        };
        let session = EditSession::for_existing(interval, end, day, &self.calendar);
        self.enter(session);
        Ok(())
    }

    /// Pull the live coordinates into the session after a gesture.
    pub fn mark_dirty(&mut self) -> Result<(), EditError> {
        let coords = self.live.snapshot();
        let Some(session) = self.session.as_mut() else {
            return Err(self.reject(EditError::NoSession));
        };
        session.mark_dirty(coords);
        debug!(
            interval_id = %session.target_id(),
            start = ?coords.start,
            end = ?coords.end,
            "gesture applied"
        );
        Ok(())
    }

    /// Validate and persist the current coordinates.
    ///
    /// A rejected span or overlap leaves the session untouched. A store
    /// failure restores the last saved coordinates.
    pub async fn commit(&mut self) -> Result<(), EditError> {
        if self.session.is_none() {
            return Err(self.reject(EditError::NoSession));
        }
        match self.persist(false).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if matches!(err, EditError::Store(_)) {
                    self.revert();
                }
                Err(self.reject(err))
            }
        }
    }

    /// "Done": commit if dirty, then return to Idle. A failed commit keeps
    /// the session.
    pub async fn exit(&mut self) -> Result<(), EditError> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        if session.is_dirty() {
            self.commit().await?;
        }
        self.clear(false);
        Ok(())
    }

    /// Remove the edited interval, or just drop the session if it was never saved.
    pub async fn delete(&mut self) -> Result<(), EditError> {
        let Some(session) = self.session.as_ref() else {
            return Err(self.reject(EditError::NoSession));
        };
        if !session.has_saved() {
            self.clear(true);
            return Ok(());
        }

        let Some(_guard) = self.live.try_begin_commit() else {
            return Err(self.reject(EditError::CommitInProgress));
        };
        let id = session.target_id().to_string();
        let affected_days = session
            .committed_span()
            .map(|(start, end)| self.calendar.days_touched(start, Some(end)))
            .unwrap_or_default();

        let store = Arc::clone(&self.store);
        let target = id.clone();
        let outcome = tokio::spawn(async move { store.delete_interval(&target).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(interval_id = %id, "delete failed: {err}");
                return Err(self.reject(err.into()));
            }
            Err(err) => {
                error!(interval_id = %id, "delete task failed: {err}");
                return Err(self.reject(EditError::Store(err.to_string())));
            }
        }

        info!(interval_id = %id, "interval deleted");
        self.emit(Event::IntervalDeleted {
            interval_id: id,
            affected_days,
            at: Utc::now(),
        });
        self.clear(false);
        Ok(())
    }

    /// Drop the session without saving. Never fails.
    pub fn force_exit(&mut self) {
        self.clear(true);
    }

    /// The editing surface is going away: save if possible, otherwise drop.
    pub async fn teardown(&mut self) {
        if self.exit().await.is_err() {
            warn!("teardown commit failed, discarding pending edits");
            self.force_exit();
        }
    }

    /// Apply one hand-off message from the interaction layer.
    pub async fn handle(&mut self, command: EditorCommand) -> Result<(), EditError> {
        match command {
            EditorCommand::StartNew { day, minute } => self.start_new(day, minute).await.map(|_| ()),
            EditorCommand::StartExisting { interval, day } => self.start_existing(&interval, day),
            EditorCommand::GestureFinished => self.mark_dirty(),
            EditorCommand::Commit => self.commit().await,
            EditorCommand::Exit => self.exit().await,
            EditorCommand::Delete => self.delete().await,
            EditorCommand::ForceExit => {
                self.force_exit();
                Ok(())
            }
            EditorCommand::Teardown => {
                self.teardown().await;
                Ok(())
            }
        }
    }

    /// Control loop. Runs until every command sender is dropped, then tears down.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<EditorCommand>) {
        while let Some(command) = commands.recv().await {
            if let Err(err) = self.handle(command).await {
                debug!("command rejected: {err}");
            }
        }
        self.teardown().await;
    }

    fn enter(&mut self, session: EditSession) {
        self.live.publish(session.coords());
        self.live.set_editing(true);
        info!(
            interval_id = %session.target_id(),
            day = %session.origin_day(),
            phase = ?session.phase(),
            "edit session started"
        );
        self.emit(Event::SessionStarted {
            interval_id: session.target_id().to_string(),
            phase: session.phase(),
            origin_day: session.origin_day(),
            at: Utc::now(),
        });
        self.session = Some(session);
    }

    fn clear(&mut self, discard: bool) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.live.set_editing(false);
        let discarded = discard && session.is_dirty();
        info!(interval_id = %session.target_id(), discarded, "edit session ended");
        self.emit(Event::SessionEnded {
            interval_id: session.target_id().to_string(),
            discarded,
            at: Utc::now(),
        });
    }

    /// Validation then write. Emits `IntervalCommitted` on success only.
    async fn persist(&mut self, still_dirty: bool) -> Result<(), EditError> {
        let Some(_guard) = self.live.try_begin_commit() else {
            return Err(EditError::CommitInProgress);
        };
        let session = self.session.as_ref().ok_or(EditError::NoSession)?;

        let (start, end) = session.resolve(&self.calendar);
        if end <= start {
            return Err(EditError::InvalidSpan);
        }
        let interval = session.to_interval(start, end);
        let previous = session.committed_span();
        let id = interval.id.clone();

        let committed = self.store.closed_intervals_overlapping(start, end).await?;
        if has_overlap(start, end, Some(id.as_str()), &committed) {
            return Err(EditError::Overlap);
        }

        let store = Arc::clone(&self.store);
        match tokio::spawn(async move { store.upsert_interval(interval).await }).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                error!(interval_id = %id, "commit failed: {err}");
                return Err(err.into());
            }
            Err(err) => {
                error!(interval_id = %id, "commit task failed: {err}");
                return Err(EditError::Store(err.to_string()));
            }
        }

        let mut affected_days = self.calendar.days_touched(start, Some(end));
        if let Some((old_start, old_end)) = previous {
            affected_days.extend(self.calendar.days_touched(old_start, Some(old_end)));
        }
        affected_days.sort();
        affected_days.dedup();

        if let Some(session) = self.session.as_mut() {
            session.mark_saved(start, end, still_dirty);
        }
        info!(interval_id = %id, days = affected_days.len(), "interval committed");
        self.emit(Event::IntervalCommitted {
            interval_id: id,
            affected_days,
            at: Utc::now(),
        });
        Ok(())
    }

    fn revert(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if let Some(coords) = session.revert() {
            let interval_id = session.target_id().to_string();
            self.live.publish(coords);
            warn!(interval_id = %interval_id, "reverted to last saved coordinates");
            self.emit(Event::CoordinatesReverted {
                interval_id,
                coords,
                at: Utc::now(),
            });
        }
    }

    fn reject(&self, err: EditError) -> EditError {
        match &err {
            e if e.is_informational() => debug!("edit rejected: {e}"),
            EditError::Store(_) => error!("edit failed: {err}"),
            e => warn!("edit rejected: {e}"),
        }
        self.emit(Event::EditFailed {
            message: err.user_message().to_string(),
            informational: err.is_informational(),
            at: Utc::now(),
        });
        err
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}
