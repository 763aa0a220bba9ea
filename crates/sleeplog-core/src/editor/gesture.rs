//! Pointer gestures to coordinate mutations.
//!
//! Runs on the interaction thread. Drag updates only touch the shared
//! [`LiveCoordinates`]; anything needing the store is handed to the
//! controller as an [`EditorCommand`] over a channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::debug;

use super::command::EditorCommand;
use super::coords::{Handle, SessionCoordinates};
use super::live::LiveCoordinates;
use crate::calendar::{DayKey, MINUTES_PER_DAY};
use crate::interval::SleepInterval;
use crate::storage::EditorConfig;

/// Size of one day column on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnGeometry {
    pub width_px: f64,
    pub height_px: f64,
}

impl ColumnGeometry {
    pub fn new(width_px: f64, height_px: f64) -> Self {
        Self { width_px, height_px }
    }

    /// Vertical travel to minutes. Up is later in the day.
    pub fn minutes_for_dy(&self, dy: f64) -> i32 {
        if self.height_px <= 0.0 {
            return 0;
        }
        (-dy / self.height_px * f64::from(MINUTES_PER_DAY)).round() as i32
    }

    /// Horizontal travel to whole days, one day per `step_fraction` of a column.
    pub fn days_for_dx(&self, dx: f64, step_fraction: f64) -> i32 {
        let step = self.width_px * step_fraction;
        if step <= 0.0 {
            return 0;
        }
        (dx / step).round() as i32
    }

    /// Minute of day under a press at `y`, midnight at the bottom.
    pub fn minute_at(&self, y: f64) -> i32 {
        if self.height_px <= 0.0 {
            return 0;
        }
        ((1.0 - y / self.height_px) * f64::from(MINUTES_PER_DAY)).round() as i32
    }
}

/// What a drag grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragTarget {
    Handle(Handle),
    Body,
}

#[derive(Debug, Clone, Copy)]
struct ActiveDrag {
    target: DragTarget,
    snapshot: SessionCoordinates,
}

/// Pairs taps into double-taps.
#[derive(Debug, Clone)]
pub struct TapRecognizer {
    max_gap: Duration,
    last_tap: Option<Instant>,
}

impl TapRecognizer {
    pub fn new(max_gap: Duration) -> Self {
        Self {
            max_gap,
            last_tap: None,
        }
    }

    /// Record a tap. True when it completes a double-tap.
    pub fn register(&mut self, at: Instant) -> bool {
        match self.last_tap.take() {
            Some(prev) if at.saturating_duration_since(prev) <= self.max_gap => true,
            _ => {
                self.last_tap = Some(at);
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_tap = None;
    }
}

/// Result of a long-press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongPress {
    /// Held too briefly, or an edit is already active.
    Ignored,
    StartNew { minute: i32 },
    StartExisting,
}

/// Turns drags, taps and long-presses into session changes.
pub struct GestureTranslator {
    live: Arc<LiveCoordinates>,
    config: EditorConfig,
    geometry: ColumnGeometry,
    commands: mpsc::UnboundedSender<EditorCommand>,
    drag: Option<ActiveDrag>,
    taps: TapRecognizer,
}

impl GestureTranslator {
    pub fn new(
        live: Arc<LiveCoordinates>,
        config: &EditorConfig,
        geometry: ColumnGeometry,
        commands: mpsc::UnboundedSender<EditorCommand>,
    ) -> Self {
        let config = config.validated();
        Self {
            taps: TapRecognizer::new(Duration::from_millis(config.double_tap_max_ms)),
            live,
            config,
            geometry,
            commands,
            drag: None,
        }
    }

    /// The column was resized. Takes effect from the next drag update.
    pub fn set_geometry(&mut self, geometry: ColumnGeometry) {
        self.geometry = geometry;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Start a drag. Returns false when there is no active edit.
    ///
    /// A drag cancels any pending first tap so one physical gesture never
    /// counts as both.
    pub fn begin_drag(&mut self, target: DragTarget) -> bool {
        if !self.live.is_editing() {
            return false;
        }
        self.taps.reset();
        self.drag = Some(ActiveDrag {
            target,
            snapshot: self.live.snapshot(),
        });
        true
    }

    /// Apply the total translation since the drag began.
    pub fn update_drag(&mut self, dx: f64, dy: f64) -> Option<SessionCoordinates> {
        let drag = self.drag?;
        let coords = self.translate(drag, dx, dy);
        self.live.publish(coords);
        Some(coords)
    }

    /// Finish the drag: snap, publish and notify the controller.
    pub fn end_drag(&mut self, dx: f64, dy: f64) -> Option<SessionCoordinates> {
        let drag = self.drag.take()?;
        let min = self.config.min_duration_min;
        let snap = self.config.snap_minutes;
        let moved = self.translate(drag, dx, dy);
        let coords = match drag.target {
            DragTarget::Handle(handle) => {
                moved.with_handle(handle, moved.handle(handle).snapped(snap), min)
            }
            DragTarget::Body => {
                let snapped = SessionCoordinates::new(moved.start.snapped(snap), moved.end.snapped(snap));
                snapped.with_start(snapped.start, min)
            }
        };
        self.live.publish(coords);
        debug!(grabbed = ?drag.target, start = ?coords.start, end = ?coords.end, "drag finished");
        self.send(EditorCommand::GestureFinished);
        Some(coords)
    }

    /// Platform cancelled the drag; restore where it started.
    pub fn cancel_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            self.live.publish(drag.snapshot);
        }
    }

    /// A tap on the edited interval. Two within the window delete it.
    pub fn tap(&mut self, at: Instant) -> bool {
        if self.is_dragging() || !self.live.is_editing() {
            return false;
        }
        if self.taps.register(at) {
            debug!("double tap");
            self.send(EditorCommand::Delete);
            return true;
        }
        false
    }

    /// A press held for `held` at height `y` in the `day` column.
    ///
    /// `hit` is the interval under the press, if any. Nothing happens while
    /// an edit is active; the user must finish it first.
    pub fn long_press(
        &mut self,
        day: DayKey,
        y: f64,
        held: Duration,
        hit: Option<&SleepInterval>,
    ) -> LongPress {
        if held < Duration::from_millis(self.config.long_press_min_ms) || self.live.is_editing() {
            return LongPress::Ignored;
        }
        match hit {
            Some(interval) => {
                self.send(EditorCommand::StartExisting {
                    interval: interval.clone(),
                    day,
                });
                LongPress::StartExisting
            }
            None => {
                let minute = self
                    .geometry
                    .minute_at(y)
                    .clamp(0, MINUTES_PER_DAY - self.config.min_duration_min);
                self.send(EditorCommand::StartNew { day, minute });
                LongPress::StartNew { minute }
            }
        }
    }

    fn translate(&self, drag: ActiveDrag, dx: f64, dy: f64) -> SessionCoordinates {
        let minutes = self.geometry.minutes_for_dy(dy);
        match drag.target {
            DragTarget::Handle(handle) => {
                let days = self.geometry.days_for_dx(dx, 1.0);
                let candidate = drag.snapshot.handle(handle).shifted(minutes, days);
                self.live
                    .snapshot()
                    .with_handle(handle, candidate, self.config.min_duration_min)
            }
            DragTarget::Body => {
                let days = self
                    .geometry
                    .days_for_dx(dx, self.config.body_day_shift_fraction);
                drag.snapshot.shifted(minutes, days)
            }
        }
    }

    fn send(&self, command: EditorCommand) {
        if self.commands.send(command).is_err() {
            debug!("editor controller is gone");
        }
    }
}
