//! # Sleeplog Core Library
//!
//! Core logic for a sleep log with a touch-driven timeline editor. The CLI
//! binary and any GUI shell are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Calendar**: local day keys and minute-of-day arithmetic, DST aware
//! - **Storage**: SQLite interval store with per-day aggregates, TOML configuration
//! - **Overlap**: conflict checks between a candidate and committed intervals
//! - **Editor**: edit session state machine, gesture translation and the
//!   coordinates shared with the renderer
//!
//! ## Key Components
//!
//! - [`SegmentStore`]: async storage contract, backed by [`SqliteSegmentStore`]
//! - [`EditController`]: owner of the active edit session
//! - [`GestureTranslator`]: pointer input to coordinate changes
//! - [`Config`]: application configuration management

pub mod calendar;
pub mod editor;
pub mod error;
pub mod events;
pub mod interval;
pub mod overlap;
pub mod storage;

pub use calendar::{DayKey, LocalCalendar, MINUTES_PER_DAY};
pub use editor::{EditController, EditPhase, EditorCommand, GestureTranslator, LiveCoordinates};
pub use error::{ConfigError, CoreError, DatabaseError, EditError, ValidationError};
pub use events::Event;
pub use interval::{DayAggregate, IntervalSource, SleepInterval};
pub use overlap::has_overlap;
pub use storage::{Config, EditorConfig, SegmentStore, SqliteSegmentStore};
