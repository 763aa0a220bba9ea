//! Temporal coordinate model.
//!
//! Pure helpers mapping UTC instants to local calendar days and
//! minutes-since-midnight, and splitting intervals on local-day boundaries.

mod day_key;
mod local;

pub use day_key::DayKey;
pub use local::{DaySlice, LocalCalendar, MinuteSpan, MINUTES_PER_DAY};
