//! Asynchronous contract for durable sleep interval storage.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::calendar::DayKey;
use crate::error::Result;
use crate::interval::{DayAggregate, IntervalSource, SleepInterval};

/// CRUD over sleep intervals plus the per-day aggregate cache.
///
/// Every write recomputes, by full resummation, the aggregate of each local
/// day the written interval touches. Each write is atomic per row, so
/// concurrent readers see either the old or the new state.
#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// Insert an open interval starting now. Returns its id.
    async fn create_open_interval(&self, source: IntervalSource) -> Result<String>;

    /// Close the latest open interval at `end` (default now).
    ///
    /// Returns `Ok(None)` when nothing is open.
    async fn close_most_recent_open_interval(
        &self,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<String>>;

    /// Insert or update by id. Returns the id.
    async fn upsert_interval(&self, interval: SleepInterval) -> Result<String>;

    /// Remove an interval. Unknown ids are a no-op.
    async fn delete_interval(&self, id: &str) -> Result<()>;

    async fn get_interval(&self, id: &str) -> Result<Option<SleepInterval>>;

    /// Intervals overlapping `[midnight(day), midnight(day + 1))`, open ones included.
    async fn intervals_overlapping_local_day(&self, day: DayKey) -> Result<Vec<SleepInterval>>;

    /// Closed intervals overlapping `[start, end)`.
    async fn closed_intervals_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SleepInterval>>;

    /// Most recent intervals by start, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<SleepInterval>>;

    /// Insert many intervals in one transaction. Nothing is kept on failure.
    async fn import_intervals(&self, intervals: Vec<SleepInterval>) -> Result<usize>;

    async fn day_aggregate(&self, day: DayKey) -> Result<Option<DayAggregate>>;

    /// Aggregates for `from..=to` that have been computed, ordered by date.
    async fn aggregates_between(&self, from: DayKey, to: DayKey) -> Result<Vec<DayAggregate>>;

    /// Intervals overlapping each requested day, for the rendering layer.
    async fn intervals_for_days(
        &self,
        days: &[DayKey],
    ) -> Result<BTreeMap<DayKey, Vec<SleepInterval>>> {
        let mut by_day = BTreeMap::new();
        for day in days {
            let intervals = self.intervals_overlapping_local_day(*day).await?;
            by_day.insert(*day, intervals);
        }
        Ok(by_day)
    }
}
