//! SQLite-backed [`SegmentStore`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat, TimeZone, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::segment_store::SegmentStore;
use super::worker::{DbLocation, DbWorker};
use crate::calendar::{DayKey, LocalCalendar};
use crate::error::{Result, ValidationError};
use crate::interval::{DayAggregate, IntervalSource, SleepInterval};

const INTERVAL_COLUMNS: &str = "id, start_at, end_at, source, created_at, updated_at";

/// Sleep interval store on a SQLite file (or memory, for tests).
///
/// Day windows and aggregates follow the store's [`LocalCalendar`].
#[derive(Clone)]
pub struct SqliteSegmentStore<Tz: TimeZone = Local> {
    worker: DbWorker,
    calendar: LocalCalendar<Tz>,
}

impl SqliteSegmentStore<Local> {
    /// Open `<data_dir>/<file_name>` using the device timezone.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_default(file_name: &str) -> Result<Self> {
        let path = super::data_dir()?.join(file_name);
        Self::open(path, LocalCalendar::system())
    }
}

impl<Tz> SqliteSegmentStore<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    /// Open (creating and migrating if needed) the database at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: PathBuf, calendar: LocalCalendar<Tz>) -> Result<Self> {
        let worker = DbWorker::spawn(DbLocation::File(path))?;
        Ok(Self { worker, calendar })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory(calendar: LocalCalendar<Tz>) -> Result<Self> {
        let worker = DbWorker::spawn(DbLocation::Memory)?;
        Ok(Self { worker, calendar })
    }

    pub fn calendar(&self) -> &LocalCalendar<Tz> {
        &self.calendar
    }
}

#[async_trait]
impl<Tz> SegmentStore for SqliteSegmentStore<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    async fn create_open_interval(&self, source: IntervalSource) -> Result<String> {
        let calendar = self.calendar.clone();
        let interval = SleepInterval::open(Utc::now(), source);
        let id = interval.id.clone();
        self.worker
            .execute(move |conn| {
                let tx = conn.transaction()?;
                insert_interval(&tx, &interval)?;
                let days = calendar.days_touched(interval.start, None);
                recompute_days(&tx, &calendar, &days)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        info!(interval_id = %id, %source, "opened interval");
        Ok(id)
    }

    async fn close_most_recent_open_interval(
        &self,
        end: Option<DateTime<Utc>>,
    ) -> Result<Option<String>> {
        let calendar = self.calendar.clone();
        let end = end.unwrap_or_else(Utc::now);
        let closed = self
            .worker
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let open = tx
                    .query_row(
                        &format!(
                            "SELECT {INTERVAL_COLUMNS} FROM intervals
                             WHERE end_at IS NULL
                             ORDER BY start_at DESC
                             LIMIT 1"
                        ),
                        [],
                        row_to_interval,
                    )
                    .optional()?;

                let Some(open) = open else {
                    return Ok(None);
                };
                if end <= open.start {
                    return Err(ValidationError::InvalidTimeRange {
                        start: open.start,
                        end,
                    }
                    .into());
                }

                tx.execute(
                    "UPDATE intervals SET end_at = ?1, updated_at = ?2 WHERE id = ?3",
                    params![fmt_ts(end), fmt_ts(Utc::now()), open.id],
                )?;
                let days = calendar.days_touched(open.start, Some(end));
                recompute_days(&tx, &calendar, &days)?;
                tx.commit()?;
                Ok(Some(open.id))
            })
            .await?;

        match &closed {
            Some(id) => info!(interval_id = %id, "closed interval"),
            None => debug!("no open interval to close"),
        }
        Ok(closed)
    }

    async fn upsert_interval(&self, interval: SleepInterval) -> Result<String> {
        if let Some(end) = interval.end {
            if end <= interval.start {
                return Err(ValidationError::InvalidTimeRange {
                    start: interval.start,
                    end,
                }
                .into());
            }
        }

        let calendar = self.calendar.clone();
        let id = interval.id.clone();
        self.worker
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let previous = select_interval(&tx, &interval.id)?;
                let now = Utc::now();
                tx.execute(
                    "INSERT INTO intervals (id, start_at, end_at, source, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        start_at = excluded.start_at,
                        end_at = excluded.end_at,
                        source = excluded.source,
                        updated_at = excluded.updated_at",
                    params![
                        interval.id,
                        fmt_ts(interval.start),
                        interval.end.map(fmt_ts),
                        interval.source.as_str(),
                        fmt_ts(interval.created_at),
                        fmt_ts(now),
                    ],
                )?;

                // Days the interval used to touch are refreshed too, so a
                // move never leaves a stale total behind.
                let mut days: BTreeSet<DayKey> = calendar
                    .days_touched(interval.start, interval.end)
                    .into_iter()
                    .collect();
                if let Some(prev) = previous {
                    days.extend(calendar.days_touched(prev.start, prev.end));
                }
                let days: Vec<DayKey> = days.into_iter().collect();
                recompute_days(&tx, &calendar, &days)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        debug!(interval_id = %id, "upserted interval");
        Ok(id)
    }

    async fn delete_interval(&self, id: &str) -> Result<()> {
        let calendar = self.calendar.clone();
        let id = id.to_string();
        let deleted = self
            .worker
            .execute(move |conn| {
                let tx = conn.transaction()?;
                let Some(previous) = select_interval(&tx, &id)? else {
                    return Ok(None);
                };
                tx.execute("DELETE FROM intervals WHERE id = ?1", params![id])?;
                let days = calendar.days_touched(previous.start, previous.end);
                recompute_days(&tx, &calendar, &days)?;
                tx.commit()?;
                Ok(Some(previous.id))
            })
            .await?;
        if let Some(id) = deleted {
            info!(interval_id = %id, "deleted interval");
        }
        Ok(())
    }

    async fn get_interval(&self, id: &str) -> Result<Option<SleepInterval>> {
        let id = id.to_string();
        self.worker
            .execute(move |conn| select_interval(conn, &id))
            .await
    }

    async fn intervals_overlapping_local_day(&self, day: DayKey) -> Result<Vec<SleepInterval>> {
        let (window_start, window_end) = self.calendar.day_window(day);
        self.worker
            .execute(move |conn| select_overlapping(conn, window_start, window_end, false))
            .await
    }

    async fn closed_intervals_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SleepInterval>> {
        self.worker
            .execute(move |conn| select_overlapping(conn, start, end, true))
            .await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<SleepInterval>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.worker
            .execute(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {INTERVAL_COLUMNS} FROM intervals ORDER BY start_at DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], row_to_interval)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }

    async fn import_intervals(&self, intervals: Vec<SleepInterval>) -> Result<usize> {
        let calendar = self.calendar.clone();
        let count = self
            .worker
            .execute(move |conn| {
                // Dropping `tx` on any early return rolls everything back.
                let tx = conn.transaction()?;
                let mut days = BTreeSet::new();
                for interval in &intervals {
                    if let Some(end) = interval.end {
                        if end <= interval.start {
                            return Err(ValidationError::InvalidTimeRange {
                                start: interval.start,
                                end,
                            }
                            .into());
                        }
                    }
                    insert_interval(&tx, interval)?;
                    days.extend(calendar.days_touched(interval.start, interval.end));
                }
                let days: Vec<DayKey> = days.into_iter().collect();
                recompute_days(&tx, &calendar, &days)?;
                tx.commit()?;
                Ok(intervals.len())
            })
            .await?;
        info!(count, "imported intervals");
        Ok(count)
    }

    async fn day_aggregate(&self, day: DayKey) -> Result<Option<DayAggregate>> {
        self.worker
            .execute(move |conn| {
                let aggregate = conn
                    .query_row(
                        "SELECT local_date, total_minutes, last_computed_at
                         FROM day_aggregates WHERE local_date = ?1",
                        params![day.to_string()],
                        row_to_aggregate,
                    )
                    .optional()?;
                Ok(aggregate)
            })
            .await
    }

    async fn aggregates_between(&self, from: DayKey, to: DayKey) -> Result<Vec<DayAggregate>> {
        self.worker
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT local_date, total_minutes, last_computed_at
                     FROM day_aggregates
                     WHERE local_date >= ?1 AND local_date <= ?2
                     ORDER BY local_date ASC",
                )?;
                let rows = stmt.query_map(
                    params![from.to_string(), to.to_string()],
                    row_to_aggregate,
                )?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await
    }
}

fn insert_interval(conn: &Connection, interval: &SleepInterval) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO intervals (id, start_at, end_at, source, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            interval.id,
            fmt_ts(interval.start),
            interval.end.map(fmt_ts),
            interval.source.as_str(),
            fmt_ts(interval.created_at),
            fmt_ts(interval.updated_at),
        ],
    )?;
    Ok(())
}

fn select_interval(conn: &Connection, id: &str) -> Result<Option<SleepInterval>> {
    let interval = conn
        .query_row(
            &format!("SELECT {INTERVAL_COLUMNS} FROM intervals WHERE id = ?1"),
            params![id],
            row_to_interval,
        )
        .optional()?;
    Ok(interval)
}

/// Half-open overlap: `start < window_end AND (end IS NULL OR end > window_start)`.
fn select_overlapping(
    conn: &Connection,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    closed_only: bool,
) -> Result<Vec<SleepInterval>> {
    let open_clause = if closed_only {
        "end_at IS NOT NULL AND end_at > ?1"
    } else {
        "(end_at IS NULL OR end_at > ?1)"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {INTERVAL_COLUMNS} FROM intervals
         WHERE start_at < ?2 AND {open_clause}
         ORDER BY start_at ASC"
    ))?;
    let rows = stmt.query_map(
        params![fmt_ts(window_start), fmt_ts(window_end)],
        row_to_interval,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Resum every listed day from the intervals overlapping it.
///
/// Open intervals count up to now.
fn recompute_days<Tz: TimeZone>(
    conn: &Connection,
    calendar: &LocalCalendar<Tz>,
    days: &[DayKey],
) -> Result<()> {
    let now = Utc::now();
    for day in days {
        let (window_start, window_end) = calendar.day_window(*day);
        let intervals = select_overlapping(conn, window_start, window_end, false)?;
        let total: i64 = intervals
            .iter()
            .flat_map(|iv| {
                let end = iv.end.unwrap_or(now);
                calendar.split_interval_by_local_day(iv.start, end)
            })
            .filter(|slice| slice.day == *day)
            .map(|slice| slice.minutes())
            .sum();

        conn.execute(
            "INSERT INTO day_aggregates (local_date, total_minutes, last_computed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(local_date) DO UPDATE SET
                total_minutes = excluded.total_minutes,
                last_computed_at = excluded.last_computed_at",
            params![day.to_string(), total, fmt_ts(now)],
        )?;
        debug!(%day, total_minutes = total, "recomputed day aggregate");
    }
    Ok(())
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

fn row_to_interval(row: &Row) -> rusqlite::Result<SleepInterval> {
    let source: String = row.get(3)?;
    Ok(SleepInterval {
        id: row.get(0)?,
        start: parse_ts(&row.get::<_, String>(1)?, 1)?,
        end: row
            .get::<_, Option<String>>(2)?
            .map(|s| parse_ts(&s, 2))
            .transpose()?,
        source: source
            .parse()
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(err)))?,
        created_at: parse_ts(&row.get::<_, String>(4)?, 4)?,
        updated_at: parse_ts(&row.get::<_, String>(5)?, 5)?,
    })
}

fn row_to_aggregate(row: &Row) -> rusqlite::Result<DayAggregate> {
    let date: String = row.get(0)?;
    Ok(DayAggregate {
        local_date: date
            .parse()
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))?,
        total_minutes: row.get(1)?,
        last_computed_at: parse_ts(&row.get::<_, String>(2)?, 2)?,
    })
}
