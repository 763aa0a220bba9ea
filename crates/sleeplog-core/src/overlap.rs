//! Conflict check between a candidate interval and committed intervals.

use chrono::{DateTime, Utc};

use crate::interval::SleepInterval;

/// Strict overlap of two half-open spans. Touching endpoints do not conflict.
pub fn spans_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start.max(b_start) < a_end.min(b_end)
}

/// Whether `[candidate_start, candidate_end)` conflicts with any closed
/// interval in `committed` other than `exclude_id`.
///
/// A non-positive candidate always conflicts. Open intervals never block.
pub fn has_overlap(
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
    exclude_id: Option<&str>,
    committed: &[SleepInterval],
) -> bool {
    if candidate_end <= candidate_start {
        return true;
    }
    first_conflict(candidate_start, candidate_end, exclude_id, committed).is_some()
}

/// The first committed interval that conflicts with the candidate, if any.
pub fn first_conflict<'a>(
    candidate_start: DateTime<Utc>,
    candidate_end: DateTime<Utc>,
    exclude_id: Option<&str>,
    committed: &'a [SleepInterval],
) -> Option<&'a SleepInterval> {
    committed
        .iter()
        .filter(|iv| Some(iv.id.as_str()) != exclude_id)
        .find(|iv| match iv.end {
            Some(end) => spans_overlap(candidate_start, candidate_end, iv.start, end),
            None => false,
        })
}
