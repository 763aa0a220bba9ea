use std::collections::BTreeMap;

use clap::Subcommand;
use serde_json::json;
use sleeplog_core::{DayKey, SegmentStore};

use super::{open_store, print_json, CmdResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Total sleep for one local day (YYYY-MM-DD)
    Day { day: String },
    /// Totals for every day in a range, inclusive. Days with no sleep read 0
    Range { from: String, to: String },
}

pub async fn run(action: StatsAction) -> CmdResult {
    let store = open_store()?;

    match action {
        StatsAction::Day { day } => {
            let day: DayKey = day.parse()?;
            let total = store
                .day_aggregate(day)
                .await?
                .map_or(0, |agg| agg.total_minutes);
            print_json(&json!({ "local_date": day, "total_minutes": total }))?;
        }
        StatsAction::Range { from, to } => {
            let from: DayKey = from.parse()?;
            let to: DayKey = to.parse()?;
            if to < from {
                return Err(format!("range end {to} is before start {from}").into());
            }
            let totals: BTreeMap<DayKey, i64> = store
                .aggregates_between(from, to)
                .await?
                .into_iter()
                .map(|agg| (agg.local_date, agg.total_minutes))
                .collect();
            let days: Vec<_> = from
                .range_inclusive(to)
                .into_iter()
                .map(|day| {
                    let total = totals.get(&day).copied().unwrap_or(0);
                    json!({ "local_date": day, "total_minutes": total })
                })
                .collect();
            print_json(&days)?;
        }
    }
    Ok(())
}
