use clap::Subcommand;
use serde_json::json;
use sleeplog_core::{DayKey, IntervalSource, SegmentStore};

use super::{open_store, parse_instant, print_json, CmdResult};

#[derive(Subcommand)]
pub enum IntervalAction {
    /// Begin recording a sleep now
    Start {
        /// How the interval was started ("manual" or "automated")
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Stop the most recent recording
    Stop {
        /// End time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// List intervals
    List {
        /// Only intervals overlapping this local day (YYYY-MM-DD)
        #[arg(long)]
        day: Option<String>,
        /// Maximum number of recent intervals
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one interval
    Get {
        id: String,
    },
    /// Delete an interval
    Delete {
        id: String,
    },
}

pub async fn run(action: IntervalAction) -> CmdResult {
    let store = open_store()?;

    match action {
        IntervalAction::Start { source } => {
            let source: IntervalSource = source.parse()?;
            let id = store.create_open_interval(source).await?;
            print_json(&json!({ "id": id }))?;
        }
        IntervalAction::Stop { at } => {
            let end = at.as_deref().map(parse_instant).transpose()?;
            match store.close_most_recent_open_interval(end).await? {
                Some(id) => print_json(&json!({ "id": id }))?,
                None => print_json(&json!({ "id": null, "message": "no recording in progress" }))?,
            }
        }
        IntervalAction::List { day, limit } => {
            let intervals = match day {
                Some(day) => {
                    let day: DayKey = day.parse()?;
                    store.intervals_overlapping_local_day(day).await?
                }
                None => store.list_recent(limit).await?,
            };
            print_json(&intervals)?;
        }
        IntervalAction::Get { id } => match store.get_interval(&id).await? {
            Some(interval) => print_json(&interval)?,
            None => return Err(format!("interval not found: {id}").into()),
        },
        IntervalAction::Delete { id } => {
            store.delete_interval(&id).await?;
            println!("ok");
        }
    }
    Ok(())
}
