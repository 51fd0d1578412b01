use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{Occurrence, Priority};
use crate::store::TaskStore;

/// Summary of a day for the morning briefing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBriefing {
    pub date: NaiveDate,
    pub load: f64,
    /// Up to three open occurrences, most important first.
    pub top_tasks: Vec<Occurrence>,
    /// Every open high-priority occurrence.
    pub at_risk: Vec<Occurrence>,
    pub next_up: Option<Occurrence>,
}

pub fn briefing(store: &TaskStore, date: NaiveDate, now: DateTime<Utc>) -> DailyBriefing {
    let open: Vec<Occurrence> = store
        .occurrences_on(date)
        .into_iter()
        .filter(|o| !o.is_completed() && !o.task.is_holiday)
        .collect();

    let mut top_tasks = open.clone();
    // stable: equal priorities keep start-time order
    top_tasks.sort_by_key(|o| o.task.priority.rank());
    top_tasks.truncate(3);

    let at_risk = open
        .iter()
        .filter(|o| o.task.priority == Priority::High)
        .cloned()
        .collect();

    let next_up = open
        .iter()
        .find(|o| o.start().is_some_and(|start| start >= now))
        .cloned();

    DailyBriefing {
        date,
        load: store.load_factor(date),
        top_tasks,
        at_risk,
        next_up,
    }
}
