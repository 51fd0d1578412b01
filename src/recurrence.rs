use chrono::{Datelike, FixedOffset, NaiveDate};

use crate::models::{MasterTask, Recurrence};

/// Calendar date of the task's anchor as seen in `offset`.
pub fn anchor_date(task: &MasterTask, offset: FixedOffset) -> Option<NaiveDate> {
    task.start_time
        .map(|start| start.with_timezone(&offset).date_naive())
}

/// Decides whether `task` occurs on `date`.
///
/// Dates before the anchor never match. Monthly tasks anchored on a day a
/// month lacks (e.g. the 31st) skip that month rather than clamping, and a
/// yearly task anchored on Feb 29 only occurs in leap years. A task without
/// a start time never occurs.
pub fn occurs_on(task: &MasterTask, date: NaiveDate, offset: FixedOffset) -> bool {
    let anchor = match anchor_date(task, offset) {
        Some(anchor) => anchor,
        None => return false,
    };
    match task.recurrence {
        Recurrence::None => date == anchor,
        _ if date < anchor => false,
        Recurrence::Daily => true,
        Recurrence::Weekly => date.weekday() == anchor.weekday(),
        Recurrence::Monthly => date.day() == anchor.day(),
        Recurrence::Yearly => date.month() == anchor.month() && date.day() == anchor.day(),
    }
}
