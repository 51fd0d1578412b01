use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Completed-Occurrence Ledger: master id to the set of completed dates.
///
/// Serialized as a map of master id to a list of `yyyy-MM-dd` strings.
/// Only recurring masters have entries, and an entry never holds an empty set.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Ledger(BTreeMap<String, BTreeSet<NaiveDate>>);

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self, master_id: &str, date: NaiveDate) -> bool {
        self.0
            .get(master_id)
            .is_some_and(|dates| dates.contains(&date))
    }

    /// Flips membership of `date` and returns the new completion state.
    pub fn toggle(&mut self, master_id: &str, date: NaiveDate) -> bool {
        let dates = self.0.entry(master_id.to_string()).or_default();
        let completed = if dates.remove(&date) {
            false
        } else {
            dates.insert(date);
            true
        };
        if dates.is_empty() {
            self.0.remove(master_id);
        }
        completed
    }

    /// Drops every completion recorded for `master_id`.
    pub fn purge(&mut self, master_id: &str) -> bool {
        self.0.remove(master_id).is_some()
    }

    /// Marks every date in `dates` completed for `master_id`.
    pub fn restore(&mut self, master_id: &str, dates: impl IntoIterator<Item = NaiveDate>) {
        let mut dates = dates.into_iter().peekable();
        if dates.peek().is_some() {
            self.0.entry(master_id.to_string()).or_default().extend(dates);
        }
    }

    pub fn dates(&self, master_id: &str) -> impl Iterator<Item = NaiveDate> + '_ {
        self.0.get(master_id).into_iter().flatten().copied()
    }

    pub fn master_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
