use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::collaborators::{ParsedSchedule, Rebalancer};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::holidays::holidays_for_years;
use crate::ledger::Ledger;
use crate::models::{MasterTask, Occurrence, Suggestion, TaskRef};
use crate::occurrence::{compose, Materializer};
use crate::recurrence::occurs_on;
use crate::reminders::Snapshot;

/// The persisted document; also the backup/restore format.
///
/// All four fields are required when reading one back.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    pub tasks: Vec<MasterTask>,
    pub unscheduled_tasks: Vec<MasterTask>,
    pub suggestions: Vec<Suggestion>,
    pub completed_occurrences: Ledger,
}

/// The most recently deleted master, restorable until the undo window ends.
///
/// Carries the completed dates purged with it and its position in its
/// collection, so undo puts both back as they were.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingUndo {
    pub task: MasterTask,
    pub deleted_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Calendar offset used to project timestamps onto days.
    pub offset: FixedOffset,
    pub undo_window: Duration,
    pub load_baseline_minutes: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            undo_window: Duration::seconds(5),
            load_baseline_minutes: 8 * 60,
        }
    }
}

impl StoreSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            offset: config.calendar.offset(),
            undo_window: Duration::seconds(config.store.undo_seconds as i64),
            load_baseline_minutes: config.store.load_baseline_minutes,
        }
    }
}

/// Outcome of handing the schedule to a [`Rebalancer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceOutcome {
    Applied { moved: usize },
    /// The proposal was discarded and the previous schedule kept.
    Reverted { reason: String },
}

/// Counts from importing a [`ParsedSchedule`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub scheduled: usize,
    pub unscheduled: usize,
    pub rejected: usize,
    pub suggestions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Scheduled,
    Unscheduled,
}

/// Where a [`TaskRef`] landed: the collection, index, and the instance date
/// when it was addressed through an instance id.
struct Located {
    collection: Collection,
    index: usize,
    date: Option<NaiveDate>,
}

/// Owns the master collections, the suggestions and the ledger.
///
/// All mutation goes through `&mut self`, so operations never interleave.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    scheduled: Vec<MasterTask>,
    unscheduled: Vec<MasterTask>,
    suggestions: Vec<Suggestion>,
    ledger: Ledger,
    holidays: Vec<MasterTask>,
    pending_undo: Option<PendingUndo>,
    settings: StoreSettings,
}

impl TaskStore {
    pub fn new(settings: StoreSettings) -> Self {
        TaskStore {
            settings,
            ..Default::default()
        }
    }

    /// Adds system-generated holidays for `years`.
    pub fn with_holidays(mut self, years: RangeInclusive<i32>) -> Self {
        self.holidays = holidays_for_years(years, self.settings.offset);
        self
    }

    /// Builds a store from a persisted document, validating it first.
    pub fn from_document(doc: BackupData, settings: StoreSettings) -> Result<Self> {
        let mut store = TaskStore::new(settings);
        store.restore(doc)?;
        Ok(store)
    }

    pub fn to_document(&self) -> BackupData {
        BackupData {
            tasks: self.scheduled.clone(),
            unscheduled_tasks: self.unscheduled.clone(),
            suggestions: self.suggestions.clone(),
            completed_occurrences: self.ledger.clone(),
        }
    }

    pub fn scheduled(&self) -> &[MasterTask] {
        &self.scheduled
    }

    pub fn unscheduled(&self) -> &[MasterTask] {
        &self.unscheduled
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn holidays(&self) -> &[MasterTask] {
        &self.holidays
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn offset(&self) -> FixedOffset {
        self.settings.offset
    }

    /// View over every master; unscheduled ones never occur on a date but
    /// can still be resolved by id.
    pub fn materializer(&self) -> Materializer<'_> {
        Materializer::new(
            self.scheduled
                .iter()
                .chain(self.holidays.iter())
                .chain(self.unscheduled.iter()),
            &self.ledger,
            self.settings.offset,
        )
    }

    pub fn occurrences_on(&self, date: NaiveDate) -> Vec<Occurrence> {
        self.materializer().occurrences_on(date)
    }

    pub fn occurrences_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<(NaiveDate, Vec<Occurrence>)> {
        self.materializer().occurrences_between(from, to)
    }

    pub fn resolve_occurrence(&self, target: &TaskRef) -> Option<Occurrence> {
        self.materializer().resolve(target)
    }

    /// Read-only copy of what the reminder scheduler needs.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::new(Snapshot {
            masters: self.scheduled.clone(),
            ledger: self.ledger.clone(),
            offset: self.settings.offset,
        })
    }

    fn position(&self, id: &str) -> Option<(Collection, usize)> {
        if let Some(i) = self.scheduled.iter().position(|t| t.id == id) {
            return Some((Collection::Scheduled, i));
        }
        self.unscheduled
            .iter()
            .position(|t| t.id == id)
            .map(|i| (Collection::Unscheduled, i))
    }

    /// Finds the master behind `target`. An instance id only locates its
    /// master while the date is still an occurrence of it.
    fn locate(&self, target: &TaskRef) -> Option<Located> {
        let literal = target.to_string();
        if let Some((collection, index)) = self.position(&literal) {
            return Some(Located { collection, index, date: None });
        }
        let (collection, index) = self.position(target.master_id())?;
        let date = target.date();
        if let Some(date) = date {
            let master = match collection {
                Collection::Scheduled => &self.scheduled[index],
                Collection::Unscheduled => &self.unscheduled[index],
            };
            if !occurs_on(master, date, self.settings.offset) {
                debug!(target = %literal, "instance date is not an occurrence");
                return None;
            }
        }
        Some(Located { collection, index, date })
    }

    fn is_holiday(&self, target: &TaskRef) -> bool {
        let literal = target.to_string();
        self.holidays
            .iter()
            .any(|h| h.id == literal || h.id == target.master_id())
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut Vec<MasterTask> {
        match collection {
            Collection::Scheduled => &mut self.scheduled,
            Collection::Unscheduled => &mut self.unscheduled,
        }
    }

    fn contains_id(&self, id: &str) -> bool {
        self.position(id).is_some() || self.holidays.iter().any(|h| h.id == id)
    }

    /// Adds masters, routing each by whether it has a start time.
    ///
    /// Tasks reusing an id already in the store are skipped. Returns how
    /// many were added.
    pub fn add_masters(&mut self, tasks: impl IntoIterator<Item = MasterTask>) -> usize {
        let mut added = 0;
        for task in tasks {
            if self.contains_id(&task.id) {
                warn!(id = %task.id, "skipping task with duplicate id");
                continue;
            }
            debug!(id = %task.id, scheduled = task.start_time.is_some(), "adding task");
            if task.start_time.is_some() {
                self.scheduled.push(task);
            } else {
                self.unscheduled.push(task);
            }
            added += 1;
        }
        added
    }

    pub fn set_suggestions(&mut self, suggestions: Vec<Suggestion>) {
        self.suggestions = suggestions;
    }

    /// Replaces the master addressed by `target` with `updated`.
    ///
    /// The change applies to every occurrence of a recurring master. When
    /// `target` is an instance id, a changed start time is read relative to
    /// that occurrence and shifts the whole series by the same amount. The
    /// master moves between the scheduled and unscheduled collections to
    /// match the presence of a start time.
    pub fn update_master(&mut self, target: &TaskRef, updated: MasterTask) -> Result<()> {
        if self.is_holiday(target) {
            return Err(Error::ImmutableHoliday(target.to_string()));
        }
        let located = self
            .locate(target)
            .ok_or_else(|| Error::TaskNotFound(target.to_string()))?;
        let current = self.collection_mut(located.collection)[located.index].clone();

        let mut updated = updated;
        updated.id = current.id.clone();
        updated.is_holiday = false;
        if let (Some(date), true) = (located.date, current.is_recurring()) {
            let occurrence_start = current
                .start_time
                .and_then(|anchor| compose(anchor, date, self.settings.offset));
            if let (Some(anchor), Some(occurrence_start), Some(new_start)) =
                (current.start_time, occurrence_start, updated.start_time)
            {
                updated.start_time = Some(anchor + (new_start - occurrence_start));
            }
        }
        if !updated.is_recurring() && self.ledger.purge(&updated.id) {
            debug!(id = %updated.id, "recurrence removed, ledger entry purged");
        }

        let destination = if updated.start_time.is_some() {
            Collection::Scheduled
        } else {
            Collection::Unscheduled
        };
        debug!(id = %updated.id, ?destination, "updating task");
        if destination == located.collection {
            self.collection_mut(destination)[located.index] = updated;
        } else {
            self.collection_mut(located.collection).remove(located.index);
            self.collection_mut(destination).push(updated);
        }
        Ok(())
    }

    /// Moves a master to the unscheduled collection, clearing its start time.
    pub fn unschedule(&mut self, target: &TaskRef) -> Result<()> {
        let located = self
            .locate(target)
            .ok_or_else(|| Error::TaskNotFound(target.to_string()))?;
        let mut task = self.collection_mut(located.collection)[located.index].clone();
        task.start_time = None;
        self.update_master(&TaskRef::Master(task.id.clone()), task)
    }

    /// Gives an unscheduled master a start time and moves it to the schedule.
    pub fn schedule_unscheduled(&mut self, id: &str, start: DateTime<Utc>) -> Result<()> {
        let index = self
            .unscheduled
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
        let mut task = self.unscheduled.remove(index);
        task.start_time = Some(start);
        debug!(id = %task.id, %start, "scheduling task");
        self.scheduled.push(task);
        Ok(())
    }

    /// Deletes the master behind `target`; an instance id deletes its series.
    ///
    /// The removed task becomes the single pending undo, replacing any older
    /// one, and its ledger entry is purged. Unknown ids and instance ids
    /// whose date is not an occurrence are a no-op.
    pub fn delete_master(&mut self, target: &TaskRef, now: DateTime<Utc>) -> Option<MasterTask> {
        let located = self.locate(target)?;
        let task = self.collection_mut(located.collection).remove(located.index);
        let completed_dates: Vec<NaiveDate> = self.ledger.dates(&task.id).collect();
        self.ledger.purge(&task.id);
        if let Some(previous) = &self.pending_undo {
            debug!(id = %previous.task.id, "discarding older pending undo");
        }
        self.pending_undo = Some(PendingUndo {
            task: task.clone(),
            deleted_at: now,
            completed_dates,
            position: located.index,
        });
        info!(id = %task.id, title = %task.title, "task deleted");
        Some(task)
    }

    /// The pending undo, if its window is still open at `now`.
    pub fn pending_undo(&self, now: DateTime<Utc>) -> Option<&PendingUndo> {
        self.pending_undo
            .as_ref()
            .filter(|pending| now - pending.deleted_at < self.settings.undo_window)
    }

    /// Raw pending slot, regardless of expiry. Used for persistence.
    pub fn pending_undo_record(&self) -> Option<&PendingUndo> {
        self.pending_undo.as_ref()
    }

    pub fn set_pending_undo(&mut self, pending: Option<PendingUndo>) {
        self.pending_undo = pending;
    }

    /// Clears the pending undo once its window has passed.
    pub fn expire_undo(&mut self, now: DateTime<Utc>) -> bool {
        if self.pending_undo.is_some() && self.pending_undo(now).is_none() {
            self.pending_undo = None;
            return true;
        }
        false
    }

    /// Restores the most recently deleted master if still within the window,
    /// back at its old position and with its completed occurrences.
    pub fn undo_delete(&mut self, now: DateTime<Utc>) -> Option<MasterTask> {
        self.expire_undo(now);
        let pending = self.pending_undo.take()?;
        let task = pending.task;
        if self.contains_id(&task.id) {
            warn!(id = %task.id, "cannot undo, id is in use again");
            return None;
        }
        let collection = if task.start_time.is_some() {
            Collection::Scheduled
        } else {
            Collection::Unscheduled
        };
        let tasks = self.collection_mut(collection);
        let position = pending.position.min(tasks.len());
        tasks.insert(position, task.clone());
        if task.is_recurring() {
            self.ledger.restore(&task.id, pending.completed_dates);
        }
        info!(id = %task.id, position, "delete undone");
        Some(task)
    }

    /// Flips completion of the occurrence of `target` on `date`.
    ///
    /// Non-recurring masters flip their own flag. Recurring masters toggle
    /// the ledger entry for the instance date (from `target` when it is an
    /// instance id, else `date`), which must be a date the task occurs on.
    /// Returns the new completion state.
    pub fn toggle_completion(&mut self, target: &TaskRef, date: NaiveDate) -> Result<bool> {
        if self.is_holiday(target) {
            return Err(Error::ImmutableHoliday(target.to_string()));
        }
        let located = self
            .locate(target)
            .ok_or_else(|| Error::TaskNotFound(target.to_string()))?;
        let offset = self.settings.offset;
        let task = &mut self.collection_mut(located.collection)[located.index];
        if !task.is_recurring() {
            task.completed = !task.completed;
            debug!(id = %task.id, completed = task.completed, "toggled completion");
            return Ok(task.completed);
        }
        let date = located.date.unwrap_or(date);
        if !occurs_on(task, date, offset) {
            return Err(Error::TaskNotFound(format!("{}_{}", task.id, date)));
        }
        let id = task.id.clone();
        let completed = self.ledger.toggle(&id, date);
        debug!(%id, %date, completed, "toggled occurrence completion");
        Ok(completed)
    }

    /// Marks an occurrence done. Returns `false` if it already was.
    pub fn complete_occurrence(&mut self, target: &TaskRef, date: NaiveDate) -> Result<bool> {
        let occurrence = match target {
            TaskRef::Instance(_) => self.resolve_occurrence(target),
            TaskRef::Master(_) => self.resolve_occurrence(target).and_then(|o| {
                if o.task.is_recurring() {
                    self.materializer().project(&o.task, date)
                } else {
                    Some(o)
                }
            }),
        }
        .ok_or_else(|| Error::TaskNotFound(target.to_string()))?;
        if occurrence.is_completed() {
            return Ok(false);
        }
        self.toggle_completion(&occurrence.task_ref(), date)?;
        Ok(true)
    }

    /// Sum of the day's durations over the baseline, capped at 1.0.
    pub fn load_factor(&self, date: NaiveDate) -> f64 {
        let minutes: u64 = self
            .occurrences_on(date)
            .iter()
            .map(|o| u64::from(o.task.duration))
            .sum();
        if self.settings.load_baseline_minutes == 0 {
            return if minutes > 0 { 1.0 } else { 0.0 };
        }
        (minutes as f64 / f64::from(self.settings.load_baseline_minutes)).min(1.0)
    }

    /// Replaces the scheduled collection. Holidays are never stored.
    pub fn set_schedule(&mut self, tasks: Vec<MasterTask>) {
        self.scheduled = tasks.into_iter().filter(|t| !t.is_holiday).collect();
    }

    /// Asks `rebalancer` for new start times and applies them only if the
    /// proposal covers exactly the scheduled ids, keeps every task scheduled
    /// and leaves recurrence untouched.
    pub fn rebalance(&mut self, rebalancer: &dyn Rebalancer) -> RebalanceOutcome {
        if self.scheduled.is_empty() {
            return RebalanceOutcome::Applied { moved: 0 };
        }
        let proposal = match rebalancer.rebalance(&self.scheduled) {
            Ok(proposal) => proposal,
            Err(e) => return self.revert(e.to_string()),
        };
        if let Err(reason) = check_proposal(&self.scheduled, &proposal) {
            return self.revert(reason);
        }
        let starts: HashMap<&str, Option<DateTime<Utc>>> = proposal
            .iter()
            .map(|t| (t.id.as_str(), t.start_time))
            .collect();
        let mut rebalanced = self.scheduled.clone();
        let mut moved = 0;
        for task in rebalanced.iter_mut() {
            let start = starts.get(task.id.as_str()).copied().flatten();
            if start != task.start_time {
                task.start_time = start;
                moved += 1;
            }
        }
        self.set_schedule(rebalanced);
        info!(moved, "schedule rebalanced");
        RebalanceOutcome::Applied { moved }
    }

    fn revert(&self, reason: String) -> RebalanceOutcome {
        warn!(%reason, "rebalance rejected, keeping current schedule");
        RebalanceOutcome::Reverted { reason }
    }

    /// Validates drafts from the text-to-task collaborator and inserts the
    /// valid ones. Imported suggestions replace the current list.
    pub fn import_parsed(&mut self, parsed: ParsedSchedule) -> ImportSummary {
        let mut summary = ImportSummary::default();
        let mut accepted = Vec::new();
        for draft in parsed
            .scheduled_tasks
            .into_iter()
            .chain(parsed.unscheduled_tasks)
        {
            match draft.validate() {
                Ok(task) => accepted.push(task),
                Err(e) => {
                    warn!(error = %e, "rejecting task draft");
                    summary.rejected += 1;
                }
            }
        }
        for task in accepted {
            let scheduled = task.start_time.is_some();
            if self.add_masters([task]) == 0 {
                summary.rejected += 1;
            } else if scheduled {
                summary.scheduled += 1;
            } else {
                summary.unscheduled += 1;
            }
        }
        summary.suggestions = parsed.suggestions.len();
        self.set_suggestions(parsed.suggestions);
        summary
    }

    /// Replaces all user state with `doc` after validating it in full.
    /// On error nothing changes.
    pub fn restore(&mut self, doc: BackupData) -> Result<()> {
        let ledger = validate_document(&doc)?;
        self.scheduled = doc.tasks;
        self.unscheduled = doc.unscheduled_tasks;
        self.suggestions = doc.suggestions;
        self.ledger = ledger;
        info!(
            scheduled = self.scheduled.len(),
            unscheduled = self.unscheduled.len(),
            "state restored"
        );
        Ok(())
    }

    /// Parses and restores a backup document.
    pub fn restore_json(&mut self, json: &str) -> Result<()> {
        let doc: BackupData =
            serde_json::from_str(json).map_err(|e| Error::InvalidBackup(e.to_string()))?;
        self.restore(doc)
    }
}

fn check_proposal(current: &[MasterTask], proposal: &[MasterTask]) -> std::result::Result<(), String> {
    if proposal.len() != current.len() {
        return Err(format!(
            "task count mismatch: sent {}, got {}",
            current.len(),
            proposal.len()
        ));
    }
    let expected: HashMap<&str, &MasterTask> = current.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut seen = HashSet::new();
    for task in proposal {
        let original = expected
            .get(task.id.as_str())
            .ok_or_else(|| format!("unknown task id {}", task.id))?;
        if !seen.insert(task.id.as_str()) {
            return Err(format!("duplicate task id {}", task.id));
        }
        if task.start_time.is_none() {
            return Err(format!("task {} lost its start time", task.id));
        }
        if task.recurrence != original.recurrence {
            return Err(format!("task {} changed recurrence", task.id));
        }
    }
    Ok(())
}

/// Checks a document's shape and returns its ledger with entries for
/// unknown or non-recurring masters dropped.
fn validate_document(doc: &BackupData) -> Result<Ledger> {
    let mut ids = HashSet::new();
    for task in &doc.tasks {
        if task.start_time.is_none() {
            return Err(Error::InvalidBackup(format!(
                "scheduled task {} has no start time",
                task.id
            )));
        }
        if task.is_holiday {
            return Err(Error::InvalidBackup(format!("task {} is a holiday", task.id)));
        }
        if !ids.insert(task.id.as_str()) {
            return Err(Error::InvalidBackup(format!("duplicate task id {}", task.id)));
        }
    }
    for task in &doc.unscheduled_tasks {
        if task.start_time.is_some() {
            return Err(Error::InvalidBackup(format!(
                "unscheduled task {} has a start time",
                task.id
            )));
        }
        if !ids.insert(task.id.as_str()) {
            return Err(Error::InvalidBackup(format!("duplicate task id {}", task.id)));
        }
    }

    let recurring: HashSet<&str> = doc
        .tasks
        .iter()
        .chain(doc.unscheduled_tasks.iter())
        .filter(|t| t.is_recurring())
        .map(|t| t.id.as_str())
        .collect();
    let mut ledger = doc.completed_occurrences.clone();
    let stale: Vec<String> = ledger
        .master_ids()
        .filter(|id| !recurring.contains(id))
        .map(str::to_string)
        .collect();
    for id in stale {
        debug!(%id, "dropping ledger entry for non-recurring task");
        ledger.purge(&id);
    }
    Ok(ledger)
}
