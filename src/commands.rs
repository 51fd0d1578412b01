use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::briefing::briefing;
use crate::collaborators::{JsonRebalancer, JsonTextToTask, Notifier, TextToTask};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::gaps::{find_gap, time_filler_candidates};
use crate::models::{InstanceId, MasterTask, Occurrence, Priority, Recurrence, TaskRef};
use crate::reminders::{Notification, NotificationKind, ReminderRunner, ReminderScheduler};
use crate::storage::{delete_database, export_backup, load_store, read_backup, save_store};
use crate::store::{ImportSummary, RebalanceOutcome, TaskStore};

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::invalid_input(s, format!("{}. Use YYYY-MM-DD.", e)))
}

/// Parses a start time: RFC 3339, or `YYYY-MM-DDTHH:MM` / `YYYY-MM-DD HH:MM`
/// read in the calendar offset.
pub fn parse_start(s: &str, offset: FixedOffset) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|e| Error::invalid_input(s, format!("{}. Use YYYY-MM-DDTHH:MM.", e)))?;
    naive
        .and_local_timezone(offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| Error::invalid_input(s, "ambiguous local time"))
}

fn today(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

fn date_or_today(date: Option<String>, offset: FixedOffset) -> Result<NaiveDate> {
    match date {
        Some(d) => parse_date(&d),
        None => Ok(today(offset)),
    }
}

/// Resolves user input to a task reference, accepting unique id prefixes.
pub fn resolve_ref(store: &TaskStore, input: &str) -> Result<TaskRef> {
    if store.resolve_occurrence(&TaskRef::Master(input.to_string())).is_some() {
        return Ok(TaskRef::Master(input.to_string()));
    }
    let parsed = TaskRef::parse(input);
    let prefix = parsed.master_id();
    let matches: Vec<&MasterTask> = store
        .scheduled()
        .iter()
        .chain(store.unscheduled())
        .chain(store.holidays())
        .filter(|t| t.id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [task] => Ok(match parsed.date() {
            Some(date) => TaskRef::Instance(InstanceId::new(task.id.clone(), date)),
            None => TaskRef::Master(task.id.clone()),
        }),
        [] => Err(Error::TaskNotFound(input.to_string())),
        _ => Err(Error::invalid_input(input, "ambiguous id prefix")),
    }
}

/// The first eight characters of `id`, cut on a char boundary.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

fn short_key(occurrence: &Occurrence) -> String {
    let id = occurrence.master_id();
    let short = if occurrence.task.is_holiday { id } else { short_id(id) };
    match &occurrence.instance_id {
        Some(instance) => format!("{}_{}", short, instance.date),
        None => short.to_string(),
    }
}

fn format_time(start: Option<DateTime<Utc>>, offset: FixedOffset) -> String {
    start
        .map(|s| s.with_timezone(&offset).format("%H:%M").to_string())
        .unwrap_or_else(|| "-".into())
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::High => Color::Red,
        Priority::Medium => Color::Yellow,
        Priority::Low => Color::Green,
    }
}

/// Adds a new task and returns its id.
#[allow(clippy::too_many_arguments)]
pub fn cmd_add(
    config: &AppConfig,
    title: String,
    description: Option<String>,
    start: Option<String>,
    duration: u32,
    priority: Priority,
    recurrence: Recurrence,
    reminder: Option<u32>,
    silent: bool,
) -> Result<String> {
    let mut store = load_store(config)?;
    let start_time = start.map(|s| parse_start(&s, store.offset())).transpose()?;
    if recurrence != Recurrence::None && start_time.is_none() {
        return Err(Error::invalid_task("recurrence", "requires a start time"));
    }
    let mut task = MasterTask::new(title, duration)
        .with_priority(priority)
        .recurring(recurrence);
    task.description = description;
    task.start_time = start_time;
    task.reminder = reminder;
    let id = task.id.clone();
    store.add_masters([task]);
    save_store(&store)?;
    if !silent {
        println!("Task added (id = {})", id);
    }
    Ok(id)
}

/// Lists occurrences day by day, starting at `date` (default today).
pub fn cmd_agenda(config: &AppConfig, date: Option<String>, days: u32) -> Result<()> {
    let store = load_store(config)?;
    let offset = store.offset();
    let from = date_or_today(date, offset)?;
    let to = from + Duration::days(i64::from(days.max(1)) - 1);

    for (day, occurrences) in store.occurrences_between(from, to) {
        println!("{} ({:.0}% load)", day.format("%A %Y-%m-%d"), store.load_factor(day) * 100.0);
        if occurrences.is_empty() {
            println!("No tasks.");
            continue;
        }
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("ID").add_attribute(Attribute::Bold),
                Cell::new("Time").add_attribute(Attribute::Bold),
                Cell::new("Title").add_attribute(Attribute::Bold),
                Cell::new("Min").add_attribute(Attribute::Bold),
                Cell::new("Priority").add_attribute(Attribute::Bold),
                Cell::new("Repeats").add_attribute(Attribute::Bold),
                Cell::new("Status").add_attribute(Attribute::Bold),
            ]);
        for o in &occurrences {
            let status = if o.task.is_holiday {
                "Holiday"
            } else if o.is_completed() {
                "Done"
            } else {
                "Pending"
            };
            let status_color = if o.is_completed() { Color::Green } else { Color::Yellow };
            table.add_row(vec![
                Cell::new(short_key(o)),
                Cell::new(format_time(o.start(), offset)),
                Cell::new(&o.task.title),
                Cell::new(o.task.duration),
                Cell::new(o.task.priority).fg(priority_color(o.task.priority)),
                Cell::new(o.task.recurrence),
                Cell::new(status).fg(status_color),
            ]);
        }
        println!("{table}");
    }
    Ok(())
}

/// Lists tasks without a start time.
pub fn cmd_unscheduled(config: &AppConfig) -> Result<()> {
    let store = load_store(config)?;
    if store.unscheduled().is_empty() {
        println!("No unscheduled tasks.");
        return Ok(());
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["ID", "Title", "Min", "Priority"]);
    for t in store.unscheduled() {
        table.add_row(vec![
            Cell::new(short_id(&t.id)),
            Cell::new(&t.title),
            Cell::new(t.duration),
            Cell::new(t.priority).fg(priority_color(t.priority)),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Prints one task or occurrence as JSON.
pub fn cmd_show(config: &AppConfig, id: String) -> Result<()> {
    let store = load_store(config)?;
    let target = resolve_ref(&store, &id)?;
    let occurrence = store
        .resolve_occurrence(&target)
        .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
    println!("{}", serde_json::to_string_pretty(&occurrence)?);
    Ok(())
}

/// Toggles completion of a task, or of one occurrence of a recurring task.
pub fn cmd_complete(config: &AppConfig, id: String, date: Option<String>, silent: bool) -> Result<bool> {
    let mut store = load_store(config)?;
    let target = resolve_ref(&store, &id)?;
    let date = date_or_today(date, store.offset())?;
    let completed = store.toggle_completion(&target, date)?;
    save_store(&store)?;
    if !silent {
        let state = if completed { "complete" } else { "not complete" };
        println!("Task {} marked as {}.", id, state);
    }
    Ok(completed)
}

/// Removes a task. Removing an occurrence removes its whole series.
pub fn cmd_remove(config: &AppConfig, id: String, silent: bool) -> Result<()> {
    let mut store = load_store(config)?;
    let target = resolve_ref(&store, &id)?;
    match store.delete_master(&target, Utc::now()) {
        Some(task) => {
            save_store(&store)?;
            if !silent {
                let secs = store.settings().undo_window.num_seconds();
                println!("Task '{}' removed. Run `dayweave undo` within {}s to restore it.", task.title, secs);
            }
        }
        None => {
            if !silent { eprintln!("Task {} not found.", id); }
        }
    }
    Ok(())
}

/// Restores the most recently removed task, if still within the undo window.
pub fn cmd_undo(config: &AppConfig, silent: bool) -> Result<Option<String>> {
    let mut store = load_store(config)?;
    let restored = store.undo_delete(Utc::now());
    save_store(&store)?;
    match &restored {
        Some(task) => { if !silent { println!("Restored '{}'.", task.title); } }
        None => { if !silent { eprintln!("Nothing to undo."); } }
    }
    Ok(restored.map(|t| t.id))
}

/// Field changes for [`cmd_edit`]; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub duration: Option<u32>,
    pub priority: Option<Priority>,
    pub recurrence: Option<Recurrence>,
    pub reminder: Option<u32>,
    pub unschedule: bool,
}

/// Edits an existing task. Edits through an occurrence id apply to the series.
pub fn cmd_edit(config: &AppConfig, id: String, edit: TaskEdit, silent: bool) -> Result<()> {
    let mut store = load_store(config)?;
    let target = resolve_ref(&store, &id)?;
    let current = store
        .resolve_occurrence(&target)
        .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
    let mut t = current.task;
    if let Some(title) = edit.title { t.title = title; }
    if let Some(description) = edit.description { t.description = Some(description); }
    if let Some(duration) = edit.duration { t.duration = duration; }
    if let Some(priority) = edit.priority { t.priority = priority; }
    if let Some(recurrence) = edit.recurrence { t.recurrence = recurrence; }
    if let Some(reminder) = edit.reminder { t.reminder = Some(reminder); }
    if let Some(start) = edit.start { t.start_time = Some(parse_start(&start, store.offset())?); }
    if edit.unschedule { t.start_time = None; }
    if t.is_recurring() && t.start_time.is_none() {
        return Err(Error::invalid_task("recurrence", "requires a start time"));
    }
    store.update_master(&target, t)?;
    save_store(&store)?;
    if !silent { println!("Task {} updated.", id); }
    Ok(())
}

/// Gives an unscheduled task a start time.
pub fn cmd_schedule(config: &AppConfig, id: String, start: String, silent: bool) -> Result<()> {
    let mut store = load_store(config)?;
    let target = resolve_ref(&store, &id)?;
    let start = parse_start(&start, store.offset())?;
    store.schedule_unscheduled(target.master_id(), start)?;
    save_store(&store)?;
    if !silent { println!("Task {} scheduled.", id); }
    Ok(())
}

/// Reports the first idle gap of the day and a few ideas to fill it.
pub fn cmd_gaps(config: &AppConfig, date: Option<String>) -> Result<()> {
    let store = load_store(config)?;
    let offset = store.offset();
    let today = today(offset);
    let date = date_or_today(date, offset)?;
    let occurrences = store.occurrences_on(date);
    let gap = match find_gap(&occurrences, date, today, &config.gaps, offset) {
        Some(gap) => gap,
        None => {
            println!("No free slot of {} minutes or more on {}.", config.gaps.min_gap_minutes, date);
            return Ok(());
        }
    };
    println!(
        "Free from {} to {} ({} min). Ideas:",
        format_time(Some(gap.start), offset),
        format_time(Some(gap.end), offset),
        gap.minutes()
    );
    let ideas = time_filler_candidates(&store, date, today, &config.gaps, &mut rand::thread_rng());
    for idea in ideas {
        let minutes = idea.duration.map(|d| format!(" ({} min)", d)).unwrap_or_default();
        println!("  - [{}] {}{}: {}", idea.kind, idea.title, minutes, idea.details);
    }
    Ok(())
}

/// Shows the load factor for one or more days.
pub fn cmd_load(config: &AppConfig, date: Option<String>, days: u32) -> Result<()> {
    let store = load_store(config)?;
    let from = date_or_today(date, store.offset())?;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Date", "Load"]);
    for offset_days in 0..days.max(1) {
        let day = from + Duration::days(i64::from(offset_days));
        let load = store.load_factor(day);
        let color = if load >= 1.0 {
            Color::Red
        } else if load >= 0.75 {
            Color::Yellow
        } else {
            Color::Green
        };
        table.add_row(vec![
            Cell::new(day.format("%a %Y-%m-%d")),
            Cell::new(format!("{:.0}%", load * 100.0)).fg(color),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Prints today's briefing.
pub fn cmd_briefing(config: &AppConfig) -> Result<()> {
    let store = load_store(config)?;
    let offset = store.offset();
    let now = Utc::now();
    let b = briefing(&store, today(offset), now);
    println!("Briefing for {} ({:.0}% load)", b.date, b.load * 100.0);
    if b.top_tasks.is_empty() {
        println!("Nothing planned. Enjoy the day.");
    }
    for o in &b.top_tasks {
        println!("  [{}] {} {}", o.task.priority, format_time(o.start(), offset), o.task.title);
    }
    if !b.at_risk.is_empty() {
        println!("High priority still open: {}", b.at_risk.len());
    }
    if let Some(next) = &b.next_up {
        println!("Next up: {} at {}", next.task.title, format_time(next.start(), offset));
    }
    Ok(())
}

/// Writes a backup document to `path`.
pub fn cmd_backup(config: &AppConfig, path: &Path, silent: bool) -> Result<()> {
    let store = load_store(config)?;
    export_backup(&store, path)?;
    if !silent { println!("Backup written to {}.", path.display()); }
    Ok(())
}

/// Replaces all data with a backup document. Invalid documents change nothing.
pub fn cmd_restore(config: &AppConfig, path: &Path, silent: bool) -> Result<()> {
    let mut store = load_store(config)?;
    let json = read_backup(path)?;
    store.restore_json(&json)?;
    save_store(&store)?;
    if !silent { println!("Restored from {}.", path.display()); }
    Ok(())
}

/// Imports tasks from a text-to-task reply stored in `path`.
pub fn cmd_import(config: &AppConfig, path: &Path, silent: bool) -> Result<ImportSummary> {
    let mut store = load_store(config)?;
    let text = read_backup(path)?;
    let existing: Vec<MasterTask> = store.scheduled().to_vec();
    let parsed = JsonTextToTask.parse_and_schedule(&text, &existing)?;
    let summary = store.import_parsed(parsed);
    save_store(&store)?;
    if !silent {
        println!(
            "Imported {} scheduled and {} unscheduled task(s), {} suggestion(s); {} rejected.",
            summary.scheduled, summary.unscheduled, summary.suggestions, summary.rejected
        );
    }
    Ok(summary)
}

/// Applies a rebalanced schedule proposal stored in `path`.
pub fn cmd_rebalance(config: &AppConfig, path: &Path, silent: bool) -> Result<RebalanceOutcome> {
    let mut store = load_store(config)?;
    let rebalancer = JsonRebalancer::new(read_backup(path)?);
    let outcome = store.rebalance(&rebalancer);
    if let RebalanceOutcome::Applied { moved } = &outcome {
        save_store(&store)?;
        if !silent { println!("Schedule rebalanced, {} task(s) moved.", moved); }
    } else if let RebalanceOutcome::Reverted { reason } = &outcome {
        if !silent { eprintln!("Rebalance discarded ({}). Schedule unchanged.", reason); }
    }
    Ok(outcome)
}

/// Resets the database by deleting all tasks.
pub fn cmd_reset(force: bool) -> Result<()> {
    if !force {
        print!("Are you sure you want to delete all tasks? This cannot be undone. [y/N] ");
        io::stdout().flush()?;
        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if input.trim().to_lowercase() != "y" {
            println!("Aborted.");
            return Ok(());
        }
    }
    delete_database()?;
    println!("Database reset successfully.");
    Ok(())
}

/// Prints notifications to stdout.
pub struct ConsoleNotifier {
    offset: FixedOffset,
}

impl ConsoleNotifier {
    pub fn new(offset: FixedOffset) -> Self {
        ConsoleNotifier { offset }
    }
}

impl Notifier for ConsoleNotifier {
    fn deliver(&mut self, notification: &Notification) {
        let o = &notification.occurrence;
        match notification.kind {
            NotificationKind::Reminder => println!(
                "Reminder: {} today at {} [{}]",
                o.task.title,
                format_time(o.start(), self.offset),
                o.key()
            ),
            NotificationKind::FollowUp => println!(
                "Task complete! You finished \"{}\". How did it go? [{}]",
                o.task.title,
                o.key()
            ),
        }
    }
}

/// A user action relayed back from a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    Done(String),
    Snooze(String, Option<u32>),
    Focus(String),
    Quit,
}

pub fn parse_watch_command(line: &str) -> Option<WatchCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    match verb {
        "done" => parts.next().map(|id| WatchCommand::Done(id.to_string())),
        "snooze" => {
            let id = parts.next()?.to_string();
            let minutes = match parts.next() {
                Some(m) => Some(m.parse().ok()?),
                None => None,
            };
            Some(WatchCommand::Snooze(id, minutes))
        }
        "focus" => parts.next().map(|id| WatchCommand::Focus(id.to_string())),
        "quit" | "exit" => Some(WatchCommand::Quit),
        _ => None,
    }
}

/// Runs the reminder loop in the foreground until stdin closes or `quit`.
///
/// The schedule is reloaded from disk every tick so edits made by other
/// invocations are picked up.
pub async fn cmd_watch(config: &AppConfig) -> Result<()> {
    let mut store = load_store(config)?;
    let offset = store.offset();
    let period = std::time::Duration::from_secs(config.reminders.tick_seconds.max(1));
    let scheduler = ReminderScheduler::new(store.snapshot(), config.reminders.clone());
    let mut runner = ReminderRunner::new();
    runner.start(scheduler, ConsoleNotifier::new(offset), period);

    println!("Watching for reminders. Commands: done <id>, snooze <id> [min], focus <id>, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reload = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = reload.tick() => match load_store(config) {
                Ok(fresh) => {
                    store = fresh;
                    runner.push_snapshot(store.snapshot());
                }
                Err(e) => warn!(error = %e, "could not reload schedule"),
            },
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                match parse_watch_command(&line) {
                    Some(WatchCommand::Done(id)) => {
                        let done = resolve_ref(&store, &id)
                            .and_then(|target| store.complete_occurrence(&target, today(offset)));
                        match done {
                            Ok(_) => {
                                if let Err(e) = save_store(&store) {
                                    warn!(error = %e, "could not save schedule");
                                }
                                runner.push_snapshot(store.snapshot());
                                println!("Marked {} as done.", id);
                            }
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    Some(WatchCommand::Snooze(id, minutes)) => {
                        let minutes = minutes.unwrap_or(config.reminders.snooze_minutes);
                        match resolve_ref(&store, &id) {
                            Ok(target) => {
                                runner.snooze(target.to_string(), minutes);
                                println!("Snoozed {} for {} min.", id, minutes);
                            }
                            Err(e) => eprintln!("{}", e),
                        }
                    }
                    Some(WatchCommand::Focus(id)) => {
                        match resolve_ref(&store, &id).ok().and_then(|t| store.resolve_occurrence(&t)) {
                            Some(o) => println!(
                                "{} at {} for {} min{}",
                                o.task.title,
                                format_time(o.start(), offset),
                                o.task.duration,
                                o.task.description.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
                            ),
                            None => eprintln!("Task {} not found.", id),
                        }
                    }
                    Some(WatchCommand::Quit) => break,
                    None => eprintln!("Unknown command: {}", line.trim()),
                }
            }
        }
    }
    runner.stop();
    Ok(())
}
