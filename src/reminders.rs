//! Reminder and follow-up scheduler.
//!
//! [`ReminderScheduler`] is a plain state machine driven by [`ReminderScheduler::tick`].
//! [`ReminderRunner`] drives it from a tokio interval and feeds it fresh
//! snapshots and snooze commands over channels.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::collaborators::Notifier;
use crate::config::ReminderConfig;
use crate::ledger::Ledger;
use crate::models::{MasterTask, Occurrence, TaskRef};
use crate::occurrence::Materializer;

/// What the scheduler sees of the task store. Callers push a new one after
/// every mutation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub masters: Vec<MasterTask>,
    pub ledger: Ledger,
    pub offset: FixedOffset,
}

impl Default for Snapshot {
    fn default() -> Self {
        Snapshot {
            masters: Vec::new(),
            ledger: Ledger::new(),
            offset: Utc.fix(),
        }
    }
}

impl Snapshot {
    pub fn materializer(&self) -> Materializer<'_> {
        Materializer::new(self.masters.iter(), &self.ledger, self.offset)
    }

    /// One occurrence per tracked master: one-off tasks as they are,
    /// recurring tasks only if they occur today. Holidays are never tracked.
    pub fn tracked(&self, now: DateTime<Utc>) -> Vec<Occurrence> {
        let today = now.with_timezone(&self.offset).date_naive();
        let materializer = self.materializer();
        self.masters
            .iter()
            .filter(|task| !task.is_holiday && task.start_time.is_some())
            .filter_map(|task| {
                if task.is_recurring() {
                    materializer.project(task, today)
                } else {
                    Some(Occurrence {
                        instance_id: None,
                        task: task.clone(),
                    })
                }
            })
            .collect()
    }

    /// Per-day key for `target`; a bare recurring master id means today's instance.
    fn key_for(&self, target: &TaskRef, now: DateTime<Utc>) -> Option<String> {
        let materializer = self.materializer();
        let occurrence = materializer.resolve(target)?;
        if occurrence.instance_id.is_none() && occurrence.task.is_recurring() {
            let today = now.with_timezone(&self.offset).date_naive();
            return materializer.project(&occurrence.task, today).map(|o| o.key());
        }
        Some(occurrence.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Reminder,
    FollowUp,
}

/// A notification handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub occurrence: Occurrence,
}

impl Notification {
    /// Dedup tag: the occurrence key, prefixed with `followup_` for follow-ups.
    pub fn tag(&self) -> String {
        match self.kind {
            NotificationKind::Reminder => self.occurrence.key(),
            NotificationKind::FollowUp => format!("followup_{}", self.occurrence.key()),
        }
    }
}

/// One-shot memory of what was already sent, owned by one scheduler.
#[derive(Debug, Clone, Default)]
pub struct NotifiedStore {
    reminders: HashSet<String>,
    follow_ups: HashSet<String>,
}

impl NotifiedStore {
    pub fn reminded(&self, key: &str) -> bool {
        self.reminders.contains(key)
    }

    pub fn followed_up(&self, key: &str) -> bool {
        self.follow_ups.contains(&format!("followup_{}", key))
    }

    fn forget(&mut self, key: &str) {
        self.reminders.remove(key);
        self.follow_ups.remove(&format!("followup_{}", key));
    }

    pub fn clear(&mut self) {
        self.reminders.clear();
        self.follow_ups.clear();
    }

    pub fn len(&self) -> usize {
        self.reminders.len() + self.follow_ups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decides, per tick, which reminders and follow-ups are due.
pub struct ReminderScheduler {
    snapshot: Arc<Snapshot>,
    notified: NotifiedStore,
    snoozes: HashMap<String, DateTime<Utc>>,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(snapshot: Arc<Snapshot>, config: ReminderConfig) -> Self {
        ReminderScheduler {
            snapshot,
            notified: NotifiedStore::default(),
            snoozes: HashMap::new(),
            config,
        }
    }

    pub fn set_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        debug!(masters = snapshot.masters.len(), "scheduler snapshot replaced");
        self.snapshot = snapshot;
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        &self.snapshot
    }

    pub fn notified(&self) -> &NotifiedStore {
        &self.notified
    }

    /// Forgets everything sent and every snooze.
    pub fn reset(&mut self) {
        self.notified.clear();
        self.snoozes.clear();
    }

    pub fn is_snoozed(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.snoozes.get(key).is_some_and(|until| now < *until)
    }

    /// Suppresses notifications for `id` for `minutes`.
    ///
    /// Ids that do not resolve against the current snapshot are ignored and
    /// `false` is returned.
    pub fn snooze(&mut self, id: &str, minutes: u32, now: DateTime<Utc>) -> bool {
        let key = match self.snapshot.key_for(&TaskRef::parse(id), now) {
            Some(key) => key,
            None => {
                debug!(%id, "snooze for unknown task ignored");
                return false;
            }
        };
        let until = now + Duration::minutes(i64::from(minutes));
        if self.config.snooze_rearms {
            self.notified.forget(&key);
        }
        info!(%key, %until, "snoozed");
        self.snoozes.insert(key, until);
        true
    }

    /// Evaluates every tracked occurrence at `now` and returns what to send.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut due = Vec::new();
        for occurrence in self.snapshot.tracked(now) {
            let key = occurrence.key();
            if self.is_snoozed(&key, now) {
                continue;
            }
            if self.reminder_due(&occurrence, &key, now) {
                self.notified.reminders.insert(key.clone());
                due.push(Notification {
                    kind: NotificationKind::Reminder,
                    occurrence: occurrence.clone(),
                });
            }
            if self.follow_up_due(&occurrence, &key, now) {
                self.notified.follow_ups.insert(format!("followup_{}", key));
                due.push(Notification {
                    kind: NotificationKind::FollowUp,
                    occurrence,
                });
            }
        }
        self.snoozes.retain(|_, until| now < *until);
        due
    }

    fn reminder_due(&self, occurrence: &Occurrence, key: &str, now: DateTime<Utc>) -> bool {
        if occurrence.is_completed() || self.notified.reminded(key) {
            return false;
        }
        let (Some(lead), Some(start)) = (occurrence.task.reminder_minutes(), occurrence.start()) else {
            return false;
        };
        let remind_at = start - Duration::minutes(i64::from(lead));
        remind_at <= now && now < start
    }

    fn follow_up_due(&self, occurrence: &Occurrence, key: &str, now: DateTime<Utc>) -> bool {
        if self.notified.followed_up(key) {
            return false;
        }
        let Some(end) = occurrence.end() else {
            return false;
        };
        let since_end = now - end;
        since_end >= Duration::minutes(i64::from(self.config.follow_up_min_minutes))
            && since_end <= Duration::minutes(i64::from(self.config.follow_up_max_minutes))
    }
}

/// Commands relayed into a running scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    Snooze { id: String, minutes: u32 },
    Reset,
}

/// Owns the tokio task that ticks a [`ReminderScheduler`].
///
/// At most one loop runs per runner: starting again stops the previous one.
#[derive(Default)]
pub struct ReminderRunner {
    handle: Option<JoinHandle<()>>,
    snapshots: Option<watch::Sender<Arc<Snapshot>>>,
    commands: Option<mpsc::UnboundedSender<SchedulerCommand>>,
}

impl ReminderRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the tick loop on the current tokio runtime.
    pub fn start<N>(&mut self, scheduler: ReminderScheduler, notifier: N, period: std::time::Duration)
    where
        N: Notifier + Send + 'static,
    {
        self.stop();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::clone(scheduler.snapshot()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        info!(period_secs = period.as_secs_f64(), "reminder loop started");
        self.handle = Some(tokio::spawn(run_loop(
            scheduler,
            notifier,
            period,
            snapshot_rx,
            command_rx,
        )));
        self.snapshots = Some(snapshot_tx);
        self.commands = Some(command_tx);
    }

    /// Hands the running loop a fresh snapshot.
    pub fn push_snapshot(&self, snapshot: Arc<Snapshot>) -> bool {
        self.snapshots
            .as_ref()
            .is_some_and(|tx| tx.send(snapshot).is_ok())
    }

    pub fn snooze(&self, id: impl Into<String>, minutes: u32) -> bool {
        self.send(SchedulerCommand::Snooze { id: id.into(), minutes })
    }

    pub fn send(&self, command: SchedulerCommand) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the loop. Safe to call when nothing runs.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("reminder loop stopped");
        }
        self.snapshots = None;
        self.commands = None;
    }
}

impl Drop for ReminderRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop<N: Notifier>(
    mut scheduler: ReminderScheduler,
    mut notifier: N,
    period: std::time::Duration,
    mut snapshots: watch::Receiver<Arc<Snapshot>>,
    mut commands: mpsc::UnboundedReceiver<SchedulerCommand>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for notification in scheduler.tick(Utc::now()) {
                    info!(tag = %notification.tag(), title = %notification.occurrence.task.title, "notifying");
                    notifier.deliver(&notification);
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = Arc::clone(&snapshots.borrow_and_update());
                scheduler.set_snapshot(snapshot);
            }
            command = commands.recv() => match command {
                Some(SchedulerCommand::Snooze { id, minutes }) => {
                    scheduler.snooze(&id, minutes, Utc::now());
                }
                Some(SchedulerCommand::Reset) => scheduler.reset(),
                None => break,
            },
        }
    }
}
