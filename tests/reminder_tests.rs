use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Offset, TimeZone, Utc};
use dayweave::collaborators::Notifier;
use dayweave::config::ReminderConfig;
use dayweave::holidays::holidays_for_years;
use dayweave::ledger::Ledger;
use dayweave::models::{MasterTask, Recurrence};
use dayweave::reminders::{Notification, NotificationKind, ReminderRunner, ReminderScheduler, Snapshot};
use tokio::sync::mpsc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 8, 10, 0, 0).unwrap()
}

fn snapshot(masters: Vec<MasterTask>) -> Arc<Snapshot> {
    Arc::new(Snapshot {
        masters,
        ..Default::default()
    })
}

fn one_off() -> MasterTask {
    MasterTask::new("Dentist", 30)
        .with_id("dentist")
        .starting_at(start())
        .with_reminder(15)
}

fn scheduler(masters: Vec<MasterTask>) -> ReminderScheduler {
    ReminderScheduler::new(snapshot(masters), ReminderConfig::default())
}

fn reminders(notifications: &[Notification]) -> Vec<String> {
    notifications
        .iter()
        .filter(|n| n.kind == NotificationKind::Reminder)
        .map(|n| n.occurrence.key())
        .collect()
}

#[test]
fn test_reminder_fires_once() {
    let mut s = scheduler(vec![one_off()]);
    let now = start() - Duration::minutes(10);

    assert_eq!(reminders(&s.tick(now)), vec!["dentist"]);
    assert!(s.notified().reminded("dentist"));
    assert!(s.tick(now + Duration::minutes(5)).is_empty());
}

#[test]
fn test_reminder_window_bounds() {
    let mut s = scheduler(vec![one_off()]);
    assert!(s.tick(start() - Duration::minutes(16)).is_empty());
    assert!(s.tick(start()).is_empty());

    let mut s = scheduler(vec![one_off()]);
    assert_eq!(reminders(&s.tick(start() - Duration::minutes(15))).len(), 1);
}

#[test]
fn test_no_reminder_without_lead_time_or_when_completed() {
    let mut zero = one_off();
    zero.reminder = Some(0);
    let mut done = one_off().with_id("done");
    done.completed = true;
    let mut s = scheduler(vec![zero, done]);
    assert!(s.tick(start() - Duration::minutes(10)).is_empty());
}

#[test]
fn test_recurring_reminder_uses_todays_instance() {
    let weekly = MasterTask::new("Team sync", 60)
        .with_id("t1")
        .starting_at(Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap())
        .recurring(Recurrence::Weekly)
        .with_reminder(15);
    let mut s = scheduler(vec![weekly.clone()]);
    assert_eq!(reminders(&s.tick(start() - Duration::minutes(10))), vec!["t1_2024-07-08"]);

    // next week's instance is a separate one-shot
    let next_week = start() + Duration::days(7) - Duration::minutes(10);
    assert_eq!(reminders(&s.tick(next_week)), vec!["t1_2024-07-15"]);

    // completing today's instance suppresses it
    let mut ledger = Ledger::new();
    ledger.toggle("t1", NaiveDate::from_ymd_opt(2024, 7, 8).unwrap());
    let mut s = ReminderScheduler::new(
        Arc::new(Snapshot {
            masters: vec![weekly],
            ledger,
            offset: Utc.fix(),
        }),
        ReminderConfig::default(),
    );
    assert!(s.tick(start() - Duration::minutes(10)).is_empty());
}

#[test]
fn test_snooze_suppresses_reminder() {
    let mut s = scheduler(vec![one_off()]);
    let now = start() - Duration::minutes(10);
    assert!(s.snooze("dentist", 5, now));

    assert!(s.tick(now).is_empty());
    assert!(s.tick(now + Duration::minutes(4)).is_empty());
    // snooze over, still before start, never sent
    assert_eq!(reminders(&s.tick(now + Duration::minutes(5))), vec!["dentist"]);
}

#[test]
fn test_snooze_does_not_rearm_by_default() {
    let mut s = scheduler(vec![one_off()]);
    let now = start() - Duration::minutes(14);
    assert_eq!(s.tick(now).len(), 1);
    s.snooze("dentist", 5, now);
    assert!(s.tick(now + Duration::minutes(6)).is_empty());
}

#[test]
fn test_snooze_rearms_when_configured() {
    let config = ReminderConfig {
        snooze_rearms: true,
        ..Default::default()
    };
    let mut s = ReminderScheduler::new(snapshot(vec![one_off()]), config);
    let now = start() - Duration::minutes(14);
    assert_eq!(s.tick(now).len(), 1);
    s.snooze("dentist", 5, now);
    assert!(s.tick(now + Duration::minutes(2)).is_empty());
    assert_eq!(reminders(&s.tick(now + Duration::minutes(6))), vec!["dentist"]);
}

#[test]
fn test_snooze_unknown_id_is_noop() {
    let mut s = scheduler(vec![one_off()]);
    assert!(!s.snooze("ghost", 5, start()));
    assert!(!s.is_snoozed("ghost", start()));
}

#[test]
fn test_follow_up_window() {
    let end = start() + Duration::minutes(30);
    let mut s = scheduler(vec![one_off()]);
    assert!(s.tick(end).is_empty());

    let due = s.tick(end + Duration::minutes(1));
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, NotificationKind::FollowUp);
    assert_eq!(due[0].tag(), "followup_dentist");
    assert!(s.notified().followed_up("dentist"));
    assert!(s.tick(end + Duration::minutes(2)).is_empty());

    let mut late = scheduler(vec![one_off()]);
    assert!(late.tick(end + Duration::minutes(61)).is_empty());
}

#[test]
fn test_follow_up_sent_even_when_completed() {
    let mut done = one_off();
    done.completed = true;
    let mut s = scheduler(vec![done]);
    let due = s.tick(start() + Duration::minutes(35));
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, NotificationKind::FollowUp);
}

#[test]
fn test_holidays_are_not_tracked() {
    let holidays: Vec<MasterTask> = holidays_for_years(2024..=2024, Utc.fix())
        .into_iter()
        .map(|h| h.with_reminder(60))
        .collect();
    let mut s = scheduler(holidays);
    let before = Utc.with_ymd_and_hms(2024, 7, 3, 23, 30, 0).unwrap();
    assert!(s.tick(before).is_empty());
    let after = Utc.with_ymd_and_hms(2024, 7, 5, 0, 5, 0).unwrap();
    assert!(s.tick(after).is_empty());
}

#[test]
fn test_reset_forgets_sent_state() {
    let mut s = scheduler(vec![one_off()]);
    let now = start() - Duration::minutes(10);
    assert_eq!(s.tick(now).len(), 1);
    s.reset();
    assert!(s.notified().is_empty());
    assert_eq!(s.tick(now).len(), 1);
}

#[test]
fn test_new_snapshot_is_picked_up() {
    let mut s = scheduler(vec![]);
    let now = start() - Duration::minutes(10);
    assert!(s.tick(now).is_empty());
    s.set_snapshot(snapshot(vec![one_off()]));
    assert_eq!(s.tick(now).len(), 1);
}

struct ChannelNotifier(mpsc::UnboundedSender<Notification>);

impl Notifier for ChannelNotifier {
    fn deliver(&mut self, notification: &Notification) {
        let _ = self.0.send(notification.clone());
    }
}

fn due_soon() -> MasterTask {
    MasterTask::new("Stand up", 15)
        .with_id("standup")
        .starting_at(Utc::now() + Duration::minutes(10))
        .with_reminder(15)
}

#[tokio::test]
async fn test_runner_delivers_and_stops() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runner = ReminderRunner::new();
    runner.start(scheduler(vec![due_soon()]), ChannelNotifier(tx), StdDuration::from_millis(10));
    assert!(runner.is_running());

    let notification = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
        .await
        .expect("no notification in time")
        .expect("channel closed");
    assert_eq!(notification.occurrence.key(), "standup");
    assert_eq!(notification.kind, NotificationKind::Reminder);

    runner.stop();
    assert!(!runner.is_running());
    assert!(!runner.snooze("standup", 5));
}

#[tokio::test]
async fn test_runner_takes_pushed_snapshot() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runner = ReminderRunner::new();
    runner.start(scheduler(vec![]), ChannelNotifier(tx), StdDuration::from_millis(10));

    assert!(runner.push_snapshot(snapshot(vec![due_soon()])));
    let notification = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
        .await
        .expect("no notification in time")
        .expect("channel closed");
    assert_eq!(notification.occurrence.master_id(), "standup");
    runner.stop();
}

#[tokio::test]
async fn test_restart_replaces_loop() {
    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    let mut runner = ReminderRunner::new();
    runner.start(scheduler(vec![]), ChannelNotifier(first_tx), StdDuration::from_millis(10));
    runner.start(scheduler(vec![due_soon()]), ChannelNotifier(second_tx), StdDuration::from_millis(10));

    let notification = tokio::time::timeout(StdDuration::from_secs(2), second_rx.recv())
        .await
        .expect("no notification in time")
        .expect("channel closed");
    assert_eq!(notification.occurrence.key(), "standup");

    // the first loop was aborted, so its notifier was dropped
    let closed = tokio::time::timeout(StdDuration::from_secs(2), first_rx.recv())
        .await
        .expect("first loop still alive");
    assert!(closed.is_none());
    runner.stop();
}
