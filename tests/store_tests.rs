use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use dayweave::collaborators::{DraftTask, ParsedSchedule, Rebalancer};
use dayweave::error::Error;
use dayweave::models::{MasterTask, Priority, Recurrence, Suggestion, SuggestionKind, TaskRef};
use dayweave::store::{BackupData, RebalanceOutcome, StoreSettings, TaskStore};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn at(y: i32, m: u32, day: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, day, h, min, 0).unwrap()
}

fn weekly_t1() -> MasterTask {
    MasterTask::new("Team sync", 60)
        .with_id("t1")
        .starting_at(at(2024, 7, 1, 10, 0))
        .recurring(Recurrence::Weekly)
}

fn store_with(tasks: Vec<MasterTask>) -> TaskStore {
    let mut store = TaskStore::new(StoreSettings::default());
    store.add_masters(tasks);
    store
}

#[test]
fn test_add_routes_by_start_and_skips_duplicates() {
    let mut store = store_with(vec![
        weekly_t1(),
        MasterTask::new("Read book", 30).with_id("book"),
    ]);
    assert_eq!(store.scheduled().len(), 1);
    assert_eq!(store.unscheduled().len(), 1);

    let added = store.add_masters([MasterTask::new("Again", 5).with_id("t1")]);
    assert_eq!(added, 0);
    assert_eq!(store.scheduled()[0].title, "Team sync");
}

#[test]
fn test_toggle_occurrence_round_trip() {
    let mut store = store_with(vec![weekly_t1()]);
    let instance = TaskRef::parse("t1_2024-07-08");

    assert!(store.toggle_completion(&instance, d(2000, 1, 1)).unwrap());
    assert!(store.ledger().is_completed("t1", d(2024, 7, 8)));
    assert!(store.occurrences_on(d(2024, 7, 8))[0].is_completed());
    assert!(!store.occurrences_on(d(2024, 7, 15))[0].is_completed());

    assert!(!store.toggle_completion(&instance, d(2000, 1, 1)).unwrap());
    assert!(store.ledger().is_empty());
}

#[test]
fn test_toggle_master_id_uses_given_date() {
    let mut store = store_with(vec![weekly_t1()]);
    let master = TaskRef::parse("t1");
    assert!(store.toggle_completion(&master, d(2024, 7, 15)).unwrap());
    assert!(store.ledger().is_completed("t1", d(2024, 7, 15)));

    let err = store.toggle_completion(&master, d(2024, 7, 16)).unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
}

#[test]
fn test_toggle_one_off_flips_flag() {
    let mut store = store_with(vec![MasterTask::new("Call mom", 20)
        .with_id("call")
        .starting_at(at(2024, 7, 2, 18, 0))]);
    let target = TaskRef::parse("call");
    assert!(store.toggle_completion(&target, d(2024, 7, 2)).unwrap());
    assert!(store.scheduled()[0].completed);
    assert!(store.ledger().is_empty());
    assert!(!store.toggle_completion(&target, d(2024, 7, 2)).unwrap());
}

#[test]
fn test_complete_occurrence_does_not_untoggle() {
    let mut store = store_with(vec![weekly_t1()]);
    let target = TaskRef::parse("t1_2024-07-08");
    assert!(store.complete_occurrence(&target, d(2024, 7, 8)).unwrap());
    assert!(!store.complete_occurrence(&target, d(2024, 7, 8)).unwrap());
    assert!(store.ledger().is_completed("t1", d(2024, 7, 8)));
}

#[test]
fn test_delete_instance_removes_series_and_ledger() {
    let mut store = store_with(vec![weekly_t1()]);
    store.toggle_completion(&TaskRef::parse("t1_2024-07-08"), d(2024, 7, 8)).unwrap();

    let now = at(2024, 7, 8, 12, 0);
    let removed = store.delete_master(&TaskRef::parse("t1_2024-07-15"), now).unwrap();
    assert_eq!(removed.id, "t1");
    assert!(store.scheduled().is_empty());
    assert!(store.ledger().is_empty());
    assert!(store.occurrences_on(d(2024, 7, 22)).is_empty());
}

#[test]
fn test_delete_unknown_is_noop() {
    let mut store = store_with(vec![weekly_t1()]);
    assert!(store.delete_master(&TaskRef::parse("nope"), Utc::now()).is_none());
    assert_eq!(store.scheduled().len(), 1);
    assert!(store.pending_undo_record().is_none());
}

#[test]
fn test_delete_stale_instance_is_noop() {
    let mut store = store_with(vec![weekly_t1()]);
    let stale = TaskRef::parse("t1_2024-07-09");
    assert!(store.resolve_occurrence(&stale).is_none());

    assert!(store.delete_master(&stale, at(2024, 7, 9, 12, 0)).is_none());
    assert_eq!(store.scheduled().len(), 1);
    assert_eq!(store.occurrences_on(d(2024, 7, 15)).len(), 1);
    assert!(store.pending_undo_record().is_none());
}

#[test]
fn test_undo_restores_completions_and_order() {
    let other = MasterTask::new("Design review", 30)
        .with_id("t2")
        .starting_at(at(2024, 7, 1, 10, 0))
        .recurring(Recurrence::Weekly);
    let mut store = store_with(vec![weekly_t1(), other]);
    store.toggle_completion(&TaskRef::parse("t1_2024-07-08"), d(2024, 7, 8)).unwrap();
    let before = store.occurrences_between(d(2024, 7, 1), d(2024, 7, 15));

    let now = at(2024, 7, 8, 12, 0);
    store.delete_master(&TaskRef::parse("t1"), now).unwrap();
    assert!(store.ledger().is_empty());
    assert_eq!(store.pending_undo_record().unwrap().completed_dates, vec![d(2024, 7, 8)]);

    store.undo_delete(now + Duration::seconds(2)).unwrap();
    assert_eq!(store.occurrences_between(d(2024, 7, 1), d(2024, 7, 15)), before);
    assert_eq!(store.scheduled()[0].id, "t1");
    assert!(store.ledger().is_completed("t1", d(2024, 7, 8)));
}

#[test]
fn test_undo_within_window() {
    let mut store = store_with(vec![weekly_t1()]);
    let now = at(2024, 7, 8, 12, 0);
    store.delete_master(&TaskRef::parse("t1"), now);

    let restored = store.undo_delete(now + Duration::seconds(3)).unwrap();
    assert_eq!(restored.id, "t1");
    assert_eq!(store.scheduled().len(), 1);
    assert!(store.undo_delete(now + Duration::seconds(4)).is_none());
}

#[test]
fn test_undo_expires() {
    let mut store = store_with(vec![weekly_t1()]);
    let now = at(2024, 7, 8, 12, 0);
    store.delete_master(&TaskRef::parse("t1"), now);
    assert!(store.pending_undo(now + Duration::seconds(4)).is_some());

    assert!(store.undo_delete(now + Duration::seconds(6)).is_none());
    assert!(store.scheduled().is_empty());
    assert!(store.pending_undo_record().is_none());
}

#[test]
fn test_second_delete_replaces_pending_undo() {
    let mut store = store_with(vec![
        weekly_t1(),
        MasterTask::new("Gym", 60).with_id("gym").starting_at(at(2024, 7, 2, 7, 0)),
    ]);
    let now = at(2024, 7, 8, 12, 0);
    store.delete_master(&TaskRef::parse("t1"), now);
    store.delete_master(&TaskRef::parse("gym"), now + Duration::seconds(1));

    let restored = store.undo_delete(now + Duration::seconds(2)).unwrap();
    assert_eq!(restored.id, "gym");
    assert_eq!(store.scheduled().len(), 1);
    assert_eq!(store.scheduled()[0].id, "gym");
}

#[test]
fn test_update_moves_between_collections() {
    let mut store = store_with(vec![weekly_t1()]);
    let mut edited = store.scheduled()[0].clone();
    edited.start_time = None;
    edited.recurrence = Recurrence::None;
    store.update_master(&TaskRef::parse("t1"), edited).unwrap();
    assert!(store.scheduled().is_empty());
    assert_eq!(store.unscheduled()[0].id, "t1");

    store.schedule_unscheduled("t1", at(2024, 7, 9, 9, 0)).unwrap();
    assert!(store.unscheduled().is_empty());
    assert_eq!(store.occurrences_on(d(2024, 7, 9)).len(), 1);
}

#[test]
fn test_unschedule_moves_task() {
    let mut store = store_with(vec![MasterTask::new("Gym", 60).with_id("gym").starting_at(at(2024, 7, 2, 7, 0))]);
    store.unschedule(&TaskRef::parse("gym")).unwrap();
    assert!(store.scheduled().is_empty());
    assert_eq!(store.unscheduled()[0].start_time, None);
    assert!(store.occurrences_on(d(2024, 7, 2)).is_empty());
    // still resolvable by id
    assert!(store.resolve_occurrence(&TaskRef::parse("gym")).is_some());
}

#[test]
fn test_update_through_instance_applies_to_series() {
    let mut store = store_with(vec![weekly_t1()]);
    let target = TaskRef::parse("t1_2024-07-08");
    let mut edited = store.resolve_occurrence(&target).unwrap().task;
    edited.title = "Team sync (moved)".into();
    edited.start_time = Some(at(2024, 7, 8, 11, 30));
    edited.completed = true;
    store.update_master(&target, edited).unwrap();

    let master = &store.scheduled()[0];
    assert_eq!(master.id, "t1");
    assert_eq!(master.start_time, Some(at(2024, 7, 1, 11, 30)));
    let later = &store.occurrences_on(d(2024, 7, 22))[0];
    assert_eq!(later.task.title, "Team sync (moved)");
    assert_eq!(later.start(), Some(at(2024, 7, 22, 11, 30)));
}

#[test]
fn test_dropping_recurrence_purges_ledger() {
    let mut store = store_with(vec![weekly_t1()]);
    store.toggle_completion(&TaskRef::parse("t1_2024-07-08"), d(2024, 7, 8)).unwrap();

    let mut edited = store.scheduled()[0].clone();
    edited.recurrence = Recurrence::None;
    store.update_master(&TaskRef::parse("t1"), edited).unwrap();

    assert!(store.ledger().is_empty());
    assert!(store.resolve_occurrence(&TaskRef::parse("t1_2024-07-08")).is_none());
}

#[test]
fn test_update_stale_instance_fails() {
    let mut store = store_with(vec![weekly_t1()]);
    let stale = TaskRef::parse("t1_2024-07-09");
    let mut edited = weekly_t1();
    edited.title = "renamed".into();

    let err = store.update_master(&stale, edited).unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
    assert_eq!(store.scheduled()[0].title, "Team sync");
    assert_eq!(store.scheduled()[0].start_time, Some(at(2024, 7, 1, 10, 0)));
}

#[test]
fn test_update_unknown_fails() {
    let mut store = store_with(vec![]);
    let err = store
        .update_master(&TaskRef::parse("ghost"), MasterTask::new("x", 1))
        .unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
}

#[test]
fn test_holidays_are_visible_but_immutable() {
    let mut store = TaskStore::new(StoreSettings::default()).with_holidays(2024..=2024);
    let july_4 = store.occurrences_on(d(2024, 7, 4));
    assert_eq!(july_4.len(), 1);
    assert!(july_4[0].task.is_holiday);
    assert_eq!(july_4[0].task.duration, 1440);
    assert_eq!(july_4[0].task.priority, Priority::High);

    let id = TaskRef::parse(july_4[0].master_id());
    assert!(matches!(
        store.toggle_completion(&id, d(2024, 7, 4)),
        Err(Error::ImmutableHoliday(_))
    ));
    assert!(matches!(
        store.update_master(&id, MasterTask::new("Work day", 480)),
        Err(Error::ImmutableHoliday(_))
    ));

    let doc = store.to_document();
    assert!(doc.tasks.is_empty());
}

#[test]
fn test_known_holiday_dates() {
    let store = TaskStore::new(StoreSettings::default()).with_holidays(2025..=2025);
    let on = |date| {
        store
            .occurrences_on(date)
            .into_iter()
            .map(|o| o.task.title)
            .collect::<Vec<_>>()
    };
    assert_eq!(on(d(2025, 1, 20)), vec!["Martin Luther King, Jr. Day"]);
    assert_eq!(on(d(2025, 5, 26)), vec!["Memorial Day"]);
    assert_eq!(on(d(2025, 11, 27)), vec!["Thanksgiving Day"]);
    assert_eq!(store.holidays().len(), 10);
}

#[test]
fn test_load_factor() {
    let store = store_with(vec![
        MasterTask::new("a", 120).with_id("a").starting_at(at(2024, 7, 1, 9, 0)),
        MasterTask::new("b", 120).with_id("b").starting_at(at(2024, 7, 1, 13, 0)),
        MasterTask::new("c", 600).with_id("c").starting_at(at(2024, 7, 2, 9, 0)),
    ]);
    assert!((store.load_factor(d(2024, 7, 1)) - 0.5).abs() < 1e-9);
    assert_eq!(store.load_factor(d(2024, 7, 2)), 1.0);
    assert_eq!(store.load_factor(d(2024, 7, 3)), 0.0);
}

struct ShiftAll(Duration);

impl Rebalancer for ShiftAll {
    fn rebalance(&self, tasks: &[MasterTask]) -> dayweave::Result<Vec<MasterTask>> {
        Ok(tasks
            .iter()
            .cloned()
            .map(|mut t| {
                t.start_time = t.start_time.map(|s| s + self.0);
                t
            })
            .collect())
    }
}

struct DropFirst;

impl Rebalancer for DropFirst {
    fn rebalance(&self, tasks: &[MasterTask]) -> dayweave::Result<Vec<MasterTask>> {
        Ok(tasks.iter().skip(1).cloned().collect())
    }
}

struct Failing;

impl Rebalancer for Failing {
    fn rebalance(&self, _tasks: &[MasterTask]) -> dayweave::Result<Vec<MasterTask>> {
        Err(Error::Collaborator("service unavailable".into()))
    }
}

#[test]
fn test_rebalance_applied() {
    let mut store = store_with(vec![
        weekly_t1(),
        MasterTask::new("Gym", 60).with_id("gym").starting_at(at(2024, 7, 2, 7, 0)),
    ]);
    let outcome = store.rebalance(&ShiftAll(Duration::hours(1)));
    assert_eq!(outcome, RebalanceOutcome::Applied { moved: 2 });
    assert_eq!(store.scheduled()[1].start_time, Some(at(2024, 7, 2, 8, 0)));
}

#[test]
fn test_rebalance_reverted_keeps_schedule() {
    let original = vec![
        weekly_t1(),
        MasterTask::new("Gym", 60).with_id("gym").starting_at(at(2024, 7, 2, 7, 0)),
    ];
    let mut store = store_with(original.clone());

    assert!(matches!(store.rebalance(&DropFirst), RebalanceOutcome::Reverted { .. }));
    assert!(matches!(store.rebalance(&Failing), RebalanceOutcome::Reverted { .. }));
    assert_eq!(store.scheduled(), original.as_slice());
}

#[test]
fn test_import_validates_drafts() {
    let mut store = store_with(vec![weekly_t1()]);
    let parsed = ParsedSchedule {
        scheduled_tasks: vec![
            DraftTask {
                title: Some("Lunch with Sam".into()),
                start_time: Some(at(2024, 7, 3, 12, 0)),
                duration: Some(60),
                ..Default::default()
            },
            DraftTask {
                title: Some("Daily walk".into()),
                duration: Some(20),
                recurrence: Some(Recurrence::Daily),
                ..Default::default()
            },
        ],
        unscheduled_tasks: vec![
            DraftTask {
                title: Some("Renew passport".into()),
                duration: Some(30),
                ..Default::default()
            },
            DraftTask {
                title: Some("No duration".into()),
                ..Default::default()
            },
            DraftTask {
                id: Some("t1".into()),
                title: Some("Duplicate id".into()),
                duration: Some(5),
                ..Default::default()
            },
        ],
        suggestions: vec![Suggestion {
            id: "s1".into(),
            kind: SuggestionKind::Meal,
            title: "Try the new ramen place".into(),
            details: String::new(),
            duration: None,
        }],
    };

    let summary = store.import_parsed(parsed);
    assert_eq!(summary.scheduled, 1);
    assert_eq!(summary.unscheduled, 1);
    assert_eq!(summary.rejected, 3);
    assert_eq!(summary.suggestions, 1);
    assert_eq!(store.scheduled().len(), 2);
    assert_eq!(store.unscheduled()[0].title, "Renew passport");
    assert_eq!(store.suggestions()[0].id, "s1");
}

#[test]
fn test_backup_document_shape() {
    let mut store = store_with(vec![weekly_t1(), MasterTask::new("Later", 15).with_id("later")]);
    store.toggle_completion(&TaskRef::parse("t1_2024-07-08"), d(2024, 7, 8)).unwrap();

    let value = serde_json::to_value(store.to_document()).unwrap();
    assert_eq!(value["tasks"][0]["startTime"], "2024-07-01T10:00:00Z");
    assert_eq!(value["tasks"][0]["recurrence"], "weekly");
    assert_eq!(value["unscheduledTasks"][0]["id"], "later");
    assert_eq!(value["completedOccurrences"]["t1"][0], "2024-07-08");
    assert!(value["suggestions"].as_array().unwrap().is_empty());

    let mut copy = TaskStore::new(StoreSettings::default());
    copy.restore_json(&value.to_string()).unwrap();
    assert_eq!(copy.to_document(), store.to_document());
}

#[test]
fn test_restore_rejects_missing_field() {
    let mut store = store_with(vec![weekly_t1()]);
    let err = store
        .restore_json(r#"{"tasks": [], "unscheduledTasks": [], "suggestions": []}"#)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBackup(_)));
    assert_eq!(store.scheduled().len(), 1);
}

#[test]
fn test_restore_is_atomic() {
    let mut store = store_with(vec![weekly_t1()]);
    let bad = BackupData {
        tasks: vec![
            MasterTask::new("ok", 10).with_id("ok").starting_at(at(2024, 7, 1, 9, 0)),
            MasterTask::new("no start", 10).with_id("bad"),
        ],
        ..Default::default()
    };
    assert!(store.restore(bad).is_err());
    assert_eq!(store.scheduled()[0].id, "t1");
}

#[test]
fn test_restore_drops_stale_ledger_entries() {
    let mut doc = BackupData {
        tasks: vec![
            weekly_t1(),
            MasterTask::new("once", 10).with_id("once").starting_at(at(2024, 7, 1, 9, 0)),
        ],
        ..Default::default()
    };
    doc.completed_occurrences.toggle("t1", d(2024, 7, 8));
    doc.completed_occurrences.toggle("once", d(2024, 7, 1));
    doc.completed_occurrences.toggle("gone", d(2024, 7, 1));

    let store = TaskStore::from_document(doc, StoreSettings::default()).unwrap();
    let ids: Vec<&str> = store.ledger().master_ids().collect();
    assert_eq!(ids, vec!["t1"]);
}
