use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::ledger::Ledger;
use crate::models::{InstanceId, MasterTask, Occurrence, TaskRef};
use crate::recurrence::occurs_on;

/// Expands master tasks into dated occurrences.
///
/// Borrowed view over a set of masters and the ledger; cheap to build per
/// query. Masters keep their input order, which breaks ties between
/// occurrences that start at the same instant.
pub struct Materializer<'a> {
    masters: Vec<&'a MasterTask>,
    ledger: &'a Ledger,
    offset: FixedOffset,
}

impl<'a> Materializer<'a> {
    pub fn new<I>(masters: I, ledger: &'a Ledger, offset: FixedOffset) -> Self
    where
        I: IntoIterator<Item = &'a MasterTask>,
    {
        Materializer {
            masters: masters.into_iter().collect(),
            ledger,
            offset,
        }
    }

    /// Occurrences on `date`, ascending by start time.
    pub fn occurrences_on(&self, date: NaiveDate) -> Vec<Occurrence> {
        let mut day: Vec<Occurrence> = self
            .masters
            .iter()
            .filter_map(|master| self.project(master, date))
            .collect();
        // sort_by_key is stable, so input order survives ties
        day.sort_by_key(|occurrence| occurrence.start());
        day
    }

    /// Occurrences for every date in `from..=to`, one entry per day.
    pub fn occurrences_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<(NaiveDate, Vec<Occurrence>)> {
        from.iter_days()
            .take_while(|date| *date <= to)
            .map(|date| (date, self.occurrences_on(date)))
            .collect()
    }

    /// Projects `master` onto `date`, or `None` when it does not occur then.
    ///
    /// Non-recurring masters are returned verbatim. Recurring ones get an
    /// instance id, the anchor's time of day on `date`, and their completion
    /// state from the ledger.
    pub fn project(&self, master: &MasterTask, date: NaiveDate) -> Option<Occurrence> {
        if !occurs_on(master, date, self.offset) {
            return None;
        }
        if !master.is_recurring() {
            return Some(Occurrence {
                instance_id: None,
                task: master.clone(),
            });
        }
        let start = compose(master.start_time?, date, self.offset)?;
        let mut task = master.clone();
        task.start_time = Some(start);
        task.completed = self.ledger.is_completed(&master.id, date);
        Some(Occurrence {
            instance_id: Some(InstanceId::new(master.id.clone(), date)),
            task,
        })
    }

    /// Looks up a master or one of its occurrences.
    ///
    /// An instance id resolves only while its date still satisfies the
    /// master's recurrence rule; otherwise the lookup yields `None`.
    pub fn resolve(&self, target: &TaskRef) -> Option<Occurrence> {
        match target {
            TaskRef::Instance(instance) => {
                // a master id that merely looks like an instance id wins
                let literal = instance.to_string();
                if let Some(master) = self.find(&literal) {
                    return Some(Occurrence {
                        instance_id: None,
                        task: master.clone(),
                    });
                }
                let master = self.find(&instance.master_id)?;
                self.project(master, instance.date)
            }
            TaskRef::Master(id) => self.find(id).map(|master| Occurrence {
                instance_id: None,
                task: master.clone(),
            }),
        }
    }

    pub fn find(&self, master_id: &str) -> Option<&'a MasterTask> {
        self.masters.iter().copied().find(|m| m.id == master_id)
    }
}

/// The anchor's time of day placed on `date`, in the calendar offset.
pub fn compose(anchor: DateTime<Utc>, date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let time = anchor.with_timezone(&offset).time();
    date.and_time(time)
        .and_local_timezone(offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
}
