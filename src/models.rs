use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Priority assigned to a task.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort rank, lower is more important.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "h" => Ok(Priority::High),
            "medium" | "m" => Ok(Priority::Medium),
            "low" | "l" => Ok(Priority::Low),
            _ => Err(Error::invalid_input(s, "expected high, medium or low")),
        }
    }
}

/// Recurrence rule of a master task.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recurrence::None => "none",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
            Recurrence::Yearly => "yearly",
        };
        f.write_str(s)
    }
}

impl FromStr for Recurrence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Recurrence::None),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "monthly" => Ok(Recurrence::Monthly),
            "yearly" => Ok(Recurrence::Yearly),
            _ => Err(Error::invalid_input(
                s,
                "supported: none, daily, weekly, monthly, yearly",
            )),
        }
    }
}

/// The persisted, user-authored task record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MasterTask {
    /// Opaque identifier, stable for the task's lifetime.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Absent for unscheduled tasks. For recurring tasks this is the anchor.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Duration in minutes.
    pub duration: u32,
    pub priority: Priority,
    #[serde(default)]
    pub recurrence: Recurrence,
    /// Only meaningful for non-recurring tasks.
    #[serde(default)]
    pub completed: bool,
    /// Lead time in minutes before the start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<u32>,
    #[serde(default)]
    pub is_holiday: bool,
}

impl MasterTask {
    /// Creates an unscheduled, non-recurring task with a fresh id.
    pub fn new(title: impl Into<String>, duration: u32) -> Self {
        MasterTask {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            start_time: None,
            duration,
            priority: Priority::Medium,
            recurrence: Recurrence::None,
            completed: false,
            reminder: None,
            is_holiday: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn recurring(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_reminder(mut self, minutes: u32) -> Self {
        self.reminder = Some(minutes);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence != Recurrence::None
    }

    /// Reminder lead time, treating 0 as "no reminder".
    pub fn reminder_minutes(&self) -> Option<u32> {
        self.reminder.filter(|m| *m > 0)
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .map(|start| start + Duration::minutes(i64::from(self.duration)))
    }
}

/// Category of a suggestion.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuggestionKind {
    #[serde(rename = "meal")]
    Meal,
    #[serde(rename = "holiday_activity")]
    HolidayActivity,
    #[serde(rename = "task_breakdown")]
    TaskBreakdown,
    #[serde(rename = "well-being")]
    WellBeing,
    #[serde(rename = "social")]
    Social,
    #[serde(rename = "leisure")]
    Leisure,
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuggestionKind::Meal => "meal",
            SuggestionKind::HolidayActivity => "holiday activity",
            SuggestionKind::TaskBreakdown => "task breakdown",
            SuggestionKind::WellBeing => "well-being",
            SuggestionKind::Social => "social",
            SuggestionKind::Leisure => "leisure",
        };
        f.write_str(s)
    }
}

/// A categorized idea with no scheduling semantics until promoted to a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub title: String,
    #[serde(default)]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// Per-day handle of a recurring task: the master id plus a calendar date.
///
/// Rendered as `<master id>_<yyyy-MM-dd>`. Parsing splits on the *last*
/// underscore so master ids may themselves contain underscores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId {
    pub master_id: String,
    pub date: NaiveDate,
}

impl InstanceId {
    pub fn new(master_id: impl Into<String>, date: NaiveDate) -> Self {
        InstanceId { master_id: master_id.into(), date }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.master_id, self.date.format("%Y-%m-%d"))
    }
}

impl FromStr for InstanceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (master, date) = s
            .rsplit_once('_')
            .ok_or_else(|| Error::invalid_input(s, "missing instance date"))?;
        if master.is_empty() || date.len() != 10 {
            return Err(Error::invalid_input(s, "not an instance id"));
        }
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| Error::invalid_input(s, e.to_string()))?;
        Ok(InstanceId::new(master, date))
    }
}

impl Serialize for InstanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Anything a caller can use to address a task: a master id or an instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskRef {
    Master(String),
    Instance(InstanceId),
}

impl TaskRef {
    /// Interprets `s` as an instance id when it ends in `_<yyyy-MM-dd>`.
    pub fn parse(s: &str) -> TaskRef {
        match s.parse::<InstanceId>() {
            Ok(instance) => TaskRef::Instance(instance),
            Err(_) => TaskRef::Master(s.to_string()),
        }
    }

    pub fn master_id(&self) -> &str {
        match self {
            TaskRef::Master(id) => id,
            TaskRef::Instance(instance) => &instance.master_id,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            TaskRef::Master(_) => None,
            TaskRef::Instance(instance) => Some(instance.date),
        }
    }
}

impl From<InstanceId> for TaskRef {
    fn from(instance: InstanceId) -> Self {
        TaskRef::Instance(instance)
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::Master(id) => f.write_str(id),
            TaskRef::Instance(instance) => write!(f, "{}", instance),
        }
    }
}

/// A master task projected onto one concrete date. Never persisted.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Set for occurrences of recurring tasks only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    /// The master with `start_time` and `completed` projected for this date.
    #[serde(flatten)]
    pub task: MasterTask,
}

impl Occurrence {
    /// Stable per-day key: the instance id, or the master id for one-off tasks.
    pub fn key(&self) -> String {
        match &self.instance_id {
            Some(instance) => instance.to_string(),
            None => self.task.id.clone(),
        }
    }

    pub fn task_ref(&self) -> TaskRef {
        match &self.instance_id {
            Some(instance) => TaskRef::Instance(instance.clone()),
            None => TaskRef::Master(self.task.id.clone()),
        }
    }

    pub fn master_id(&self) -> &str {
        &self.task.id
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.task.start_time
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.task.end_time()
    }

    pub fn is_completed(&self) -> bool {
        self.task.completed
    }
}
