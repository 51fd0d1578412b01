//! Seams to the collaborators that live outside the scheduling core.
//!
//! The core never talks to an AI service or a notification system directly.
//! It consumes their output through these traits and validates it before
//! anything reaches the [`TaskStore`](crate::store::TaskStore).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{MasterTask, Priority, Recurrence, Suggestion, SuggestionKind};
use crate::reminders::Notification;

/// A task shape proposed by the text-to-task collaborator. Every field is
/// optional until [`DraftTask::validate`] accepts it.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DraftTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub reminder: Option<u32>,
}

impl DraftTask {
    /// Turns the draft into a master task, rejecting missing required fields.
    pub fn validate(self) -> Result<MasterTask> {
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::invalid_task("title", "is required"))?;
        let duration = self
            .duration
            .ok_or_else(|| Error::invalid_task("duration", "is required"))?;
        let recurrence = self.recurrence.unwrap_or_default();
        if recurrence != Recurrence::None && self.start_time.is_none() {
            return Err(Error::invalid_task("recurrence", "requires a start time"));
        }
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(MasterTask {
            id,
            title,
            description: self.description,
            start_time: self.start_time,
            duration,
            priority: self.priority.unwrap_or_default(),
            recurrence,
            completed: false,
            reminder: self.reminder,
            is_holiday: false,
        })
    }
}

#[derive(Deserialize, Debug, Clone)]
struct DraftSuggestion {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: SuggestionKind,
    title: String,
    #[serde(default)]
    details: String,
    #[serde(default)]
    duration: Option<u32>,
}

impl From<DraftSuggestion> for Suggestion {
    fn from(draft: DraftSuggestion) -> Self {
        Suggestion {
            id: draft
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            kind: draft.kind,
            title: draft.title,
            details: draft.details,
            duration: draft.duration,
        }
    }
}

/// Result of turning free text into tasks.
#[derive(Debug, Clone, Default)]
pub struct ParsedSchedule {
    pub scheduled_tasks: Vec<DraftTask>,
    pub unscheduled_tasks: Vec<DraftTask>,
    pub suggestions: Vec<Suggestion>,
}

/// Turns free text into task drafts, given the existing schedule as context.
pub trait TextToTask {
    fn parse_and_schedule(&self, text: &str, existing: &[MasterTask]) -> Result<ParsedSchedule>;
}

/// Proposes new start times for a set of tasks.
///
/// Implementations must return the same ids they were given. The store
/// checks this and keeps the old schedule when they don't.
pub trait Rebalancer {
    fn rebalance(&self, tasks: &[MasterTask]) -> Result<Vec<MasterTask>>;
}

/// Delivers reminders and follow-ups to the user.
pub trait Notifier {
    fn deliver(&mut self, notification: &Notification);
}

/// Strips a Markdown code fence (with optional language tag) around a reply.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let body = match trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        Some(body) => body,
        None => return trimmed,
    };
    body.trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim()
}

#[derive(Deserialize)]
struct ScheduleReply {
    #[serde(default)]
    schedule: Vec<DraftTask>,
    #[serde(default)]
    suggestions: Vec<DraftSuggestion>,
}

/// Accepts a collaborator reply that is already JSON:
/// `{ "schedule": [...], "suggestions": [...] }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTextToTask;

impl TextToTask for JsonTextToTask {
    fn parse_and_schedule(&self, text: &str, _existing: &[MasterTask]) -> Result<ParsedSchedule> {
        let reply: ScheduleReply = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
            warn!(error = %e, "malformed text-to-task reply");
            Error::Collaborator(format!("invalid text-to-task reply: {}", e))
        })?;
        let (scheduled_tasks, unscheduled_tasks) = reply
            .schedule
            .into_iter()
            .partition(|draft| draft.start_time.is_some());
        Ok(ParsedSchedule {
            scheduled_tasks,
            unscheduled_tasks,
            suggestions: reply.suggestions.into_iter().map(Suggestion::from).collect(),
        })
    }
}

/// A rebalanced schedule proposed ahead of time, e.g. read from a file.
#[derive(Debug, Clone)]
pub struct JsonRebalancer {
    proposal: String,
}

impl JsonRebalancer {
    pub fn new(proposal: impl Into<String>) -> Self {
        JsonRebalancer { proposal: proposal.into() }
    }
}

impl Rebalancer for JsonRebalancer {
    fn rebalance(&self, _tasks: &[MasterTask]) -> Result<Vec<MasterTask>> {
        serde_json::from_str(strip_code_fence(&self.proposal))
            .map_err(|e| Error::Collaborator(format!("invalid rebalance proposal: {}", e)))
    }
}
