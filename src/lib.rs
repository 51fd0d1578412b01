//! # Dayweave
//!
//! Scheduling core for a personal planner: recurring tasks expanded into
//! per-day occurrences with their own completion state, idle-gap detection,
//! and a polling reminder/follow-up scheduler.
//!
//! The [`store::TaskStore`] owns the master tasks and the completion ledger.
//! [`occurrence::Materializer`] projects masters onto dates, and
//! [`reminders::ReminderScheduler`] decides what to notify about on each tick.

pub mod briefing;
pub mod collaborators;
pub mod commands;
pub mod config;
pub mod error;
pub mod gaps;
pub mod holidays;
pub mod ledger;
pub mod models;
pub mod occurrence;
pub mod recurrence;
pub mod reminders;
pub mod storage;
pub mod store;

pub use error::{Error, Result};
