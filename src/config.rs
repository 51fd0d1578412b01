use std::path::PathBuf;

use chrono::{FixedOffset, Local, NaiveTime, Offset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Top-level settings read from `config.toml`. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub gaps: GapConfig,

    #[serde(default)]
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Offset used to decide which calendar day a timestamp falls on.
    /// Absent means the machine's local offset at startup.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,

    #[serde(default = "default_true")]
    pub holidays: bool,
}

impl CalendarConfig {
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: None,
            holidays: default_true(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// How long a deleted task can be restored.
    #[serde(default = "default_undo_seconds")]
    pub undo_seconds: u64,

    /// Minutes of work that count as a fully loaded day.
    #[serde(default = "default_load_baseline_minutes")]
    pub load_baseline_minutes: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            undo_seconds: default_undo_seconds(),
            load_baseline_minutes: default_load_baseline_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapConfig {
    #[serde(default = "default_work_start", with = "hhmm")]
    pub work_start: NaiveTime,

    #[serde(default = "default_work_end", with = "hhmm")]
    pub work_end: NaiveTime,

    #[serde(default = "default_min_gap_minutes")]
    pub min_gap_minutes: u32,

    /// Number of filler ideas offered for a qualifying gap.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            work_start: default_work_start(),
            work_end: default_work_end(),
            min_gap_minutes: default_min_gap_minutes(),
            sample_size: default_sample_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    #[serde(default = "default_follow_up_min_minutes")]
    pub follow_up_min_minutes: u32,

    #[serde(default = "default_follow_up_max_minutes")]
    pub follow_up_max_minutes: u32,

    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u32,

    /// When set, snoozing clears the one-shot state so the reminder can fire again.
    #[serde(default)]
    pub snooze_rearms: bool,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            follow_up_min_minutes: default_follow_up_min_minutes(),
            follow_up_max_minutes: default_follow_up_max_minutes(),
            snooze_minutes: default_snooze_minutes(),
            snooze_rearms: false,
        }
    }
}

fn default_true() -> bool { true }
fn default_undo_seconds() -> u64 { 5 }
fn default_load_baseline_minutes() -> u32 { 8 * 60 }
fn default_work_start() -> NaiveTime { NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN) }
fn default_work_end() -> NaiveTime { NaiveTime::from_hms_opt(17, 30, 0).unwrap_or(NaiveTime::MIN) }
fn default_min_gap_minutes() -> u32 { 30 }
fn default_sample_size() -> usize { 3 }
fn default_tick_seconds() -> u64 { 30 }
fn default_follow_up_min_minutes() -> u32 { 1 }
fn default_follow_up_max_minutes() -> u32 { 60 }
fn default_snooze_minutes() -> u32 { 5 }

/// `HH:MM` times in the config file.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M").map_err(serde::de::Error::custom)
    }
}

/// Returns the path to `config.toml`.
///
/// The path is determined in the following order:
/// 1. `DAYWEAVE_CONFIG` environment variable.
/// 2. `~/.config/dayweave/config.toml` (on Linux).
/// 3. `./config.toml` (fallback).
pub fn config_path() -> PathBuf {
    std::env::var("DAYWEAVE_CONFIG").map(PathBuf::from).unwrap_or_else(|_| {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("dayweave");
        p.push("config.toml");
        p
    })
}

/// Loads the config file, falling back to defaults when it does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_path();
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AppConfig::default());
    }
    let s = std::fs::read_to_string(&path)?;
    let cfg = toml::from_str::<AppConfig>(&s)?;
    debug!(path = %path.display(), "loaded config");
    Ok(cfg)
}
