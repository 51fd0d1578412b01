use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::store::{BackupData, PendingUndo, StoreSettings, TaskStore};

/// Returns the path to the schedule database file (`schedule.json`).
///
/// The path is determined in the following order:
/// 1. `DAYWEAVE_DB` environment variable.
/// 2. `~/.local/share/dayweave/schedule.json` (on Linux).
/// 3. `./schedule.json` (fallback).
pub fn db_path() -> PathBuf {
    std::env::var("DAYWEAVE_DB").map(PathBuf::from).unwrap_or_else(|_| {
        let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("dayweave");
        if !p.exists() {
            let _ = fs::create_dir_all(&p);
        }
        p.push("schedule.json");
        p
    })
}

/// Returns the path to the pending undo file (`undo.json`).
///
/// Located in the same directory as the schedule database.
fn undo_path() -> PathBuf {
    let mut p = db_path();
    p.pop();
    p.push("undo.json");
    p
}

fn read_file(path: &Path) -> Result<String> {
    let mut f = OpenOptions::new().read(true).open(path)?;
    let mut s = String::new();
    f.read_to_string(&mut s)?;
    Ok(s)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    f.write_all(contents.as_bytes())?;
    Ok(())
}

/// Loads the persisted document.
///
/// Returns an empty document if the file does not exist yet.
pub fn load_document() -> Result<BackupData> {
    let path = db_path();
    if !path.exists() {
        return Ok(BackupData::default());
    }
    let s = read_file(&path)?;
    serde_json::from_str(&s).map_err(|e| Error::InvalidBackup(format!("{}: {}", path.display(), e)))
}

/// Saves the document, overwriting the existing file.
pub fn save_document(doc: &BackupData) -> Result<()> {
    let path = db_path();
    let s = serde_json::to_string_pretty(doc)?;
    write_file(&path, &s)?;
    debug!(path = %path.display(), "schedule saved");
    Ok(())
}

/// Loads the pending undo record, if any.
pub fn load_pending_undo() -> Option<PendingUndo> {
    let path = undo_path();
    if !path.exists() {
        return None;
    }
    let parsed = read_file(&path).and_then(|s| serde_json::from_str(&s).map_err(Error::from));
    match parsed {
        Ok(pending) => Some(pending),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable undo file");
            None
        }
    }
}

/// Saves the pending undo record; `None` removes the file.
pub fn save_pending_undo(pending: Option<&PendingUndo>) -> Result<()> {
    let path = undo_path();
    match pending {
        Some(pending) => write_file(&path, &serde_json::to_string_pretty(pending)?),
        None => {
            if path.exists() {
                fs::remove_file(path)?;
            }
            Ok(())
        }
    }
}

/// Builds the task store from disk using `config`.
pub fn load_store(config: &AppConfig) -> Result<TaskStore> {
    let settings = StoreSettings::from_config(config);
    let mut store = TaskStore::from_document(load_document()?, settings)?;
    if config.calendar.holidays {
        let year = Utc::now().with_timezone(&store.offset()).year();
        store = store.with_holidays(year - 2..=year + 2);
    }
    store.set_pending_undo(load_pending_undo());
    store.expire_undo(Utc::now());
    Ok(store)
}

/// Persists the store's document and its pending undo.
pub fn save_store(store: &TaskStore) -> Result<()> {
    save_document(&store.to_document())?;
    save_pending_undo(store.pending_undo_record())
}

/// Writes a backup of the store to `path`.
pub fn export_backup(store: &TaskStore, path: &Path) -> Result<()> {
    let s = serde_json::to_string_pretty(&store.to_document())?;
    write_file(path, &s)
}

/// Reads a backup file for [`TaskStore::restore_json`].
pub fn read_backup(path: &Path) -> Result<String> {
    read_file(path)
}

/// Deletes the schedule database and undo files.
pub fn delete_database() -> Result<()> {
    let db = db_path();
    if db.exists() {
        fs::remove_file(db)?;
    }
    let undo = undo_path();
    if undo.exists() {
        fs::remove_file(undo)?;
    }
    Ok(())
}
