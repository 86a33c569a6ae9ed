//! Durable, restorable log of organize sessions.
//!
//! Every organize run opens a [`Session`], appends one [`MoveRecord`] per file
//! it attempted, and closes the session when the run ends. Records are written
//! through to disk as they arrive so an interrupted run still leaves a
//! restorable session behind.
//!
//! Restoring a session walks its records newest-first and moves each
//! successful file back. Restored records are marked [`MoveStatus::Undo`] and
//! skipped by later restores, which makes restoring the same session twice
//! harmless.
use crate::error::HistoryError;
use crate::events::{LogEntry, RunEvent};
use crate::mover::{MoveExecutor, MoveRecord, MoveStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// How the assignments of a session were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    #[default]
    Rules,
    Ai,
}

/// One organize run and the outcome of every file it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    /// Local wall-clock start time, `YYYY-MM-DD HH:MM:SS`.
    pub date: String,
    pub started_at: DateTime<Utc>,
    pub root_path: PathBuf,
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default)]
    pub records: Vec<MoveRecord>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub fully_restored: bool,
}

impl Session {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            date: self.date.clone(),
            root_path: self.root_path.clone(),
            kind: self.kind,
            count: self.count(),
            moved: self
                .records
                .iter()
                .filter(|r| r.status != MoveStatus::Error)
                .count(),
            closed: self.closed,
            fully_restored: self.fully_restored,
        }
    }
}

/// Listing view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: u64,
    pub date: String,
    pub root_path: PathBuf,
    pub kind: SessionKind,
    pub count: usize,
    pub moved: usize,
    pub closed: bool,
    pub fully_restored: bool,
}

/// Outcome of restoring a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreResult {
    pub session_id: u64,
    pub restored: usize,
    pub errors: usize,
    /// Records skipped because an earlier restore already reversed them.
    pub already_restored: usize,
    /// Files moved back whose `Undo` mark could not be written to history.
    pub unrecorded: usize,
    pub failures: Vec<(PathBuf, String)>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    last_id: u64,
    #[serde(default)]
    sessions: Vec<Session>,
}

/// Sole writer of the persisted session log.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    path: PathBuf,
    guard: Arc<Mutex<()>>,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens and persists a new session for `root`.
    pub fn begin_session(&self, root: &Path, kind: SessionKind) -> Result<Session, HistoryError> {
        self.mutate(|file| {
            file.last_id = file
                .last_id
                .max(file.sessions.iter().map(|s| s.id).max().unwrap_or(0))
                + 1;
            let session = Session {
                id: file.last_id,
                date: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                started_at: Utc::now(),
                root_path: root.to_path_buf(),
                kind,
                records: Vec::new(),
                closed: false,
                fully_restored: false,
            };
            file.sessions.push(session.clone());
            info!(session = session.id, root = %root.display(), "session started");
            Ok(session)
        })
    }

    /// Appends a record to an open session, in memory and on disk.
    pub fn append(&self, session: &mut Session, record: MoveRecord) -> Result<(), HistoryError> {
        if session.closed {
            return Err(HistoryError::SessionClosed(session.id));
        }
        let id = session.id;
        self.mutate(|file| {
            let stored = find_session(file, id)?;
            stored.records.push(record.clone());
            Ok(())
        })?;
        session.records.push(record);
        Ok(())
    }

    /// Closes a session. Sessions without records are dropped from the log.
    ///
    /// Returns `false` when the session was discarded.
    pub fn close_session(&self, session: &mut Session) -> Result<bool, HistoryError> {
        let id = session.id;
        let keep = !session.records.is_empty();
        self.mutate(|file| {
            if keep {
                find_session(file, id)?.closed = true;
            } else {
                file.sessions.retain(|s| s.id != id);
            }
            Ok(())
        })?;
        session.closed = true;
        info!(session = id, records = session.count(), kept = keep, "session closed");
        Ok(keep)
    }

    /// All sessions, most recent first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, HistoryError> {
        let _lock = self.lock();
        let mut sessions: Vec<SessionSummary> =
            self.load()?.sessions.iter().map(Session::summary).collect();
        sessions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(sessions)
    }

    pub fn get(&self, id: u64) -> Result<Session, HistoryError> {
        let _lock = self.lock();
        self.load()?
            .sessions
            .into_iter()
            .find(|s| s.id == id)
            .ok_or(HistoryError::SessionNotFound(id))
    }

    /// Moves every successfully relocated file of a session back.
    ///
    /// Per-record failures (file moved or deleted since, permission problems)
    /// are counted and reported without stopping the rest of the restore.
    /// Each reversed record is persisted as `Undo` as soon as it is moved.
    /// Marks that fail to save are retried once when the restore ends and
    /// counted in [`RestoreResult::unrecorded`] if they still fail.
    pub fn restore(
        &self,
        id: u64,
        mut emit: impl FnMut(RunEvent),
    ) -> Result<RestoreResult, HistoryError> {
        let session = self.get(id)?;
        let total = session.records.len();
        let mut result = RestoreResult {
            session_id: id,
            ..Default::default()
        };
        let mut unsaved = Vec::new();
        info!(session = id, records = total, "restoring session");

        for (step, index) in (0..total).rev().enumerate() {
            let record = &session.records[index];
            match record.status {
                MoveStatus::Undo => result.already_restored += 1,
                MoveStatus::Error => {}
                MoveStatus::Success if record.is_noop() => {}
                MoveStatus::Success => {
                    match restore_record(record) {
                        Ok(restored_to) => {
                            let marked =
                                self.mutate(|file| mark_undone(file, id, &[index]).map(|_| ()));
                            if let Err(err) = marked {
                                warn!(
                                    file = %record.source_path.display(),
                                    error = %err,
                                    "restored file could not be marked in history"
                                );
                                unsaved.push(index);
                            }
                            result.restored += 1;
                            prune_empty_dirs(&record.dest_path, &session.root_path);
                            emit(RunEvent::Log(LogEntry {
                                file: record.file_name(),
                                category: "Restored".to_string(),
                                status: MoveStatus::Undo,
                                details: (restored_to != record.source_path)
                                    .then(|| format!("restored as {}", restored_to.display())),
                            }));
                        }
                        Err(reason) => {
                            warn!(file = %record.dest_path.display(), %reason, "restore failed");
                            result.errors += 1;
                            result
                                .failures
                                .push((record.dest_path.clone(), reason.clone()));
                            emit(RunEvent::Log(LogEntry {
                                file: record.file_name(),
                                category: "Restored".to_string(),
                                status: MoveStatus::Error,
                                details: Some(reason),
                            }));
                        }
                    }
                }
            }
            emit(RunEvent::progress(step + 1, total));
        }

        let finished = self.mutate(|file| {
            let stored = mark_undone(file, id, &unsaved)?;
            stored.fully_restored = !stored
                .records
                .iter()
                .any(|r| r.status == MoveStatus::Success && !r.is_noop());
            Ok(())
        });
        if let Err(err) = finished {
            warn!(session = id, unsaved = unsaved.len(), error = %err, "restore state not saved");
            result.unrecorded = unsaved.len();
        }

        info!(
            session = id,
            restored = result.restored,
            errors = result.errors,
            already = result.already_restored,
            unrecorded = result.unrecorded,
            "restore finished"
        );
        Ok(result)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut HistoryFile) -> Result<T, HistoryError>,
    ) -> Result<T, HistoryError> {
        let _lock = self.lock();
        let mut file = self.load()?;
        let out = f(&mut file)?;
        self.save(&file)?;
        Ok(out)
    }

    fn load(&self) -> Result<HistoryFile, HistoryError> {
        if !self.path.exists() {
            return Ok(HistoryFile::default());
        }
        let json = fs::read_to_string(&self.path).map_err(|e| HistoryError::Read {
            path: self.path.clone(),
            source: e,
        })?;
        if json.trim().is_empty() {
            return Ok(HistoryFile::default());
        }
        Ok(serde_json::from_str(&json)?)
    }

    fn save(&self, file: &HistoryFile) -> Result<(), HistoryError> {
        let write_err = |e| HistoryError::Write {
            path: self.path.clone(),
            source: e,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;
        debug!(path = %self.path.display(), "history saved");
        Ok(())
    }
}

fn find_session(file: &mut HistoryFile, id: u64) -> Result<&mut Session, HistoryError> {
    file.sessions
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or(HistoryError::SessionNotFound(id))
}

fn mark_undone<'a>(
    file: &'a mut HistoryFile,
    id: u64,
    indices: &[usize],
) -> Result<&'a mut Session, HistoryError> {
    let stored = find_session(file, id)?;
    for &index in indices {
        if let Some(record) = stored.records.get_mut(index) {
            record.mark_undone();
        }
    }
    Ok(stored)
}

/// Moves one record's file back next to where it came from.
fn restore_record(record: &MoveRecord) -> Result<PathBuf, String> {
    if fs::symlink_metadata(&record.dest_path).is_err() {
        return Err("file not found at recorded destination".to_string());
    }
    let (Some(dir), Some(name)) = (record.source_path.parent(), record.source_path.file_name())
    else {
        return Err("recorded source has no parent directory".to_string());
    };

    let moved_back = MoveExecutor::move_as(
        &record.dest_path,
        dir,
        &name.to_string_lossy(),
        &record.category,
    );
    match moved_back.status {
        MoveStatus::Success => Ok(moved_back.dest_path),
        _ => Err(moved_back
            .error
            .unwrap_or_else(|| "restore failed".to_string())),
    }
}

/// Removes folders emptied by a restore, walking up toward `root`.
///
/// Folders outside `root` are only removed one level deep; `root` itself is
/// never removed.
fn prune_empty_dirs(dest: &Path, root: &Path) {
    let mut dir = dest.parent();
    while let Some(current) = dir {
        if current == root || !is_empty_dir(current) {
            break;
        }
        if fs::remove_dir(current).is_err() {
            break;
        }
        debug!(dir = %current.display(), "removed empty folder");
        if !current.starts_with(root) {
            break;
        }
        dir = current.parent();
    }
}

fn is_empty_dir(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
