//! Collision-safe file relocation.
//!
//! This module moves single files into destination folders and reports every
//! attempt as a [`MoveRecord`]. Destination folders (and their parents) are
//! created on demand, existing files are never overwritten, and failures are
//! captured in the record instead of being raised so a batch can carry on.
use crate::error::FilesystemError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one relocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveStatus {
    Success,
    Error,
    /// A successful move that has since been reversed.
    Undo,
}

impl std::fmt::Display for MoveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveStatus::Success => write!(f, "Success"),
            MoveStatus::Error => write!(f, "Error"),
            MoveStatus::Undo => write!(f, "Undo"),
        }
    }
}

/// The recorded result of attempting to relocate one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub source_path: PathBuf,
    /// Final location, or the intended one when the move failed.
    pub dest_path: PathBuf,
    /// Rule name or classifier label that chose the destination.
    pub category: String,
    pub status: MoveStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

impl MoveRecord {
    pub fn success(source: PathBuf, dest: PathBuf, category: &str) -> Self {
        Self {
            source_path: source,
            dest_path: dest,
            category: category.to_string(),
            status: MoveStatus::Success,
            timestamp: Utc::now(),
            error: None,
            restored_at: None,
        }
    }

    pub fn failure(source: PathBuf, dest: PathBuf, category: &str, error: &FilesystemError) -> Self {
        Self {
            source_path: source,
            dest_path: dest,
            category: category.to_string(),
            status: MoveStatus::Error,
            timestamp: Utc::now(),
            error: Some(error.to_string()),
            restored_at: None,
        }
    }

    /// A success that left the file where it was.
    pub fn is_noop(&self) -> bool {
        self.status == MoveStatus::Success && self.source_path == self.dest_path
    }

    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Marks a successful move as reversed.
    pub fn mark_undone(&mut self) {
        self.status = MoveStatus::Undo;
        self.restored_at = Some(Utc::now());
    }
}

/// Moves files into destination folders without ever overwriting.
pub struct MoveExecutor;

impl MoveExecutor {
    /// Moves `source` into `dest_dir`, keeping its file name when free.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ruletidy::mover::{MoveExecutor, MoveStatus};
    /// use std::path::Path;
    ///
    /// let record = MoveExecutor::move_file(
    ///     Path::new("/home/me/Downloads/report.pdf"),
    ///     Path::new("/home/me/Downloads/Documents"),
    ///     "Documents",
    /// );
    /// if record.status == MoveStatus::Error {
    ///     eprintln!("{}", record.error.unwrap_or_default());
    /// }
    /// ```
    pub fn move_file(source: &Path, dest_dir: &Path, category: &str) -> MoveRecord {
        match source.file_name() {
            Some(name) => Self::move_as(source, dest_dir, &name.to_string_lossy(), category),
            None => {
                let err = FilesystemError::NoFileName {
                    path: source.to_path_buf(),
                };
                MoveRecord::failure(source.to_path_buf(), dest_dir.to_path_buf(), category, &err)
            }
        }
    }

    /// Moves `source` into `dest_dir` under `file_name`, disambiguating the
    /// name if something already occupies it.
    pub fn move_as(source: &Path, dest_dir: &Path, file_name: &str, category: &str) -> MoveRecord {
        let intended = dest_dir.join(file_name);
        match Self::try_move(source, dest_dir, file_name) {
            Ok(final_path) => {
                debug!(from = %source.display(), to = %final_path.display(), "moved");
                MoveRecord::success(source.to_path_buf(), final_path, category)
            }
            Err(err) => {
                warn!(file = %source.display(), error = %err, "move failed");
                MoveRecord::failure(source.to_path_buf(), intended, category, &err)
            }
        }
    }

    fn try_move(source: &Path, dest_dir: &Path, file_name: &str) -> Result<PathBuf, FilesystemError> {
        if fs::symlink_metadata(source).is_err() {
            return Err(FilesystemError::Missing {
                path: source.to_path_buf(),
            });
        }

        let direct = dest_dir.join(file_name);
        if is_same_file(source, &direct) {
            return Ok(source.to_path_buf());
        }

        fs::create_dir_all(dest_dir).map_err(|e| FilesystemError::CreateDir {
            path: dest_dir.to_path_buf(),
            source: e,
        })?;

        let destination = Self::unique_destination(dest_dir, file_name);
        relocate(source, &destination).map_err(|e| FilesystemError::Move {
            from: source.to_path_buf(),
            to: destination.clone(),
            source: e,
        })?;

        Ok(destination)
    }

    /// First free path of the form `name.ext`, `name (1).ext`, `name (2).ext`, ...
    pub fn unique_destination(dest_dir: &Path, file_name: &str) -> PathBuf {
        let candidate = dest_dir.join(file_name);
        if !occupied(&candidate) {
            return candidate;
        }

        let as_path = Path::new(file_name);
        let stem = as_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| file_name.to_string());
        let extension = as_path.extension().map(|e| e.to_string_lossy().to_string());

        let mut index = 1u32;
        loop {
            let name = match &extension {
                Some(ext) => format!("{} ({}).{}", stem, index, ext),
                None => format!("{} ({})", stem, index),
            };
            let candidate = dest_dir.join(name);
            if !occupied(&candidate) {
                return candidate;
            }
            index += 1;
        }
    }
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Renames, falling back to copy-then-delete across filesystems.
fn relocate(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(from, to)?;
            if let Err(e) = fs::remove_file(from) {
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}
