//! Error taxonomy shared by the rule engine, the move pipeline and the
//! persistence layer.
//!
//! A classification miss (no rule matched a file) is deliberately absent:
//! it is an ordinary outcome reported as `None` from rule resolution and as
//! a counter in run summaries.

use std::path::PathBuf;

/// Rejected configuration edits and unreadable configuration files.
///
/// Edits are validated before anything is written, so receiving one of these
/// means nothing was persisted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rule name must not be empty")]
    MissingRuleName,

    #[error("rule '{rule}' has no destination folder")]
    MissingFolder { rule: String },

    #[error(
        "rule '{rule}' has no extensions and no filename pattern; mark it as catch-all to apply it to every file"
    )]
    CatchAllRule { rule: String },

    #[error("rule '{rule}' targets protected system folder {}", folder.display())]
    ProtectedDestination { rule: String, folder: PathBuf },

    #[error(
        "rule '{rule}' folder {} climbs out of the organized folder; use an absolute path instead",
        folder.display()
    )]
    EscapingFolder { rule: String, folder: PathBuf },

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unknown filter mode '{0}': expected 'exclude' or 'include'")]
    InvalidFilterMode(String),

    #[error("invalid profile name '{0}'")]
    InvalidProfileName(String),

    #[error("a profile named '{0}' already exists")]
    DuplicateName(String),

    #[error("profile '{0}' is protected and cannot be renamed or deleted")]
    ProtectedProfile(String),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("rule '{0}' not found")]
    RuleNotFound(String),

    #[error("target folder {} does not exist", .0.display())]
    TargetNotFound(PathBuf),

    #[error("invalid configuration in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("configuration I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A filesystem failure tied to one specific file.
#[derive(Debug, thiserror::Error)]
pub enum FilesystemError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("{} has no file name component", path.display())]
    NoFileName { path: PathBuf },

    #[error("{} is not a regular file", path.display())]
    NotAFile { path: PathBuf },

    #[error("refusing to move into protected folder {}", path.display())]
    Protected { path: PathBuf },

    #[error("cannot read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reading or writing the move history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to read history file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write history file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid history file format: {0}")]
    Format(#[from] serde_json::Error),

    #[error("session {0} not found")]
    SessionNotFound(u64),

    #[error("session {0} is already closed")]
    SessionClosed(u64),
}

/// Failures reported by external collaborators such as an AI classifier or a
/// rule-sharing backend. The core passes them through untouched.
#[derive(Debug, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("classifier response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("classifier returned no suggestions")]
    NoSuggestions,

    #[error("{0}")]
    Service(String),
}

/// Umbrella error for the engine and the command-line surface.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    External(#[from] ExternalServiceError),

    #[error("background run terminated unexpectedly")]
    WorkerPanicked,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
