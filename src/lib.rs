//! ruletidy - rule-driven folder organizer
//!
//! Scans a folder, decides a destination for each eligible file from an
//! ordered list of user rules (or from classifier suggestions), moves the
//! files without ever overwriting anything, and records every move in a
//! history that can be restored later.

pub mod ai;
pub mod cli;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod history;
pub mod logging;
pub mod mover;
pub mod output;
pub mod pattern;
pub mod profiles;
pub mod rules;
pub mod settings;
pub mod workspace;

pub use ai::{AiSuggestion, Classifier, parse_suggestions};
pub use engine::{Assignment, AssignmentSource, CancelToken, OrganizeSummary, Organizer, RunSnapshot};
pub use error::{ConfigError, Error, ExternalServiceError, FilesystemError, HistoryError};
pub use events::{LogEntry, RunEvent};
pub use filter::{FilterMode, FilterPolicy};
pub use history::{HistoryLedger, RestoreResult, Session, SessionKind};
pub use mover::{MoveExecutor, MoveRecord, MoveStatus};
pub use pattern::{CaseSensitivity, PatternMatcher};
pub use profiles::{ProfileStore, SharedRuleSet};
pub use rules::{Rule, RuleSet};
pub use settings::{Settings, UnclassifiedPolicy};
pub use workspace::Workspace;
