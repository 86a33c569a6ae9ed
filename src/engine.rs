//! Scan, organize and restore batches.
//!
//! An [`Organizer`] ties the workspace (rules, filters, settings) to the move
//! executor and the history ledger. Every batch starts from a [`RunSnapshot`]
//! taken when the batch begins, so edits made while it runs only affect the
//! next batch. Organize and restore calls on the same root are serialized.
//!
//! ```no_run
//! use ruletidy::engine::{CancelToken, Organizer};
//! use ruletidy::workspace::Workspace;
//! use std::path::Path;
//!
//! let organizer = Organizer::new(Workspace::open("/home/me/.config/ruletidy")?);
//! let summary = organizer.organize(Path::new("/home/me/Downloads"), &CancelToken::new(), |_| {})?;
//! println!("moved {}, errors {}", summary.moved, summary.errors);
//! # Ok::<(), ruletidy::error::Error>(())
//! ```

use crate::ai::{AiMode, AiRequest, AiSuggestion, Classifier};
use crate::error::{Error, FilesystemError, Result};
use crate::events::{LogEntry, RunEvent};
use crate::filter::FilterPolicy;
use crate::history::{HistoryLedger, RestoreResult, Session, SessionKind};
use crate::mover::{MoveExecutor, MoveRecord};
use crate::rules::{CompiledRules, is_system_folder, normalize_lexically};
use crate::settings::UnclassifiedPolicy;
use crate::workspace::Workspace;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Where an assignment came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentSource {
    Rule { name: String },
    /// No rule matched and the unclassified policy routed the file.
    Fallback,
    Ai { reason: String },
}

impl fmt::Display for AssignmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentSource::Rule { name } => write!(f, "rule {}", name),
            AssignmentSource::Fallback => write!(f, "fallback"),
            AssignmentSource::Ai { .. } => write!(f, "ai"),
        }
    }
}

/// A decided move: `file` goes into `folder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub file: PathBuf,
    /// Absolute destination folder.
    pub folder: PathBuf,
    /// Label recorded in history: rule name, fallback label or AI folder.
    pub category: String,
    pub source: AssignmentSource,
}

impl Assignment {
    /// Builds an assignment from a classifier suggestion.
    ///
    /// Only the final component of the suggested file is used, so a
    /// suggestion can never reach outside `root`.
    pub fn from_suggestion(root: &Path, suggestion: &AiSuggestion) -> Self {
        let file = match Path::new(&suggestion.file).file_name() {
            Some(name) => root.join(name),
            None => root.join(&suggestion.file),
        };
        Self {
            file,
            folder: resolve_folder(root, Path::new(&suggestion.folder)),
            category: suggestion.folder.clone(),
            source: AssignmentSource::Ai {
                reason: suggestion.reason.clone(),
            },
        }
    }

    pub fn file_name(&self) -> String {
        self.file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.file.display().to_string())
    }
}

/// Relative rule folders live under the organized root. `.` and `..` are
/// folded so the result can be checked against protected folders.
pub fn resolve_folder(root: &Path, folder: &Path) -> PathBuf {
    normalize_lexically(&root.join(folder))
}

/// Eligible files directly under a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub root: PathBuf,
    pub files: Vec<String>,
}

impl ScanReport {
    pub fn count(&self) -> usize {
        self.files.len()
    }
}

/// What an organize run would do, without doing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub assignments: Vec<Assignment>,
    pub unclassified: Vec<String>,
}

/// Counters reported when a batch ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeSummary {
    /// Id of the recorded session, `None` when nothing was recorded.
    pub session_id: Option<u64>,
    pub total: usize,
    pub moved: usize,
    pub errors: usize,
    /// Files left in place because no rule matched.
    pub unclassified: usize,
    /// Files already sitting at their destination.
    pub unchanged: usize,
    /// Attempted files whose record could not be written to history.
    pub unrecorded: usize,
    pub cancelled: bool,
}

/// Cooperative cancellation flag, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Rules, filters and unclassified policy frozen for one batch.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub profile: String,
    rules: CompiledRules,
    filter: FilterPolicy,
    unclassified: UnclassifiedPolicy,
}

enum Step {
    Move(Assignment),
    Unclassified(String),
}

impl RunSnapshot {
    /// Reads the active profile and the global settings once.
    pub fn capture(workspace: &Workspace) -> Result<Self> {
        let settings = workspace.settings()?;
        let matcher = workspace.matcher()?;
        let profile = workspace.profiles().active()?;
        let rules = workspace.profiles().rules(&profile)?;
        for name in rules.catch_all_rules() {
            warn!(rule = %name, profile = %profile, "profile contains a catch-all rule");
        }
        Ok(Self {
            rules: rules.compile(&matcher)?,
            filter: settings.filters.compile(&matcher)?,
            unclassified: settings.unclassified,
            profile,
        })
    }

    pub fn is_eligible(&self, filename: &str) -> bool {
        self.filter.is_eligible(filename)
    }

    /// Destination for one file under `root`, if any.
    pub fn assign(&self, root: &Path, filename: &str) -> Option<Assignment> {
        if let Some(resolution) = self.rules.resolve(filename) {
            if resolution.catch_all {
                warn!(file = %filename, rule = %resolution.rule, "catch-all rule applied");
            }
            return Some(Assignment {
                file: root.join(filename),
                folder: resolve_folder(root, &resolution.folder),
                category: resolution.rule.clone(),
                source: AssignmentSource::Rule {
                    name: resolution.rule,
                },
            });
        }
        match &self.unclassified {
            UnclassifiedPolicy::Skip => None,
            UnclassifiedPolicy::Fallback { folder } => Some(Assignment {
                file: root.join(filename),
                folder: resolve_folder(root, Path::new(folder)),
                category: UnclassifiedPolicy::FALLBACK_CATEGORY.to_string(),
                source: AssignmentSource::Fallback,
            }),
        }
    }

    fn steps(&self, root: &Path, files: &[String]) -> Vec<Step> {
        files
            .iter()
            .map(|name| match self.assign(root, name) {
                Some(assignment) => Step::Move(assignment),
                None => Step::Unclassified(name.clone()),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct RootLocks {
    roots: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl RootLocks {
    fn for_root(&self, root: &Path) -> Arc<Mutex<()>> {
        let key = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let mut roots = self.roots.lock().unwrap_or_else(|e| e.into_inner());
        roots.entry(key).or_default().clone()
    }
}

/// Entry point for batches over a workspace.
#[derive(Debug, Clone)]
pub struct Organizer {
    workspace: Workspace,
    locks: Arc<RootLocks>,
}

impl Organizer {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            locks: Arc::new(RootLocks::default()),
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn history(&self) -> &HistoryLedger {
        self.workspace.history()
    }

    /// Lists eligible files under `root`.
    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        let snapshot = RunSnapshot::capture(&self.workspace)?;
        self.scan_with(root, &snapshot)
    }

    fn scan_with(&self, root: &Path, snapshot: &RunSnapshot) -> Result<ScanReport> {
        let files: Vec<String> = list_files(root)?
            .into_iter()
            .filter(|name| snapshot.is_eligible(name))
            .collect();
        debug!(root = %root.display(), count = files.len(), "scan finished");
        Ok(ScanReport {
            root: root.to_path_buf(),
            files,
        })
    }

    /// The assignments an organize run would execute right now.
    pub fn plan(&self, root: &Path) -> Result<Plan> {
        let snapshot = RunSnapshot::capture(&self.workspace)?;
        let report = self.scan_with(root, &snapshot)?;
        let mut plan = Plan::default();
        for step in snapshot.steps(root, &report.files) {
            match step {
                Step::Move(assignment) => plan.assignments.push(assignment),
                Step::Unclassified(name) => plan.unclassified.push(name),
            }
        }
        Ok(plan)
    }

    /// Classifies and moves every eligible file under `root`.
    pub fn organize(
        &self,
        root: &Path,
        cancel: &CancelToken,
        emit: impl FnMut(RunEvent),
    ) -> Result<OrganizeSummary> {
        let snapshot = RunSnapshot::capture(&self.workspace)?;
        self.organize_with(root, &snapshot, cancel, emit)
    }

    /// Same as [`organize`](Self::organize) with an already captured snapshot.
    pub fn organize_with(
        &self,
        root: &Path,
        snapshot: &RunSnapshot,
        cancel: &CancelToken,
        emit: impl FnMut(RunEvent),
    ) -> Result<OrganizeSummary> {
        let lock = self.locks.for_root(root);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let report = self.scan_with(root, snapshot)?;
        info!(
            root = %root.display(),
            profile = %snapshot.profile,
            files = report.count(),
            "organize started"
        );
        let steps = snapshot.steps(root, &report.files);
        self.run_session(root, SessionKind::Rules, steps, cancel, emit)
    }

    /// Moves files according to classifier suggestions.
    ///
    /// Suggestions are executed like rule matches. A suggested file that is
    /// not a regular file directly under `root` is recorded as an error.
    pub fn apply_suggestions(
        &self,
        root: &Path,
        suggestions: &[AiSuggestion],
        cancel: &CancelToken,
        emit: impl FnMut(RunEvent),
    ) -> Result<OrganizeSummary> {
        let lock = self.locks.for_root(root);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if !root.is_dir() {
            return Err(FilesystemError::Missing {
                path: root.to_path_buf(),
            }
            .into());
        }
        info!(root = %root.display(), suggestions = suggestions.len(), "applying suggestions");
        let steps = suggestions
            .iter()
            .map(|s| Step::Move(Assignment::from_suggestion(root, s)))
            .collect();
        self.run_session(root, SessionKind::Ai, steps, cancel, emit)
    }

    /// Asks `classifier` about the eligible files under `root` and applies
    /// its suggestions.
    pub fn classify_and_apply(
        &self,
        root: &Path,
        classifier: &dyn Classifier,
        instructions: &str,
        mode: AiMode,
        cancel: &CancelToken,
        emit: impl FnMut(RunEvent),
    ) -> Result<OrganizeSummary> {
        let report = self.scan(root)?;
        let request = AiRequest {
            root: root.to_path_buf(),
            instructions: instructions.to_string(),
            mode,
            files: report.files,
        };
        let suggestions = classifier.classify(&request)?;
        self.apply_suggestions(root, &suggestions, cancel, emit)
    }

    /// Runs an organize batch on a background thread.
    pub fn spawn_organize(&self, root: impl Into<PathBuf>) -> OrganizeRun {
        let root = root.into();
        let organizer = self.clone();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let (tx, events) = mpsc::channel();

        let handle = thread::spawn(move || {
            organizer.organize(&root, &worker_cancel, |event| {
                let _ = tx.send(event);
            })
        });

        OrganizeRun {
            events,
            cancel,
            handle,
        }
    }

    /// Reverses a recorded session, serialized with batches on its root.
    pub fn restore_session(&self, id: u64, emit: impl FnMut(RunEvent)) -> Result<RestoreResult> {
        let session = self.history().get(id)?;
        let lock = self.locks.for_root(&session.root_path);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.history().restore(id, emit)?)
    }

    fn run_session(
        &self,
        root: &Path,
        kind: SessionKind,
        steps: Vec<Step>,
        cancel: &CancelToken,
        mut emit: impl FnMut(RunEvent),
    ) -> Result<OrganizeSummary> {
        let mut session = self.history().begin_session(root, kind)?;
        let mut summary = self.run_steps(root, &mut session, steps, cancel, &mut emit);
        let kept = match self.history().close_session(&mut session) {
            Ok(kept) => kept,
            Err(err) => {
                warn!(session = session.id, error = %err, "session left open in history");
                !session.records.is_empty()
            }
        };

        summary.session_id = kept.then_some(session.id);
        info!(
            session = session.id,
            moved = summary.moved,
            errors = summary.errors,
            unclassified = summary.unclassified,
            unrecorded = summary.unrecorded,
            cancelled = summary.cancelled,
            "batch finished"
        );
        Ok(summary)
    }

    fn run_steps(
        &self,
        root: &Path,
        session: &mut Session,
        steps: Vec<Step>,
        cancel: &CancelToken,
        emit: &mut impl FnMut(RunEvent),
    ) -> OrganizeSummary {
        let total = steps.len();
        let mut summary = OrganizeSummary {
            total,
            ..Default::default()
        };

        for (index, step) in steps.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed = index, total, "batch cancelled");
                summary.cancelled = true;
                break;
            }

            match step {
                Step::Unclassified(name) => {
                    debug!(file = %name, "no rule matched");
                    summary.unclassified += 1;
                }
                Step::Move(assignment) => {
                    let record = execute(root, &assignment);
                    if record.is_noop() {
                        summary.unchanged += 1;
                    } else {
                        match record.error {
                            Some(_) => summary.errors += 1,
                            None => summary.moved += 1,
                        }
                        emit(RunEvent::Log(LogEntry::from(&record)));
                        let dest = record.dest_path.clone();
                        if let Err(err) = self.history().append(session, record) {
                            warn!(
                                file = %assignment.file.display(),
                                dest = %dest.display(),
                                error = %err,
                                "move not recorded in history"
                            );
                            summary.unrecorded += 1;
                        }
                    }
                }
            }
            emit(RunEvent::progress(index + 1, total));
        }
        summary
    }
}

/// Performs one assignment, refusing anything that is not a plain file or
/// that targets a system folder outside the root.
fn execute(root: &Path, assignment: &Assignment) -> MoveRecord {
    let refuse = |err: FilesystemError| {
        warn!(file = %assignment.file.display(), error = %err, "move refused");
        MoveRecord::failure(
            assignment.file.clone(),
            assignment.folder.join(assignment.file_name()),
            &assignment.category,
            &err,
        )
    };

    if !assignment.folder.starts_with(normalize_lexically(root))
        && is_system_folder(&assignment.folder)
    {
        return refuse(FilesystemError::Protected {
            path: assignment.folder.clone(),
        });
    }
    match fs::symlink_metadata(&assignment.file) {
        Err(_) => refuse(FilesystemError::Missing {
            path: assignment.file.clone(),
        }),
        Ok(meta) if !meta.is_file() => refuse(FilesystemError::NotAFile {
            path: assignment.file.clone(),
        }),
        Ok(_) => MoveExecutor::move_file(&assignment.file, &assignment.folder, &assignment.category),
    }
}

/// Regular, non-hidden files directly under `root`, sorted by name.
fn list_files(root: &Path) -> Result<Vec<String>, FilesystemError> {
    if !root.is_dir() {
        return Err(FilesystemError::Missing {
            path: root.to_path_buf(),
        });
    }
    let entries = fs::read_dir(root).map_err(|e| FilesystemError::ReadDir {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut files: Vec<String> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| !name.starts_with('.'))
        .collect();
    files.sort();
    Ok(files)
}

/// Handle to a background organize run.
///
/// Iterating yields events as the worker produces them and ends when the
/// worker finishes.
pub struct OrganizeRun {
    events: mpsc::Receiver<RunEvent>,
    cancel: CancelToken,
    handle: JoinHandle<Result<OrganizeSummary>>,
}

impl OrganizeRun {
    /// Requests cancellation; takes effect before the next file.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the worker and returns its summary.
    pub fn finish(self) -> Result<OrganizeSummary> {
        self.handle.join().map_err(|_| Error::WorkerPanicked)?
    }
}

impl Iterator for OrganizeRun {
    type Item = RunEvent;

    fn next(&mut self) -> Option<RunEvent> {
        self.events.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterMode;
    use crate::mover::MoveStatus;
    use crate::rules::Rule;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Env {
        _temp: TempDir,
        root: PathBuf,
        organizer: Organizer,
    }

    fn env(rules: Vec<Rule>) -> Env {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("downloads");
        fs::create_dir(&root).unwrap();
        let workspace = Workspace::open(temp.path().join("config")).unwrap();
        workspace.save_rules(rules).unwrap();
        Env {
            root,
            organizer: Organizer::new(workspace),
            _temp: temp,
        }
    }

    fn touch(root: &Path, names: &[&str]) {
        for name in names {
            fs::write(root.join(name), name).unwrap();
        }
    }

    fn images_and_docs() -> Vec<Rule> {
        vec![
            Rule::new("Images", ["jpg", "png"], "Images"),
            Rule::new("Docs", ["pdf"], "Docs"),
        ]
    }

    #[test]
    fn test_scan_skips_hidden_dirs_and_excluded() {
        let env = env(images_and_docs());
        touch(&env.root, &["x.tmp", "y.txt", ".hidden"]);
        fs::create_dir(env.root.join("folder")).unwrap();
        env.organizer
            .workspace()
            .save_ignore_list(vec!["*.tmp".to_string()])
            .unwrap();

        let report = env.organizer.scan(&env.root).unwrap();
        assert_eq!(report.files, vec!["y.txt".to_string()]);
        assert_eq!(report.count(), 1);
    }

    #[test]
    fn test_plan_resolves_first_match() {
        let env = env(images_and_docs());
        touch(&env.root, &["a.jpg", "b.pdf", "c.txt"]);

        let plan = env.organizer.plan(&env.root).unwrap();
        assert_eq!(plan.assignments.len(), 2);
        assert_eq!(plan.assignments[0].folder, env.root.join("Images"));
        assert_eq!(plan.assignments[1].folder, env.root.join("Docs"));
        assert_eq!(plan.unclassified, vec!["c.txt".to_string()]);
        assert!(env.root.join("a.jpg").exists());
    }

    #[test]
    fn test_organize_moves_and_records() {
        let env = env(images_and_docs());
        touch(&env.root, &["a.jpg", "b.pdf", "c.txt"]);

        let mut events = Vec::new();
        let summary = env
            .organizer
            .organize(&env.root, &CancelToken::new(), |e| events.push(e))
            .unwrap();

        assert_eq!(summary.moved, 2);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.unclassified, 1);
        assert!(env.root.join("Images/a.jpg").exists());
        assert!(env.root.join("Docs/b.pdf").exists());
        assert!(env.root.join("c.txt").exists());

        let progress = events
            .iter()
            .filter(|e| matches!(e, RunEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 3);

        let session = env
            .organizer
            .workspace()
            .history()
            .get(summary.session_id.unwrap())
            .unwrap();
        assert_eq!(session.records.len(), 2);
        assert_eq!(session.kind, SessionKind::Rules);
    }

    #[test]
    fn test_partial_failure_records_both() {
        let env = env(vec![
            Rule::new("Docs", ["pdf"], "Docs"),
            Rule::new("Images", ["jpg"], "Images"),
        ]);
        touch(&env.root, &["report.pdf", "photo.jpg"]);
        // A file where the Docs folder should be makes that move fail.
        fs::write(env.root.join("Docs"), "blocker").unwrap();

        let summary = env
            .organizer
            .organize(&env.root, &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(summary.moved, 1);
        assert_eq!(summary.errors, 1);
        let session = env
            .organizer
            .workspace()
            .history()
            .get(summary.session_id.unwrap())
            .unwrap();
        let statuses: Vec<MoveStatus> = session.records.iter().map(|r| r.status).collect();
        assert!(statuses.contains(&MoveStatus::Success));
        assert!(statuses.contains(&MoveStatus::Error));
        assert!(env.root.join("report.pdf").exists());
    }

    #[test]
    fn test_unclassified_fallback() {
        let env = env(images_and_docs());
        touch(&env.root, &["notes.txt"]);
        let ws = env.organizer.workspace();
        let mut settings = ws.settings().unwrap();
        settings.unclassified = UnclassifiedPolicy::Fallback {
            folder: "Unsorted".to_string(),
        };
        ws.save_settings(&settings).unwrap();

        let summary = env
            .organizer
            .organize(&env.root, &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(summary.moved, 1);
        assert_eq!(summary.unclassified, 0);
        assert!(env.root.join("Unsorted/notes.txt").exists());
    }

    #[test]
    fn test_cancelled_run_closes_session() {
        let env = env(images_and_docs());
        touch(&env.root, &["a.jpg", "b.jpg"]);
        let cancel = CancelToken::new();

        let summary = env
            .organizer
            .organize(&env.root, &cancel, |event| {
                if matches!(event, RunEvent::Progress { index: 1, .. }) {
                    cancel.cancel();
                }
            })
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.moved, 1);
        let session = env
            .organizer
            .workspace()
            .history()
            .get(summary.session_id.unwrap())
            .unwrap();
        assert!(session.closed);
        assert_eq!(session.records.len(), 1);
    }

    #[test]
    fn test_nothing_to_do_leaves_no_session() {
        let env = env(images_and_docs());
        touch(&env.root, &["c.txt"]);

        let summary = env
            .organizer
            .organize(&env.root, &CancelToken::new(), |_| {})
            .unwrap();
        assert_eq!(summary.session_id, None);
        assert!(env.organizer.workspace().get_history().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_ignores_later_edits() {
        let env = env(images_and_docs());
        touch(&env.root, &["a.jpg"]);
        let ws = env.organizer.workspace();

        let snapshot = RunSnapshot::capture(ws).unwrap();
        ws.save_rules(vec![Rule::new("Pictures", ["jpg"], "Pictures")])
            .unwrap();
        ws.set_filter_mode(FilterMode::Include).unwrap();

        env.organizer
            .organize_with(&env.root, &snapshot, &CancelToken::new(), |_| {})
            .unwrap();
        assert!(env.root.join("Images/a.jpg").exists());
    }

    #[test]
    fn test_restore_round_trip_is_idempotent() {
        let env = env(images_and_docs());
        touch(&env.root, &["a.jpg"]);
        let summary = env
            .organizer
            .organize(&env.root, &CancelToken::new(), |_| {})
            .unwrap();
        let id = summary.session_id.unwrap();

        let first = env.organizer.restore_session(id, |_| {}).unwrap();
        assert_eq!(first.restored, 1);
        assert!(env.root.join("a.jpg").exists());
        assert!(!env.root.join("Images").exists());

        let second = env.organizer.restore_session(id, |_| {}).unwrap();
        assert_eq!(second.restored, 0);
        assert_eq!(second.errors, 0);
    }

    #[test]
    fn test_apply_suggestions() {
        let env = env(Vec::new());
        touch(&env.root, &["invoice.pdf"]);
        let suggestions = vec![
            AiSuggestion {
                file: "invoice.pdf".to_string(),
                folder: "Finance".to_string(),
                reason: "invoice".to_string(),
            },
            AiSuggestion {
                file: "../escape.txt".to_string(),
                folder: "Elsewhere".to_string(),
                reason: String::new(),
            },
        ];

        let summary = env
            .organizer
            .apply_suggestions(&env.root, &suggestions, &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(summary.moved, 1);
        assert_eq!(summary.errors, 1);
        assert!(env.root.join("Finance/invoice.pdf").exists());
        let session = env
            .organizer
            .workspace()
            .history()
            .get(summary.session_id.unwrap())
            .unwrap();
        assert_eq!(session.kind, SessionKind::Ai);
        assert_eq!(session.records[0].category, "Finance");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_parent_dir_suggestion_cannot_reach_system_folder() {
        let env = env(Vec::new());
        touch(&env.root, &["payload.sh"]);
        let suggestion = AiSuggestion {
            file: "payload.sh".to_string(),
            folder: format!("{}etc/ruletidy", "../".repeat(64)),
            reason: String::new(),
        };
        assert_eq!(
            Assignment::from_suggestion(&env.root, &suggestion).folder,
            PathBuf::from("/etc/ruletidy")
        );

        let summary = env
            .organizer
            .apply_suggestions(&env.root, &[suggestion], &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(summary.moved, 0);
        assert_eq!(summary.errors, 1);
        assert!(env.root.join("payload.sh").exists());
        let session = env
            .organizer
            .workspace()
            .history()
            .get(summary.session_id.unwrap())
            .unwrap();
        let expected = FilesystemError::Protected {
            path: PathBuf::from("/etc/ruletidy"),
        };
        assert_eq!(session.records[0].error, Some(expected.to_string()));
    }

    #[test]
    fn test_parent_dir_inside_root_still_moves() {
        let env = env(Vec::new());
        touch(&env.root, &["a.txt"]);
        let suggestion = AiSuggestion {
            file: "a.txt".to_string(),
            folder: "Drafts/../Notes".to_string(),
            reason: String::new(),
        };

        let summary = env
            .organizer
            .apply_suggestions(&env.root, &[suggestion], &CancelToken::new(), |_| {})
            .unwrap();

        assert_eq!(summary.moved, 1);
        assert!(env.root.join("Notes/a.txt").exists());
        assert!(!env.root.join("Drafts").exists());
    }

    #[test]
    fn test_unwritable_history_does_not_stop_batch() {
        let env = env(images_and_docs());
        touch(&env.root, &["a.jpg", "b.pdf", "c.png"]);
        // A directory in place of the temp file makes every history save fail.
        let blocker = env
            .organizer
            .workspace()
            .history()
            .path()
            .with_extension("json.tmp");

        let summary = env
            .organizer
            .organize(&env.root, &CancelToken::new(), |event| {
                if matches!(event, RunEvent::Progress { index: 1, .. }) {
                    fs::create_dir(&blocker).unwrap();
                }
            })
            .unwrap();

        assert_eq!(summary.moved, 3);
        assert_eq!(summary.unrecorded, 2);
        assert!(env.root.join("Images/a.jpg").exists());
        assert!(env.root.join("Docs/b.pdf").exists());
        assert!(env.root.join("Images/c.png").exists());

        fs::remove_dir(&blocker).unwrap();
        let id = summary.session_id.unwrap();
        let session = env.organizer.workspace().history().get(id).unwrap();
        assert_eq!(session.records.len(), 1);
        assert!(!session.closed);

        let restored = env.organizer.restore_session(id, |_| {}).unwrap();
        assert_eq!(restored.restored, 1);
        assert!(env.root.join("a.jpg").exists());
    }

    /// Starts an organize of `root` on another thread that pauses on its
    /// first moved file until `release` fires. Returns once it is paused.
    fn paused_organize(
        organizer: &Organizer,
        root: &Path,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> (mpsc::Sender<()>, JoinHandle<Result<OrganizeSummary>>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let organizer = organizer.clone();
        let root = root.to_path_buf();
        let order = Arc::clone(order);

        let handle = thread::spawn(move || {
            organizer.organize(&root, &CancelToken::new(), |event| match event {
                RunEvent::Log(_) => {
                    entered_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                }
                RunEvent::Progress { index, total, .. } if index == total => {
                    order.lock().unwrap().push("organize");
                }
                _ => {}
            })
        });
        entered_rx.recv().unwrap();
        (release_tx, handle)
    }

    fn background_restore(
        organizer: &Organizer,
        id: u64,
        order: &Arc<Mutex<Vec<&'static str>>>,
    ) -> mpsc::Receiver<Result<RestoreResult>> {
        let (done_tx, done_rx) = mpsc::channel();
        let organizer = organizer.clone();
        let order = Arc::clone(order);
        thread::spawn(move || {
            let result = organizer.restore_session(id, |_| {});
            order.lock().unwrap().push("restore");
            done_tx.send(result).unwrap();
        });
        done_rx
    }

    #[test]
    fn test_restore_waits_for_organize_on_same_root() {
        let env = env(images_and_docs());
        touch(&env.root, &["old.jpg"]);
        let earlier = env
            .organizer
            .organize(&env.root, &CancelToken::new(), |_| {})
            .unwrap()
            .session_id
            .unwrap();
        touch(&env.root, &["new.pdf"]);
        let order = Arc::new(Mutex::new(Vec::new()));

        let (release, organizing) = paused_organize(&env.organizer, &env.root, &order);
        let restoring = background_restore(&env.organizer, earlier, &order);
        assert!(restoring.recv_timeout(Duration::from_millis(300)).is_err());

        release.send(()).unwrap();
        assert_eq!(organizing.join().unwrap().unwrap().moved, 1);
        let restored = restoring.recv().unwrap().unwrap();
        assert_eq!(restored.restored, 1);
        assert_eq!(*order.lock().unwrap(), vec!["organize", "restore"]);
        assert!(env.root.join("old.jpg").exists());
        assert!(env.root.join("Docs/new.pdf").exists());
    }

    #[test]
    fn test_other_roots_are_not_blocked() {
        let env = env(images_and_docs());
        let other = env.root.with_file_name("other");
        fs::create_dir(&other).unwrap();
        touch(&other, &["old.jpg"]);
        let earlier = env
            .organizer
            .organize(&other, &CancelToken::new(), |_| {})
            .unwrap()
            .session_id
            .unwrap();
        touch(&env.root, &["new.pdf"]);
        let order = Arc::new(Mutex::new(Vec::new()));

        let (release, organizing) = paused_organize(&env.organizer, &env.root, &order);
        let restoring = background_restore(&env.organizer, earlier, &order);
        let restored = restoring
            .recv_timeout(Duration::from_secs(10))
            .expect("restore of another root should not wait")
            .unwrap();
        assert_eq!(restored.restored, 1);

        release.send(()).unwrap();
        organizing.join().unwrap().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["restore", "organize"]);
        assert!(other.join("old.jpg").exists());
    }

    struct ByExtension;

    impl Classifier for ByExtension {
        fn classify(
            &self,
            request: &AiRequest,
        ) -> std::result::Result<Vec<AiSuggestion>, crate::error::ExternalServiceError> {
            Ok(request
                .files
                .iter()
                .map(|file| AiSuggestion {
                    file: file.clone(),
                    folder: format!("{}-files", crate::rules::file_extension(file)),
                    reason: request.instructions.clone(),
                })
                .collect())
        }
    }

    #[test]
    fn test_classifier_sees_only_eligible_files() {
        let env = env(Vec::new());
        touch(&env.root, &["a.txt", "b.tmp"]);
        env.organizer
            .workspace()
            .save_ignore_list(vec!["*.tmp".to_string()])
            .unwrap();

        let summary = env
            .organizer
            .classify_and_apply(
                &env.root,
                &ByExtension,
                "group by type",
                AiMode::NameOnly,
                &CancelToken::new(),
                |_| {},
            )
            .unwrap();

        assert_eq!(summary.moved, 1);
        assert!(env.root.join("txt-files/a.txt").exists());
        assert!(env.root.join("b.tmp").exists());
    }

    #[test]
    fn test_background_run_streams_events() {
        let env = env(images_and_docs());
        touch(&env.root, &["a.jpg", "b.pdf"]);

        let mut run = env.organizer.spawn_organize(env.root.clone());
        let events: Vec<RunEvent> = run.by_ref().collect();
        let summary = run.finish().unwrap();

        assert_eq!(summary.moved, 2);
        assert!(matches!(
            events.last(),
            Some(RunEvent::Progress { index: 2, total: 2, .. })
        ));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let env = env(images_and_docs());
        let missing = env.root.join("nope");
        assert!(matches!(
            env.organizer.scan(&missing),
            Err(Error::Filesystem(FilesystemError::Missing { .. }))
        ));
    }
}
