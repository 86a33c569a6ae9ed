//! On-disk home of settings, profiles and history.
//!
//! ```text
//! <config dir>/
//!   settings.toml
//!   history.json
//!   profiles/
//!     Default.json
//!     <name>.json
//! ```
//!
//! The directory is resolved from an explicit path, then `$RULETIDY_HOME`,
//! then `~/.config/ruletidy`.

use crate::error::{ConfigError, Result};
use crate::filter::{FilterLists, FilterMode};
use crate::history::{HistoryLedger, SessionSummary};
use crate::pattern::{CaseSensitivity, PatternMatcher};
use crate::profiles::ProfileStore;
use crate::rules::{Rule, RuleSet};
use crate::settings::Settings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HOME_ENV: &str = "RULETIDY_HOME";

const SETTINGS_FILE: &str = "settings.toml";
const HISTORY_FILE: &str = "history.json";
const PROFILES_DIR: &str = "profiles";

/// Resolves the configuration directory without touching the filesystem.
pub fn locate(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Ok(dir) = std::env::var(HOME_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    match std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        Ok(home) => PathBuf::from(home).join(".config").join("ruletidy"),
        Err(_) => PathBuf::from(".ruletidy"),
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    profiles: ProfileStore,
    history: HistoryLedger,
}

impl Workspace {
    /// Opens (and if needed creates) the workspace rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ConfigError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let profiles = ProfileStore::open(dir.join(PROFILES_DIR), dir.join(SETTINGS_FILE))?;
        let history = HistoryLedger::new(dir.join(HISTORY_FILE));
        debug!(dir = %dir.display(), "workspace opened");
        Ok(Self {
            dir,
            profiles,
            history,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Settings::load(&self.settings_path())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.save(&self.settings_path())
    }

    fn update_settings(&self, f: impl FnOnce(&mut Settings)) -> Result<(), ConfigError> {
        let mut settings = self.settings()?;
        f(&mut settings);
        self.save_settings(&settings)
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn history(&self) -> &HistoryLedger {
        &self.history
    }

    /// Pattern matcher honouring the stored case override.
    pub fn matcher(&self) -> Result<PatternMatcher, ConfigError> {
        let settings = self.settings()?;
        Ok(PatternMatcher::new(CaseSensitivity::from_override(
            settings.case_sensitive,
        )))
    }

    /// Rules of the active profile.
    pub fn get_rules(&self) -> Result<RuleSet, ConfigError> {
        self.profiles.rules(&self.profiles.active()?)
    }

    /// Replaces the rules of the active profile after validating all of them.
    pub fn save_rules(&self, rules: Vec<Rule>) -> Result<RuleSet, ConfigError> {
        self.profiles.save_rules(&self.profiles.active()?, rules)
    }

    pub fn get_filters(&self) -> Result<FilterLists, ConfigError> {
        Ok(self.settings()?.filters)
    }

    pub fn get_ignore_list(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.settings()?.filters.exclude)
    }

    /// Stores the exclude list; the include list is left untouched.
    pub fn save_ignore_list(&self, patterns: Vec<String>) -> Result<(), ConfigError> {
        let patterns = self.checked(patterns)?;
        self.update_settings(|s| s.filters.exclude = patterns)
    }

    pub fn get_include_list(&self) -> Result<Vec<String>, ConfigError> {
        Ok(self.settings()?.filters.include)
    }

    /// Stores the include list; the exclude list is left untouched.
    pub fn save_include_list(&self, patterns: Vec<String>) -> Result<(), ConfigError> {
        let patterns = self.checked(patterns)?;
        self.update_settings(|s| s.filters.include = patterns)
    }

    pub fn get_filter_mode(&self) -> Result<FilterMode, ConfigError> {
        Ok(self.settings()?.filters.mode)
    }

    pub fn set_filter_mode(&self, mode: FilterMode) -> Result<(), ConfigError> {
        self.update_settings(|s| s.filters.mode = mode)
    }

    /// The folder organized when no root is given explicitly.
    pub fn get_target_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.settings()?.resolved_target())
    }

    pub fn set_target_path(&self, path: &Path) -> Result<(), ConfigError> {
        if !path.is_dir() {
            return Err(ConfigError::TargetNotFound(path.to_path_buf()));
        }
        let path = path.to_path_buf();
        self.update_settings(|s| s.target_path = Some(path))
    }

    pub fn get_history(&self) -> Result<Vec<SessionSummary>> {
        Ok(self.history.list_sessions()?)
    }

    /// Trims blanks and rejects patterns that would not compile.
    fn checked(&self, patterns: Vec<String>) -> Result<Vec<String>, ConfigError> {
        let matcher = self.matcher()?;
        let mut kept = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.trim().to_string();
            if pattern.is_empty() {
                continue;
            }
            matcher.compile(&pattern)?;
            kept.push(pattern);
        }
        Ok(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_locate_prefers_explicit_dir() {
        let dir = Path::new("/tmp/explicit-config");
        assert_eq!(locate(Some(dir)), dir.to_path_buf());
    }

    #[test]
    fn test_open_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::open(temp_dir.path().join("cfg")).unwrap();

        assert!(ws.dir().join("profiles").join("Default.json").exists());
        assert_eq!(ws.get_rules().unwrap().len(), 5);
        assert!(ws.get_history().unwrap().is_empty());
    }

    #[test]
    fn test_filter_lists_are_independent() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::open(temp_dir.path()).unwrap();

        ws.save_ignore_list(vec!["*.tmp".to_string(), "  ".to_string()])
            .unwrap();
        ws.save_include_list(vec!["*.pdf".to_string()]).unwrap();
        ws.set_filter_mode(FilterMode::Include).unwrap();

        assert_eq!(ws.get_ignore_list().unwrap(), vec!["*.tmp".to_string()]);
        assert_eq!(ws.get_include_list().unwrap(), vec!["*.pdf".to_string()]);
        assert_eq!(ws.get_filter_mode().unwrap(), FilterMode::Include);

        ws.set_filter_mode(FilterMode::Exclude).unwrap();
        assert_eq!(ws.get_include_list().unwrap(), vec!["*.pdf".to_string()]);
    }

    #[test]
    fn test_filters_survive_profile_switch() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::open(temp_dir.path()).unwrap();
        ws.save_ignore_list(vec!["*.log".to_string()]).unwrap();

        ws.profiles().create("Work").unwrap();
        ws.profiles().set_active("Work").unwrap();

        assert_eq!(ws.get_ignore_list().unwrap(), vec!["*.log".to_string()]);
        assert!(ws.get_rules().unwrap().is_empty());
    }

    #[test]
    fn test_save_rules_targets_active_profile() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::open(temp_dir.path()).unwrap();
        ws.profiles().create("Work").unwrap();
        ws.profiles().set_active("Work").unwrap();

        ws.save_rules(vec![Rule::new("Docs", ["pdf"], "Docs")])
            .unwrap();

        assert_eq!(ws.get_rules().unwrap().len(), 1);
        assert_eq!(ws.profiles().rules("Default").unwrap().len(), 5);
    }

    #[test]
    fn test_target_path_must_exist() {
        let temp_dir = TempDir::new().unwrap();
        let ws = Workspace::open(temp_dir.path().join("cfg")).unwrap();

        let missing = temp_dir.path().join("nope");
        let err = ws.set_target_path(&missing).unwrap_err();
        assert!(matches!(&err, ConfigError::TargetNotFound(path) if path == &missing));
        assert_eq!(
            err.to_string(),
            format!("target folder {} does not exist", missing.display())
        );
        ws.set_target_path(temp_dir.path()).unwrap();
        assert_eq!(ws.get_target_path().unwrap(), temp_dir.path());
    }
}
