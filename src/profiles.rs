//! Named, switchable rule sets.
//!
//! Each profile is stored as `profiles/<name>.json` holding its ordered rule
//! list. The active profile name lives in the settings file. A profile called
//! `Default` always exists and can be neither renamed nor deleted.

use crate::error::ConfigError;
use crate::rules::{Rule, RuleSet, default_rules};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_PROFILE: &str = "Default";

/// A profile and the rules it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub rules: RuleSet,
}

/// A rule set exchanged with other users.
///
/// Installing one is equivalent to creating a profile and saving its rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedRuleSet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Filesystem-backed profile registry.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
    settings_path: PathBuf,
}

impl ProfileStore {
    /// Opens the store, creating the directory and the `Default` profile
    /// (seeded with the standard rules) when missing.
    pub fn open(dir: impl Into<PathBuf>, settings_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let store = Self {
            dir: dir.into(),
            settings_path: settings_path.into(),
        };
        fs::create_dir_all(&store.dir).map_err(|e| ConfigError::Io {
            path: store.dir.clone(),
            source: e,
        })?;
        if !store.profile_path(DEFAULT_PROFILE).exists() {
            let seed = RuleSet::new(default_rules())?;
            store.write_rules(DEFAULT_PROFILE, &seed)?;
            info!("seeded Default profile");
        }
        Ok(store)
    }

    pub fn list(&self) -> Result<BTreeSet<String>, ConfigError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| ConfigError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut names: BTreeSet<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        names.insert(DEFAULT_PROFILE.to_string());
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.list().is_ok_and(|names| names.contains(name))
    }

    /// Creates an empty profile.
    ///
    /// # Errors
    ///
    /// `InvalidProfileName` for blank names or disallowed characters,
    /// `DuplicateName` when a profile with that exact name exists.
    pub fn create(&self, name: &str) -> Result<String, ConfigError> {
        let name = validate_name(name)?;
        self.ensure_free(&name)?;
        self.write_rules(&name, &RuleSet::default())?;
        info!(profile = %name, "profile created");
        Ok(name)
    }

    /// Renames a profile, carrying the active selection along.
    pub fn rename(&self, old: &str, new: &str) -> Result<String, ConfigError> {
        if old == DEFAULT_PROFILE {
            return Err(ConfigError::ProtectedProfile(old.to_string()));
        }
        let new = validate_name(new)?;
        if !self.exists(old) {
            return Err(ConfigError::NotFound(old.to_string()));
        }
        if new == old {
            return Ok(new);
        }
        self.ensure_free(&new)?;

        fs::rename(self.profile_path(old), self.profile_path(&new)).map_err(|e| {
            ConfigError::Io {
                path: self.profile_path(old),
                source: e,
            }
        })?;

        if self.active()? == old {
            self.set_active(&new)?;
        }
        info!(from = %old, to = %new, "profile renamed");
        Ok(new)
    }

    /// Deletes a profile; deleting the active one reactivates `Default`.
    pub fn delete(&self, name: &str) -> Result<(), ConfigError> {
        if name == DEFAULT_PROFILE {
            return Err(ConfigError::ProtectedProfile(name.to_string()));
        }
        if !self.exists(name) {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        let was_active = self.active()? == name;

        let path = self.profile_path(name);
        fs::remove_file(&path).map_err(|e| ConfigError::Io { path, source: e })?;

        if was_active {
            self.set_active(DEFAULT_PROFILE)?;
        }
        info!(profile = %name, "profile deleted");
        Ok(())
    }

    pub fn set_active(&self, name: &str) -> Result<(), ConfigError> {
        if !self.exists(name) {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        let mut settings = Settings::load(&self.settings_path)?;
        settings.active_profile = name.to_string();
        settings.save(&self.settings_path)
    }

    /// The active profile, or `Default` if the stored one disappeared.
    pub fn active(&self) -> Result<String, ConfigError> {
        let settings = Settings::load(&self.settings_path)?;
        if self.exists(&settings.active_profile) {
            Ok(settings.active_profile)
        } else {
            Ok(DEFAULT_PROFILE.to_string())
        }
    }

    pub fn load(&self, name: &str) -> Result<Profile, ConfigError> {
        Ok(Profile {
            name: name.to_string(),
            rules: self.rules(name)?,
        })
    }

    pub fn rules(&self, name: &str) -> Result<RuleSet, ConfigError> {
        let path = self.profile_path(name);
        if !path.exists() {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        let json = fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Invalid {
            path,
            reason: e.to_string(),
        })
    }

    /// Validates every rule, then replaces the profile's rule list.
    pub fn save_rules(&self, name: &str, rules: Vec<Rule>) -> Result<RuleSet, ConfigError> {
        if !self.exists(name) {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        let rules = RuleSet::new(rules)?;
        self.write_rules(name, &rules)?;
        Ok(rules)
    }

    /// Installs a shared rule set as a new profile under a free name
    /// (`name`, `name (1)`, `name (2)`, ...).
    pub fn install(&self, shared: &SharedRuleSet) -> Result<String, ConfigError> {
        let rules = RuleSet::new(shared.rules.clone())?;

        let cleaned: String = shared.name.chars().filter(|c| allowed_char(*c)).collect();
        let base = match cleaned.trim() {
            "" => "Community Rule".to_string(),
            trimmed => trimmed.to_string(),
        };

        let mut name = base.clone();
        let mut counter = 1;
        while self.exists(&name) || self.profile_path(&name).exists() {
            name = format!("{} ({})", base, counter);
            counter += 1;
        }

        self.write_rules(&name, &rules)?;
        info!(profile = %name, rules = rules.len(), "shared rule set installed");
        Ok(name)
    }

    pub fn export(&self, name: &str) -> Result<SharedRuleSet, ConfigError> {
        Ok(SharedRuleSet {
            name: name.to_string(),
            description: None,
            author: None,
            rules: self.rules(name)?.into_rules(),
        })
    }

    fn ensure_free(&self, name: &str) -> Result<(), ConfigError> {
        if self.exists(name) || self.profile_path(name).exists() {
            return Err(ConfigError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn write_rules(&self, name: &str, rules: &RuleSet) -> Result<(), ConfigError> {
        let path = self.profile_path(name);
        let json = serde_json::to_string_pretty(rules).map_err(|e| ConfigError::Invalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| ConfigError::Io { path, source: e })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn allowed_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '(' | ')')
}

/// Trims a profile name and checks it is usable as a file stem.
fn validate_name(name: &str) -> Result<String, ConfigError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || !trimmed.chars().all(allowed_char) {
        return Err(ConfigError::InvalidProfileName(name.to_string()));
    }
    Ok(trimmed.to_string())
}
