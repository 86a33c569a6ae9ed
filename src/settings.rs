//! Process-wide settings persisted as TOML.
//!
//! ```toml
//! target_path = "/home/me/Downloads"
//! active_profile = "Default"
//! case_sensitive = false
//!
//! [unclassified]
//! policy = "fallback"
//! folder = "Unsorted"
//!
//! [filters]
//! mode = "exclude"
//! exclude = ["*.tmp", "*.crdownload"]
//! include = []
//! ```
//!
//! Filter lists are global: switching profiles never changes them.

use crate::error::ConfigError;
use crate::filter::FilterLists;
use crate::profiles::DEFAULT_PROFILE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What to do with files no rule claims.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum UnclassifiedPolicy {
    /// Leave the file where it is.
    #[default]
    Skip,
    /// Route the file into `folder` (relative to the root unless absolute).
    Fallback { folder: String },
}

impl UnclassifiedPolicy {
    /// Category label recorded for files routed by the fallback.
    pub const FALLBACK_CATEGORY: &'static str = "Unsorted";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Folder scanned when no explicit root is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,

    #[serde(default = "default_profile_name")]
    pub active_profile: String,

    /// Overrides the platform default case behaviour of pattern matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    #[serde(default)]
    pub unclassified: UnclassifiedPolicy,

    #[serde(default)]
    pub filters: FilterLists,
}

fn default_profile_name() -> String {
    DEFAULT_PROFILE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_path: None,
            active_profile: default_profile_name(),
            case_sensitive: None,
            unclassified: UnclassifiedPolicy::default(),
            filters: FilterLists::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file is
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if TOML parsing fails and
    /// `ConfigError::Io` if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// The folder to organize: the stored target if it still exists,
    /// otherwise `~/Downloads`.
    pub fn resolved_target(&self) -> PathBuf {
        match &self.target_path {
            Some(path) if path.is_dir() => path.clone(),
            _ => default_target(),
        }
    }
}

fn default_target() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("Downloads")
}
