//! Eligibility gate applied to every scanned file before classification.
//!
//! Exactly one of two independently stored pattern lists is active:
//!
//! - **exclude** mode admits a file unless it matches an exclude pattern
//!   (an empty list admits everything);
//! - **include** mode admits a file only if it matches an include pattern
//!   (an empty list admits nothing).
//!
//! Switching mode never merges or clears the other list.

use crate::error::ConfigError;
use crate::pattern::{FilenamePattern, PatternMatcher};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which pattern list gates eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Exclude,
    Include,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Exclude => write!(f, "exclude"),
            FilterMode::Include => write!(f, "include"),
        }
    }
}

impl FromStr for FilterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(FilterMode::Exclude),
            "include" => Ok(FilterMode::Include),
            _ => Err(ConfigError::InvalidFilterMode(s.to_string())),
        }
    }
}

/// Both filter lists plus the active mode, as persisted in settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterLists {
    #[serde(default)]
    pub mode: FilterMode,

    /// Patterns consulted in exclude mode.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Patterns consulted in include mode.
    #[serde(default)]
    pub include: Vec<String>,
}

impl FilterLists {
    /// The list consulted under the current mode.
    pub fn active(&self) -> &[String] {
        match self.mode {
            FilterMode::Exclude => &self.exclude,
            FilterMode::Include => &self.include,
        }
    }

    pub fn list_mut(&mut self, mode: FilterMode) -> &mut Vec<String> {
        match mode {
            FilterMode::Exclude => &mut self.exclude,
            FilterMode::Include => &mut self.include,
        }
    }

    /// Compiles the active list into a policy.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern in the active list fails to compile.
    pub fn compile(&self, matcher: &PatternMatcher) -> Result<FilterPolicy, ConfigError> {
        FilterPolicy::new(self.mode, self.active(), matcher)
    }
}

/// Compiled eligibility gate for one run.
#[derive(Debug, Clone)]
pub struct FilterPolicy {
    mode: FilterMode,
    patterns: Vec<FilenamePattern>,
}

impl FilterPolicy {
    pub fn new(
        mode: FilterMode,
        patterns: &[String],
        matcher: &PatternMatcher,
    ) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| matcher.compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { mode, patterns })
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn is_eligible(&self, filename: &str) -> bool {
        let hit = self.patterns.iter().any(|p| p.matches(filename));
        match self.mode {
            FilterMode::Exclude => !hit,
            FilterMode::Include => hit,
        }
    }
}
