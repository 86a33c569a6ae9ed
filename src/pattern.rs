//! Shell-style filename matching.
//!
//! Patterns support `*` (zero or more characters) and `?` (exactly one
//! character) and are anchored to the whole filename. Every other character,
//! including `[` and `]`, matches literally. A pattern may also contain the
//! capture marker `($)`, which behaves like `*` and records the text it
//! spanned so rules can route files into per-value subfolders. Case
//! insensitive matching folds every Unicode letter, for plain and capture
//! patterns alike, the same way extensions are compared:
//!
//! ```
//! use ruletidy::pattern::{CaseSensitivity, PatternMatcher};
//!
//! let matcher = PatternMatcher::new(CaseSensitivity::Insensitive);
//! assert!(matcher.matches("Report.PDF", "*.pdf"));
//! assert!(!matcher.matches("report.pdf", ""));
//!
//! let pattern = matcher.compile("Invoice_($)").unwrap();
//! let hit = pattern.find("Invoice_ACME.pdf").unwrap();
//! assert_eq!(hit.captured.as_deref(), Some("ACME"));
//! ```

use crate::error::ConfigError;
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use std::path::Path;

/// The marker that turns a pattern into a capture pattern.
pub const CAPTURE_MARKER: &str = "($)";

/// Whether letter case is significant when matching filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

impl CaseSensitivity {
    /// Case behaviour of the default filesystem of the target OS.
    pub fn native() -> Self {
        if cfg!(any(target_os = "macos", target_os = "windows")) {
            CaseSensitivity::Insensitive
        } else {
            CaseSensitivity::Sensitive
        }
    }

    /// Resolves an optional user override, falling back to [`Self::native`].
    pub fn from_override(case_sensitive: Option<bool>) -> Self {
        match case_sensitive {
            Some(true) => CaseSensitivity::Sensitive,
            Some(false) => CaseSensitivity::Insensitive,
            None => Self::native(),
        }
    }

    fn is_sensitive(self) -> bool {
        self == CaseSensitivity::Sensitive
    }
}

impl Default for CaseSensitivity {
    fn default() -> Self {
        Self::native()
    }
}

/// Compiles and evaluates filename patterns with a fixed case behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternMatcher {
    case: CaseSensitivity,
}

impl PatternMatcher {
    pub fn new(case: CaseSensitivity) -> Self {
        Self { case }
    }

    pub fn case(&self) -> CaseSensitivity {
        self.case
    }

    /// One-shot match of `filename` against `pattern`.
    ///
    /// Empty and uncompilable patterns match nothing.
    pub fn matches(&self, filename: &str, pattern: &str) -> bool {
        self.compile(pattern)
            .map(|compiled| compiled.matches(filename))
            .unwrap_or(false)
    }

    /// Compiles a pattern for repeated use.
    pub fn compile(&self, pattern: &str) -> Result<FilenamePattern, ConfigError> {
        let kind = if pattern.is_empty() {
            PatternKind::Empty
        } else if pattern.contains(CAPTURE_MARKER) {
            PatternKind::Capture(capture_regex(pattern, self.case)?)
        } else if self.case.is_sensitive() {
            PatternKind::Glob(literal_glob(pattern)?)
        } else {
            PatternKind::FoldedGlob(literal_glob(&pattern.to_lowercase())?)
        };

        Ok(FilenamePattern {
            source: pattern.to_string(),
            kind,
        })
    }
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Text spanned by `($)` markers, trimmed and joined with a space.
    /// `None` for plain patterns or when every capture was blank.
    pub captured: Option<String>,
}

#[derive(Debug, Clone)]
enum PatternKind {
    Empty,
    Glob(Pattern),
    /// Lowercased pattern, matched against lowercased names.
    FoldedGlob(Pattern),
    Capture(Regex),
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled filename pattern.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    source: String,
    kind: PatternKind,
}

impl FilenamePattern {
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, PatternKind::Empty)
    }

    pub fn is_capture(&self) -> bool {
        matches!(self.kind, PatternKind::Capture(_))
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.find(filename).is_some()
    }

    /// Matches `filename`, returning any captured text.
    ///
    /// Capture patterns are tried against the stem first so a trailing
    /// marker does not swallow the extension, then against the full name.
    pub fn find(&self, filename: &str) -> Option<PatternMatch> {
        match &self.kind {
            PatternKind::Empty => None,
            PatternKind::Glob(glob) => glob
                .matches_with(filename, GLOB_OPTIONS)
                .then_some(PatternMatch { captured: None }),
            PatternKind::FoldedGlob(glob) => glob
                .matches_with(&filename.to_lowercase(), GLOB_OPTIONS)
                .then_some(PatternMatch { captured: None }),
            PatternKind::Capture(regex) => {
                let stem = Path::new(filename)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();

                let from_stem = captures(regex, &stem);
                if from_stem.as_ref().is_some_and(|m| m.captured.is_some()) {
                    return from_stem;
                }
                match captures(regex, filename) {
                    Some(full) if full.captured.is_some() => Some(full),
                    full => from_stem.or(full),
                }
            }
        }
    }
}

fn captures(regex: &Regex, haystack: &str) -> Option<PatternMatch> {
    let caps = regex.captures(haystack)?;
    let parts: Vec<&str> = caps
        .iter()
        .skip(1)
        .flatten()
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();

    Some(PatternMatch {
        captured: (!parts.is_empty()).then(|| parts.join(" ")),
    })
}

/// Builds a glob where only `*` and `?` are special.
fn literal_glob(pattern: &str) -> Result<Pattern, ConfigError> {
    let mut escaped = String::with_capacity(pattern.len() + 8);
    let mut literal = String::new();
    for ch in pattern.chars() {
        if ch == '*' || ch == '?' {
            escaped.push_str(&Pattern::escape(&literal));
            literal.clear();
            escaped.push(ch);
        } else {
            literal.push(ch);
        }
    }
    escaped.push_str(&Pattern::escape(&literal));

    Pattern::new(&escaped).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn capture_regex(pattern: &str, case: CaseSensitivity) -> Result<Regex, ConfigError> {
    let mut source = String::from("^");
    let mut rest = pattern;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix(CAPTURE_MARKER) {
            source.push_str("(.*)");
            rest = after;
            continue;
        }
        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        rest = chars.as_str();
    }
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(!case.is_sensitive())
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
