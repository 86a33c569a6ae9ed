//! Classification rules and first-match resolution.
//!
//! A [`Rule`] maps a set of extensions and an optional filename pattern to a
//! destination folder. Rules live in an ordered [`RuleSet`]; the first rule
//! that matches a file decides its destination.
//!
//! ```
//! use ruletidy::pattern::PatternMatcher;
//! use ruletidy::rules::{Rule, RuleSet};
//!
//! let rules = RuleSet::new(vec![
//!     Rule::new("Images", ["jpg", "png"], "/dest/Images"),
//!     Rule::new("Docs", ["pdf"], "/dest/Docs"),
//! ])
//! .unwrap();
//! let compiled = rules.compile(&PatternMatcher::default()).unwrap();
//!
//! assert_eq!(compiled.resolve("a.jpg").unwrap().folder.to_str(), Some("/dest/Images"));
//! assert!(compiled.resolve("c.txt").is_none());
//! ```

use crate::error::ConfigError;
use crate::pattern::{FilenamePattern, PatternMatcher};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// A user-defined classification rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,

    /// Lowercased extensions without a leading dot. Empty means any extension.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Destination folder, absolute or relative to the organized root.
    pub folder: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_pattern: Option<String>,

    /// Explicit opt-in for rules that match every file.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub catch_all: bool,
}

impl Rule {
    pub fn new<I, S>(name: impl Into<String>, extensions: I, folder: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rule = Self {
            name: name.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_string())
                .collect(),
            folder: folder.into(),
            filename_pattern: None,
            catch_all: false,
        };
        rule.normalize();
        rule
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.filename_pattern = (!pattern.is_empty()).then_some(pattern);
        self
    }

    pub fn as_catch_all(mut self) -> Self {
        self.catch_all = true;
        self
    }

    /// Lowercases extensions, strips leading dots and drops duplicates and
    /// blanks while keeping their first-seen order.
    pub fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.extensions.len());
        for ext in self.extensions.drain(..) {
            let ext = normalize_extension(&ext);
            if !ext.is_empty() && !seen.contains(&ext) {
                seen.push(ext);
            }
        }
        self.extensions = seen;
        if self
            .filename_pattern
            .as_ref()
            .is_some_and(|p| p.trim().is_empty())
        {
            self.filename_pattern = None;
        }
    }

    /// True when the rule has nothing to discriminate on.
    pub fn is_unconstrained(&self) -> bool {
        self.extensions.is_empty() && self.pattern().is_none()
    }

    fn pattern(&self) -> Option<&str> {
        self.filename_pattern.as_deref().filter(|p| !p.is_empty())
    }

    /// Checks the rule without persisting anything.
    ///
    /// # Errors
    ///
    /// - `MissingRuleName` / `MissingFolder` for blank fields
    /// - `CatchAllRule` for an unconstrained rule lacking the catch-all marker
    /// - `ProtectedDestination` for system folders
    /// - `EscapingFolder` for relative folders that climb above the root
    /// - `InvalidPattern` if the filename pattern does not compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingRuleName);
        }
        if self.folder.trim().is_empty() {
            return Err(ConfigError::MissingFolder {
                rule: self.name.clone(),
            });
        }
        if self.is_unconstrained() && !self.catch_all {
            return Err(ConfigError::CatchAllRule {
                rule: self.name.clone(),
            });
        }
        let folder = normalize_lexically(Path::new(&self.folder));
        if folder.is_absolute() {
            if is_system_folder(&folder) {
                return Err(ConfigError::ProtectedDestination {
                    rule: self.name.clone(),
                    folder,
                });
            }
        } else if matches!(folder.components().next(), Some(Component::ParentDir)) {
            return Err(ConfigError::EscapingFolder {
                rule: self.name.clone(),
                folder: PathBuf::from(&self.folder),
            });
        }
        if let Some(pattern) = self.pattern() {
            PatternMatcher::default().compile(pattern)?;
        }
        Ok(())
    }
}

/// Lowercases an extension and strips any leading dots.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Lowercased extension of a filename, or an empty string.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Folds `.` and `..` components without touching the filesystem.
///
/// `..` at the filesystem root stays at the root; leading `..` of a
/// relative path are kept.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether `path` is an operating-system location rules must never target.
///
/// The per-user temporary directory is never protected, even where it
/// lives under a protected tree such as `/var/folders` on macOS.
pub fn is_system_folder(path: &Path) -> bool {
    let path = normalize_lexically(path);
    if is_temp_folder(&path) {
        return false;
    }
    let lowered = PathBuf::from(path.to_string_lossy().to_lowercase());

    #[cfg(windows)]
    {
        let trimmed = lowered.to_string_lossy().trim_end_matches('\\').to_string();
        if trimmed.len() <= 2 && trimmed.ends_with(':') {
            return true;
        }
        let system_dirs = [
            std::env::var("SystemRoot").unwrap_or_else(|_| "C:\\Windows".to_string()),
            std::env::var("ProgramFiles").unwrap_or_else(|_| "C:\\Program Files".to_string()),
            std::env::var("ProgramFiles(x86)")
                .unwrap_or_else(|_| "C:\\Program Files (x86)".to_string()),
        ];
        system_dirs
            .iter()
            .any(|dir| lowered.starts_with(dir.to_lowercase()))
    }

    #[cfg(not(windows))]
    {
        if lowered.as_path() == Path::new("/") {
            return true;
        }
        ["/system", "/bin", "/sbin", "/usr", "/var", "/etc"]
            .iter()
            .any(|dir| lowered.starts_with(dir))
    }
}

fn is_temp_folder(path: &Path) -> bool {
    let temp = std::env::temp_dir();
    let canonical = temp.canonicalize().ok();
    [Some(normalize_lexically(&temp)), canonical]
        .into_iter()
        .flatten()
        .filter(|dir| dir.parent().is_some())
        .any(|dir| path.starts_with(dir))
}

/// The rule list a fresh `Default` profile starts with.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new("Images", ["jpg", "jpeg", "png", "gif", "webp"], "Images"),
        Rule::new("Documents", ["pdf", "doc", "docx", "txt"], "Documents"),
        Rule::new("Archives", ["zip", "rar", "7z", "tar", "gz"], "Archives"),
        Rule::new("Video", ["mp4", "mov", "mkv", "webm"], "Video"),
        Rule::new("Audio", ["mp3", "wav", "flac"], "Audio"),
    ]
}

/// Ordered rule collection; order decides precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Builds a validated rule set.
    ///
    /// # Errors
    ///
    /// Returns the first validation error; no partial set is produced.
    pub fn new(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        let mut rules = rules;
        for rule in &mut rules {
            rule.normalize();
            rule.validate()?;
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Appends a rule at the lowest precedence.
    pub fn add(&mut self, mut rule: Rule) -> Result<(), ConfigError> {
        rule.normalize();
        rule.validate()?;
        self.rules.push(rule);
        Ok(())
    }

    /// Replaces the rule named `name` in place, keeping its position.
    pub fn update(&mut self, name: &str, mut rule: Rule) -> Result<(), ConfigError> {
        rule.normalize();
        rule.validate()?;
        let slot = self
            .rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| ConfigError::RuleNotFound(name.to_string()))?;
        *slot = rule;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Rule> {
        let index = self.rules.iter().position(|r| r.name == name)?;
        Some(self.rules.remove(index))
    }

    /// Names of rules that would match every file.
    pub fn catch_all_rules(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.is_unconstrained())
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Compiles the set for resolution.
    ///
    /// Unconstrained rules without the catch-all marker (possible only in
    /// hand-edited files) are left out with a warning.
    pub fn compile(&self, matcher: &PatternMatcher) -> Result<CompiledRules, ConfigError> {
        let mut compiled = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            if rule.is_unconstrained() && !rule.catch_all {
                warn!(rule = %rule.name, "skipping rule without extensions or pattern");
                continue;
            }
            let pattern = match rule.pattern() {
                Some(p) => Some(matcher.compile(p)?),
                None => None,
            };
            let mut normalized = rule.clone();
            normalized.normalize();
            compiled.push(CompiledRule {
                rule: normalized,
                pattern,
            });
        }
        Ok(CompiledRules { rules: compiled })
    }
}

/// A captured value usable as a single subfolder name.
fn is_plain_folder_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// Where a file should go and which rule sent it there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub rule: String,
    /// Rule folder, extended by any captured subfolder.
    pub folder: PathBuf,
    pub catch_all: bool,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: Rule,
    pattern: Option<FilenamePattern>,
}

/// A rule set ready for repeated resolution.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
}

impl CompiledRules {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the destination of the first matching rule, if any.
    pub fn resolve(&self, filename: &str) -> Option<Resolution> {
        let ext = file_extension(filename);
        for CompiledRule { rule, pattern } in &self.rules {
            if !rule.extensions.is_empty() && !rule.extensions.contains(&ext) {
                continue;
            }
            let captured = match pattern {
                Some(pattern) => match pattern.find(filename) {
                    Some(hit) => hit.captured,
                    None => continue,
                },
                None => None,
            };

            let mut folder = PathBuf::from(&rule.folder);
            if let Some(sub) = captured {
                if !is_plain_folder_name(&sub) {
                    debug!(
                        file = %filename,
                        rule = %rule.name,
                        captured = %sub,
                        "capture is not a folder name"
                    );
                    continue;
                }
                folder.push(sub);
            }
            return Some(Resolution {
                rule: rule.name.clone(),
                folder,
                catch_all: rule.is_unconstrained(),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::CaseSensitivity;

    fn compile(rules: Vec<Rule>) -> CompiledRules {
        RuleSet::new(rules)
            .unwrap()
            .compile(&PatternMatcher::new(CaseSensitivity::Insensitive))
            .unwrap()
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let compiled = compile(vec![
            Rule::new("Images", ["jpg", "png"], "/dest/Images"),
            Rule::new("Docs", ["pdf"], "/dest/Docs"),
        ]);

        assert_eq!(
            compiled.resolve("a.jpg").map(|r| r.folder),
            Some(PathBuf::from("/dest/Images"))
        );
        assert_eq!(
            compiled.resolve("b.pdf").map(|r| r.folder),
            Some(PathBuf::from("/dest/Docs"))
        );
        assert!(compiled.resolve("c.txt").is_none());
    }

    #[test]
    fn test_order_decides_overlap() {
        let compiled = compile(vec![
            Rule::new("Invoices", ["pdf"], "Invoices").with_pattern("invoice*"),
            Rule::new("Docs", ["pdf"], "Docs"),
        ]);

        assert_eq!(compiled.resolve("invoice_01.pdf").unwrap().rule, "Invoices");
        assert_eq!(compiled.resolve("notes.pdf").unwrap().rule, "Docs");
    }

    #[test]
    fn test_extensions_normalized() {
        let rule = Rule::new("Images", [".JPG", "png", " .Png ", ""], "Images");
        assert_eq!(rule.extensions, vec!["jpg".to_string(), "png".to_string()]);

        let compiled = compile(vec![rule]);
        assert!(compiled.resolve("HOLIDAY.JPG").is_some());
        assert!(compiled.resolve("scan.png").is_some());
    }

    #[test]
    fn test_empty_extensions_rely_on_pattern() {
        let compiled = compile(vec![Rule::new("Screens", Vec::<String>::new(), "Screens")
            .with_pattern("Screenshot*")]);

        assert!(compiled.resolve("Screenshot 2024.png").is_some());
        assert!(compiled.resolve("Screenshot").is_some());
        assert!(compiled.resolve("photo.png").is_none());
    }

    #[test]
    fn test_unmarked_catch_all_rejected() {
        let err = RuleSet::new(vec![Rule::new("All", Vec::<String>::new(), "Everything")]);
        assert!(matches!(err, Err(ConfigError::CatchAllRule { .. })));
    }

    #[test]
    fn test_marked_catch_all_matches_everything() {
        let compiled = compile(vec![
            Rule::new("Docs", ["pdf"], "Docs"),
            Rule::new("Rest", Vec::<String>::new(), "Rest").as_catch_all(),
        ]);

        let hit = compiled.resolve("weird.xyz").unwrap();
        assert_eq!(hit.rule, "Rest");
        assert!(hit.catch_all);
        assert_eq!(compiled.resolve("a.pdf").unwrap().rule, "Docs");
    }

    #[test]
    fn test_hand_edited_catch_all_is_skipped() {
        let set: RuleSet =
            serde_json::from_str(r#"[{"name":"All","extensions":[],"folder":"All"}]"#).unwrap();
        assert_eq!(set.catch_all_rules(), vec!["All"]);

        let compiled = set.compile(&PatternMatcher::default()).unwrap();
        assert!(compiled.is_empty());
        assert!(compiled.resolve("a.pdf").is_none());
    }

    #[test]
    fn test_capture_pattern_appends_subfolder() {
        let compiled = compile(vec![
            Rule::new("Invoices", ["pdf"], "Invoices").with_pattern("Invoice_($)"),
        ]);

        let hit = compiled.resolve("Invoice_ACME.pdf").unwrap();
        assert_eq!(hit.folder, PathBuf::from("Invoices").join("ACME"));
        assert!(compiled.resolve("receipt.pdf").is_none());
    }

    #[test]
    fn test_dot_captures_do_not_climb() {
        let compiled = compile(vec![
            Rule::new("Invoices", ["pdf"], "Invoices").with_pattern("Invoice_($)"),
            Rule::new("Docs", ["pdf"], "Docs"),
        ]);

        assert_eq!(compiled.resolve("Invoice_...pdf").unwrap().rule, "Docs");
        assert_eq!(compiled.resolve("Invoice_..pdf").unwrap().rule, "Docs");
        let hit = compiled.resolve("Invoice_..ACME.pdf").unwrap();
        assert_eq!(hit.folder, PathBuf::from("Invoices").join("..ACME"));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            Rule::new("", ["pdf"], "Docs").validate(),
            Err(ConfigError::MissingRuleName)
        ));
        assert!(matches!(
            Rule::new("Docs", ["pdf"], "  ").validate(),
            Err(ConfigError::MissingFolder { .. })
        ));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_protected_destination_rejected() {
        assert!(matches!(
            Rule::new("Bad", ["sh"], "/usr/local/bin").validate(),
            Err(ConfigError::ProtectedDestination { .. })
        ));
        assert!(Rule::new("Ok", ["sh"], "/home/user/scripts").validate().is_ok());
        assert!(is_system_folder(Path::new("/")));
        assert!(!is_system_folder(Path::new("/usrdata")));
        assert!(is_system_folder(Path::new("/home/user/../../etc/cron.d")));
        assert!(matches!(
            Rule::new("Bad", ["sh"], "/home/user/../../usr/bin").validate(),
            Err(ConfigError::ProtectedDestination { .. })
        ));
    }

    #[test]
    fn test_parent_dir_folders_rejected() {
        assert!(matches!(
            Rule::new("Bad", ["sh"], "../../../../etc/cron.d").validate(),
            Err(ConfigError::EscapingFolder { .. })
        ));
        assert!(matches!(
            Rule::new("Bad", ["sh"], "Scripts/../../elsewhere").validate(),
            Err(ConfigError::EscapingFolder { .. })
        ));
        assert!(Rule::new("Ok", ["sh"], "Sorted/../Scripts").validate().is_ok());
        assert!(Rule::new("Ok", ["sh"], "./Scripts").validate().is_ok());
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../../../../etc/x")),
            PathBuf::from("/etc/x")
        );
        assert_eq!(normalize_lexically(Path::new("a/./b/..")), PathBuf::from("a"));
        assert_eq!(
            normalize_lexically(Path::new("a/../../b")),
            PathBuf::from("../b")
        );
        assert_eq!(normalize_lexically(Path::new("a/..")), PathBuf::new());
    }

    #[test]
    fn test_temp_dir_is_not_protected() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(!is_system_folder(&temp.path().join("dest")));
        assert!(!is_system_folder(&std::env::temp_dir().join("dest")));
        let canonical = temp.path().canonicalize().unwrap();
        assert!(
            Rule::new("Tmp", ["txt"], canonical.join("dest").to_string_lossy())
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_update_keeps_position() {
        let mut set = RuleSet::new(vec![
            Rule::new("A", ["a"], "A"),
            Rule::new("B", ["b"], "B"),
        ])
        .unwrap();

        set.update("A", Rule::new("A2", ["aa"], "A2")).unwrap();
        assert_eq!(set.rules()[0].name, "A2");

        assert!(matches!(
            set.update("missing", Rule::new("X", ["x"], "X")),
            Err(ConfigError::RuleNotFound(name)) if name == "missing"
        ));
        assert!(set.remove("B").is_some());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rule_serialization_omits_defaults() {
        let json = serde_json::to_string(&Rule::new("Docs", ["pdf"], "Docs")).unwrap();
        assert_eq!(json, r#"{"name":"Docs","extensions":["pdf"],"folder":"Docs"}"#);
    }
}
