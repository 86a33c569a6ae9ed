//! Intake for suggestions produced by an external classifier.
//!
//! The crate never talks to a model itself. A [`Classifier`] implementation
//! returns [`AiSuggestion`]s, which the engine turns into assignments and
//! moves exactly like rule matches. [`parse_suggestions`] accepts the loosely
//! formatted replies language models tend to produce.

use crate::error::ExternalServiceError;
use crate::rules::{Rule, file_extension};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One classifier proposal: move `file` into `folder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSuggestion {
    pub file: String,
    pub folder: String,
    #[serde(default)]
    pub reason: String,
}

impl AiSuggestion {
    /// Turns the suggestion into a persistent rule matching the file's
    /// extension. Only called when the user explicitly promotes it.
    pub fn promote(&self, name: impl Into<String>) -> Rule {
        let ext = file_extension(&self.file);
        if ext.is_empty() {
            Rule::new(name, Vec::<String>::new(), self.folder.clone()).with_pattern(self.file.clone())
        } else {
            Rule::new(name, [ext], self.folder.clone())
        }
    }
}

/// How much of each file the classifier gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiMode {
    #[default]
    NameOnly,
    Content,
}

/// Input handed to a classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiRequest {
    pub root: PathBuf,
    pub instructions: String,
    pub mode: AiMode,
    /// Eligible file names, in scan order.
    pub files: Vec<String>,
}

/// External source of folder suggestions.
pub trait Classifier {
    fn classify(&self, request: &AiRequest) -> Result<Vec<AiSuggestion>, ExternalServiceError>;
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    suggestions: Vec<AiSuggestion>,
}

/// Extracts suggestions from a raw classifier reply.
///
/// Tried in order: strict JSON (an object with a `suggestions` array, or a
/// bare array), the array truncated after its last complete object, and
/// finally field-by-field extraction.
pub fn parse_suggestions(raw: &str) -> Result<Vec<AiSuggestion>, ExternalServiceError> {
    let content = strip_fences(raw);

    let suggestions = strict(content)
        .or_else(|| repair_truncated(content))
        .or_else(|| extract_fields(content))
        .ok_or_else(|| {
            let preview: String = content.chars().take(100).collect();
            ExternalServiceError::InvalidResponse(preview)
        })?;

    if suggestions.is_empty() {
        return Err(ExternalServiceError::NoSuggestions);
    }
    Ok(suggestions)
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let body = &trimmed[start + fence.len()..];
            let body = body.find("```").map_or(body, |end| &body[..end]);
            return body.trim();
        }
    }
    trimmed
}

fn strict(content: &str) -> Option<Vec<AiSuggestion>> {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(content) {
        return Some(envelope.suggestions);
    }
    serde_json::from_str::<Vec<AiSuggestion>>(content).ok()
}

fn repair_truncated(content: &str) -> Option<Vec<AiSuggestion>> {
    let start = content.find('[')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    let repaired = format!("{}]", &content[start..=end]);
    serde_json::from_str::<Vec<AiSuggestion>>(&repaired).ok()
}

fn extract_fields(content: &str) -> Option<Vec<AiSuggestion>> {
    let re = Regex::new(
        r#""file"\s*:\s*"(.*?)",\s*"folder"\s*:\s*"(.*?)"(?:,\s*"reason"\s*:\s*"(.*?)")?"#,
    )
    .ok()?;
    let found: Vec<AiSuggestion> = re
        .captures_iter(content)
        .map(|caps| AiSuggestion {
            file: caps[1].to_string(),
            folder: caps[2].to_string(),
            reason: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect();
    (!found.is_empty()).then_some(found)
}
