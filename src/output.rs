//! Terminal output for the command-line front end.
//!
//! Everything the user reads goes through [`OutputFormatter`]; diagnostics go
//! through `tracing` instead.

use crate::engine::{OrganizeSummary, Plan};
use crate::events::RunEvent;
use crate::history::{RestoreResult, SessionKind, SessionSummary};
use crate::mover::MoveStatus;
use crate::rules::Rule;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Styled printing helpers.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use ruletidy::output::OutputFormatter;
    /// OutputFormatter::success("Rule saved");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Progress bar sized for `total` files.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Renders one batch event onto a progress bar.
    pub fn show_event(pb: &ProgressBar, event: &RunEvent) {
        match event {
            RunEvent::Progress { index, total, .. } => {
                pb.set_length(*total as u64);
                pb.set_position(*index as u64);
            }
            RunEvent::Log(entry) => {
                let line = match entry.status {
                    MoveStatus::Success => {
                        format!("{} {} → {}", "✓".green(), entry.file, entry.category)
                    }
                    MoveStatus::Undo => format!("{} {} restored", "↺".cyan(), entry.file),
                    MoveStatus::Error => format!(
                        "{} {}: {}",
                        "✗".red(),
                        entry.file,
                        entry.details.as_deref().unwrap_or("failed")
                    ),
                };
                pb.println(line);
            }
        }
    }

    /// Prints the assignments of a dry run grouped by category.
    pub fn plan(plan: &Plan) {
        if plan.assignments.is_empty() && plan.unclassified.is_empty() {
            Self::plain("No files found to organize.");
            return;
        }

        Self::dry_run_notice("Files would be organized as follows:");
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for assignment in &plan.assignments {
            println!(
                " - {} → {} {}",
                assignment.file_name(),
                assignment.folder.display(),
                format!("({})", assignment.source).dimmed()
            );
            *counts.entry(assignment.category.as_str()).or_insert(0) += 1;
        }
        for name in &plan.unclassified {
            println!(" - {} {}", name, "(no matching rule, left in place)".dimmed());
        }

        Self::category_table(&counts, plan.assignments.len());
    }

    /// Table of file counts per category with a total row.
    pub fn category_table(category_counts: &BTreeMap<&str, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let width = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));
        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            plural(total_files),
            width = width
        );
    }

    pub fn organize_summary(summary: &OrganizeSummary) {
        Self::header("SUMMARY");
        println!("  Moved:        {}", summary.moved.to_string().green());
        println!("  Errors:       {}", colour_errors(summary.errors));
        println!("  Unclassified: {}", summary.unclassified);
        if summary.unchanged > 0 {
            println!("  Unchanged:    {}", summary.unchanged);
        }
        if summary.unrecorded > 0 {
            Self::warning(&format!(
                "{} {} could not be recorded in history and cannot be restored automatically.",
                summary.unrecorded,
                plural(summary.unrecorded)
            ));
        }
        if summary.cancelled {
            Self::warning("Run cancelled before all files were processed.");
        }
        match summary.session_id {
            Some(id) => Self::info(&format!(
                "Recorded as session {}. Use 'ruletidy restore {}' to revert.",
                id, id
            )),
            None => Self::plain("Nothing was moved."),
        }
    }

    pub fn restore_summary(result: &RestoreResult) {
        Self::header(&format!("RESTORE OF SESSION {}", result.session_id));
        println!("  Restored: {}", result.restored.to_string().green());
        println!("  Errors:   {}", colour_errors(result.errors));
        if result.already_restored > 0 {
            println!("  Already restored: {}", result.already_restored);
        }
        if result.unrecorded > 0 {
            Self::warning(&format!(
                "{} restored {} still listed as moved in history.",
                result.unrecorded,
                plural(result.unrecorded)
            ));
        }
        for (path, reason) in &result.failures {
            eprintln!("    - {}: {}", path.display(), reason);
        }
    }

    pub fn sessions(sessions: &[SessionSummary]) {
        if sessions.is_empty() {
            Self::plain("No sessions recorded yet.");
            return;
        }
        println!(
            "{:>4}  {:<19}  {:<5}  {:>5}  {}",
            "ID".bold(),
            "Date".bold(),
            "Kind".bold(),
            "Files".bold(),
            "Folder".bold()
        );
        for session in sessions {
            let kind = match session.kind {
                SessionKind::Rules => "rules",
                SessionKind::Ai => "ai",
            };
            let state = if session.fully_restored {
                " (restored)".dimmed().to_string()
            } else if !session.closed {
                " (interrupted)".yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "{:>4}  {:<19}  {:<5}  {:>5}  {}{}",
                session.id,
                session.date,
                kind,
                session.count,
                session.root_path.display(),
                state
            );
        }
    }

    pub fn rules(profile: &str, rules: &[Rule]) {
        Self::header(&format!("Rules of profile '{}'", profile));
        if rules.is_empty() {
            Self::plain("  (no rules)");
            return;
        }
        for (index, rule) in rules.iter().enumerate() {
            let extensions = if rule.extensions.is_empty() {
                "any".to_string()
            } else {
                rule.extensions.join(", ")
            };
            let pattern = rule
                .filename_pattern
                .as_deref()
                .map(|p| format!(" pattern '{}'", p))
                .unwrap_or_default();
            let marker = if rule.catch_all {
                " [catch-all]".yellow().to_string()
            } else {
                String::new()
            };
            println!(
                "{:>3}. {} [{}]{} → {}{}",
                index + 1,
                rule.name.bold(),
                extensions,
                pattern,
                rule.folder,
                marker
            );
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

fn colour_errors(errors: usize) -> ColoredString {
    if errors == 0 {
        errors.to_string().normal()
    } else {
        errors.to_string().red()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(0), "files");
        assert_eq!(plural(1), "file");
        assert_eq!(plural(2), "files");
    }

    #[test]
    fn test_progress_bar_follows_events() {
        let pb = ProgressBar::hidden();
        OutputFormatter::show_event(&pb, &RunEvent::progress(2, 5));
        assert_eq!(pb.position(), 2);
        assert_eq!(pb.length(), Some(5));
    }
}
