//! Command-line front end.
//!
//! Parses arguments with `clap` and drives the library: scanning and
//! organizing a folder, browsing and restoring history, and editing rules,
//! profiles and filters.

use crate::ai::parse_suggestions;
use crate::engine::{CancelToken, Organizer};
use crate::error::{ConfigError, Result};
use crate::filter::FilterMode;
use crate::output::OutputFormatter;
use crate::profiles::SharedRuleSet;
use crate::rules::Rule;
use crate::workspace::{self, Workspace};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "ruletidy")]
#[command(version, about = "Rule-driven folder organizer with restorable history", long_about = None)]
pub struct Cli {
    /// Configuration directory (defaults to $RULETIDY_HOME or ~/.config/ruletidy)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Folder to operate on (defaults to the stored target, usually ~/Downloads)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Count the files that would be considered for organizing
    Scan,
    /// Classify and move files into their rule folders
    Organize {
        /// Show what would happen without moving anything
        #[arg(long)]
        dry_run: bool,
    },
    /// List recorded sessions, most recent first
    History,
    /// Move the files of a session back where they came from
    Restore { id: u64 },
    /// Manage the rules of the active profile
    Rules {
        #[command(subcommand)]
        command: RuleCommand,
    },
    /// Manage profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Manage the include/exclude filter
    Filter {
        #[command(subcommand)]
        command: FilterCommand,
    },
    /// Move files according to a classifier reply stored in a file
    Apply {
        file: PathBuf,
        /// Also save each suggestion as a rule of the active profile
        #[arg(long)]
        promote: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum RuleCommand {
    List,
    /// Add a rule, or replace the rule with the same name
    Add {
        name: String,
        /// Destination folder, absolute or relative to the organized folder
        #[arg(long)]
        folder: String,
        /// Comma separated extensions, e.g. jpg,png
        #[arg(long = "ext", value_delimiter = ',')]
        extensions: Vec<String>,
        /// Filename pattern using * and ?, with ($) capturing a subfolder
        #[arg(long)]
        pattern: Option<String>,
        /// Allow a rule that matches every file
        #[arg(long)]
        catch_all: bool,
    },
    Remove { name: String },
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    List,
    Create { name: String },
    Rename { old: String, new: String },
    Delete { name: String },
    /// Make a profile the active one
    Use { name: String },
    /// Write a profile as a shareable rule set
    Export {
        name: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Install a shared rule set as a new profile
    Install { file: PathBuf },
}

#[derive(Debug, Subcommand)]
pub enum FilterCommand {
    Show,
    /// Switch between `exclude` and `include`
    Mode { mode: FilterMode },
    Add {
        pattern: String,
        /// Edit the include list instead of the exclude list
        #[arg(long)]
        include: bool,
    },
    Remove {
        pattern: String,
        #[arg(long)]
        include: bool,
    },
}

/// Runs a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let workspace = Workspace::open(workspace::locate(cli.config_dir.as_deref()))?;
    let root = match cli.root {
        Some(root) => root,
        None => workspace.get_target_path()?,
    };
    let organizer = Organizer::new(workspace);

    match cli.command {
        Commands::Scan => scan(&organizer, &root),
        Commands::Organize { dry_run: true } => {
            let plan = organizer.plan(&root)?;
            OutputFormatter::plan(&plan);
            Ok(())
        }
        Commands::Organize { dry_run: false } => organize(&organizer, &root),
        Commands::History => {
            OutputFormatter::sessions(&organizer.workspace().get_history()?);
            Ok(())
        }
        Commands::Restore { id } => restore(&organizer, id),
        Commands::Rules { command } => rules(organizer.workspace(), command),
        Commands::Profile { command } => profile(organizer.workspace(), command),
        Commands::Filter { command } => filter(organizer.workspace(), command),
        Commands::Apply { file, promote } => apply(&organizer, &root, &file, promote),
    }
}

fn scan(organizer: &Organizer, root: &Path) -> Result<()> {
    let report = organizer.scan(root)?;
    OutputFormatter::info(&format!("Scanning: {}", report.root.display()));
    for name in &report.files {
        OutputFormatter::plain(&format!(" - {}", name));
    }
    OutputFormatter::success(&format!("{} eligible files", report.count()));
    Ok(())
}

fn organize(organizer: &Organizer, root: &Path) -> Result<()> {
    OutputFormatter::info(&format!("Organizing contents of: {}", root.display()));
    let pb = OutputFormatter::create_progress_bar(0);

    let mut run = organizer.spawn_organize(root);
    for event in run.by_ref() {
        OutputFormatter::show_event(&pb, &event);
    }
    pb.finish_and_clear();

    let summary = run.finish()?;
    OutputFormatter::organize_summary(&summary);
    if summary.errors > 0 {
        OutputFormatter::warning("Some files could not be organized. Please review errors above.");
    }
    Ok(())
}

fn restore(organizer: &Organizer, id: u64) -> Result<()> {
    let pb = OutputFormatter::create_progress_bar(0);
    let result = organizer.restore_session(id, |event| OutputFormatter::show_event(&pb, &event))?;
    pb.finish_and_clear();
    OutputFormatter::restore_summary(&result);
    Ok(())
}

fn apply(organizer: &Organizer, root: &Path, file: &Path, promote: bool) -> Result<()> {
    let raw = fs::read_to_string(file).map_err(|e| ConfigError::Io {
        path: file.to_path_buf(),
        source: e,
    })?;
    let suggestions = parse_suggestions(&raw)?;

    let pb = OutputFormatter::create_progress_bar(suggestions.len() as u64);
    let summary = organizer.apply_suggestions(root, &suggestions, &CancelToken::new(), |event| {
        OutputFormatter::show_event(&pb, &event)
    })?;
    pb.finish_and_clear();
    OutputFormatter::organize_summary(&summary);

    if promote {
        let workspace = organizer.workspace();
        let mut rules = workspace.get_rules()?;
        for suggestion in &suggestions {
            let rule = suggestion.promote(suggestion.folder.clone());
            if rules.get(&rule.name).is_none() {
                rules.add(rule)?;
            }
        }
        workspace.save_rules(rules.into_rules())?;
        OutputFormatter::success("Suggestions saved as rules");
    }
    Ok(())
}

fn rules(workspace: &Workspace, command: RuleCommand) -> Result<()> {
    match command {
        RuleCommand::List => {
            let profile = workspace.profiles().active()?;
            OutputFormatter::rules(&profile, workspace.get_rules()?.rules());
        }
        RuleCommand::Add {
            name,
            folder,
            extensions,
            pattern,
            catch_all,
        } => {
            let mut rule = Rule::new(name.clone(), extensions, folder);
            if let Some(pattern) = pattern {
                rule = rule.with_pattern(pattern);
            }
            if catch_all {
                rule = rule.as_catch_all();
            }

            let mut rules = workspace.get_rules()?;
            if rules.get(&name).is_some() {
                rules.update(&name, rule)?;
            } else {
                rules.add(rule)?;
            }
            workspace.save_rules(rules.into_rules())?;
            OutputFormatter::success(&format!("Rule '{}' saved", name));
        }
        RuleCommand::Remove { name } => {
            let mut rules = workspace.get_rules()?;
            if rules.remove(&name).is_none() {
                return Err(ConfigError::RuleNotFound(name).into());
            }
            workspace.save_rules(rules.into_rules())?;
            OutputFormatter::success(&format!("Rule '{}' removed", name));
        }
    }
    Ok(())
}

fn profile(workspace: &Workspace, command: ProfileCommand) -> Result<()> {
    let store = workspace.profiles();
    match command {
        ProfileCommand::List => {
            let active = store.active()?;
            for name in store.list()? {
                if name == active {
                    OutputFormatter::success(&format!("{} (active)", name));
                } else {
                    OutputFormatter::plain(&format!("  {}", name));
                }
            }
        }
        ProfileCommand::Create { name } => {
            let name = store.create(&name)?;
            OutputFormatter::success(&format!("Profile '{}' created", name));
        }
        ProfileCommand::Rename { old, new } => {
            let new = store.rename(&old, &new)?;
            OutputFormatter::success(&format!("Profile '{}' renamed to '{}'", old, new));
        }
        ProfileCommand::Delete { name } => {
            store.delete(&name)?;
            OutputFormatter::success(&format!("Profile '{}' deleted", name));
        }
        ProfileCommand::Use { name } => {
            store.set_active(&name)?;
            OutputFormatter::success(&format!("Now using profile '{}'", name));
        }
        ProfileCommand::Export { name, output } => {
            let shared = store.export(&name)?;
            let json = serde_json::to_string_pretty(&shared).map_err(|e| ConfigError::Invalid {
                path: PathBuf::from(&name),
                reason: e.to_string(),
            })?;
            match output {
                Some(path) => {
                    fs::write(&path, json).map_err(|e| ConfigError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    OutputFormatter::success(&format!("Exported to {}", path.display()));
                }
                None => OutputFormatter::plain(&json),
            }
        }
        ProfileCommand::Install { file } => {
            let json = fs::read_to_string(&file).map_err(|e| ConfigError::Io {
                path: file.clone(),
                source: e,
            })?;
            let shared: SharedRuleSet =
                serde_json::from_str(&json).map_err(|e| ConfigError::Invalid {
                    path: file.clone(),
                    reason: e.to_string(),
                })?;
            let name = store.install(&shared)?;
            OutputFormatter::success(&format!("Installed as profile '{}'", name));
        }
    }
    Ok(())
}

fn filter(workspace: &Workspace, command: FilterCommand) -> Result<()> {
    match command {
        FilterCommand::Show => {
            let filters = workspace.get_filters()?;
            OutputFormatter::header(&format!("Filter mode: {}", filters.mode));
            OutputFormatter::plain(&format!("  exclude: {}", filters.exclude.join(", ")));
            OutputFormatter::plain(&format!("  include: {}", filters.include.join(", ")));
            if filters.mode == FilterMode::Include && filters.include.is_empty() {
                OutputFormatter::warning("Include list is empty: no file is eligible.");
            }
        }
        FilterCommand::Mode { mode } => {
            workspace.set_filter_mode(mode)?;
            OutputFormatter::success(&format!("Filter mode set to {}", mode));
        }
        FilterCommand::Add { pattern, include } => {
            let mut list = current_list(workspace, include)?;
            if !list.contains(&pattern) {
                list.push(pattern.clone());
            }
            store_list(workspace, include, list)?;
            OutputFormatter::success(&format!("Added '{}'", pattern));
        }
        FilterCommand::Remove { pattern, include } => {
            let mut list = current_list(workspace, include)?;
            list.retain(|p| p != &pattern);
            store_list(workspace, include, list)?;
            OutputFormatter::success(&format!("Removed '{}'", pattern));
        }
    }
    Ok(())
}

fn current_list(workspace: &Workspace, include: bool) -> Result<Vec<String>, ConfigError> {
    if include {
        workspace.get_include_list()
    } else {
        workspace.get_ignore_list()
    }
}

fn store_list(workspace: &Workspace, include: bool, list: Vec<String>) -> Result<(), ConfigError> {
    if include {
        workspace.save_include_list(list)
    } else {
        workspace.save_ignore_list(list)
    }
}
