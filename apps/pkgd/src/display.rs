//! Output rendering and formatting

use crate::cli::ColorChoice;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use pkgd_config::RepositoryConfig;
use pkgd_repository::InstalledPackage;
use pkgd_types::{PackageInfo, TaskOutcome, TaskOutput, TaskState, TaskStatus};
use serde::Serialize;
use std::io;

/// What a command produced
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OperationResult {
    /// Tasks touched by the command, dependencies included
    Tasks(Vec<TaskState>),
    Installed(Vec<InstalledPackage>),
    SearchResults(Vec<PackageInfo>),
    Pruned(Vec<PackageInfo>),
    Configuration(RepositoryConfig),
    Success(String),
}

impl OperationResult {
    /// Top-level tasks that did not succeed
    pub fn failed_tasks(&self) -> usize {
        match self {
            Self::Tasks(tasks) => tasks
                .iter()
                .filter(|t| t.parent.is_none() && t.status != TaskStatus::Succeeded)
                .count(),
            _ => 0,
        }
    }
}

/// Output renderer for CLI results
#[derive(Clone)]
pub struct OutputRenderer {
    json_output: bool,
    color_choice: ColorChoice,
    term: Term,
}

impl OutputRenderer {
    pub fn new(json_output: bool, color_choice: ColorChoice) -> Self {
        Self {
            json_output,
            color_choice,
            term: Term::stdout(),
        }
    }

    pub fn colors_enabled(&self) -> bool {
        match self.color_choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => self.term.features().colors_supported(),
        }
    }

    /// Render operation result
    pub fn render_result(&self, result: &OperationResult) -> io::Result<()> {
        if self.json_output {
            let json = serde_json::to_string_pretty(result).map_err(io::Error::other)?;
            println!("{json}");
            return Ok(());
        }

        match result {
            OperationResult::Tasks(tasks) => self.render_tasks(tasks),
            OperationResult::Installed(installed) => self.render_installed(installed),
            OperationResult::SearchResults(results) => self.render_packages(results, "No matches."),
            OperationResult::Pruned(removed) => {
                self.render_packages(removed, "Nothing to prune.")
            }
            OperationResult::Configuration(config) => self.render_configuration(config),
            OperationResult::Success(message) => {
                println!("{}", self.style_success(message));
                Ok(())
            }
        }
    }

    fn render_tasks(&self, tasks: &[TaskState]) -> io::Result<()> {
        if tasks.is_empty() {
            println!("No tasks.");
            return Ok(());
        }

        let mut table = self.table(&["Task", "Kind", "Target", "Status", "Result"]);
        for task in tasks {
            let id = task.id.to_string();
            let id = match task.parent {
                // Indent dependency tasks under their parent
                Some(_) => format!("  {}", &id[..8]),
                None => id[..8].to_string(),
            };
            table.add_row(vec![
                Cell::new(id),
                Cell::new(task.kind),
                Cell::new(&task.target),
                self.status_cell(task.status),
                Cell::new(outcome_summary(task)),
            ]);
        }

        println!("{table}");
        Ok(())
    }

    fn render_installed(&self, installed: &[InstalledPackage]) -> io::Result<()> {
        if installed.is_empty() {
            println!("No packages installed.");
            return Ok(());
        }

        let mut table = self.table(&["Package", "Module", "Kind", "Content"]);
        for entry in installed {
            let content = entry.content_id.to_string();
            table.add_row(vec![
                Cell::new(&entry.info.reference),
                Cell::new(&entry.module),
                Cell::new(entry.info.kind),
                Cell::new(content.get(..16).unwrap_or(&content)),
            ]);
        }

        println!("{table}");
        Ok(())
    }

    fn render_packages(&self, packages: &[PackageInfo], empty: &str) -> io::Result<()> {
        if packages.is_empty() {
            println!("{empty}");
            return Ok(());
        }

        let mut table = self.table(&["Package", "Kind", "Description"]);
        for package in packages {
            table.add_row(vec![
                Cell::new(&package.reference),
                Cell::new(package.kind),
                Cell::new(package.description.as_deref().unwrap_or("-")),
            ]);
        }

        println!("{table}");
        Ok(())
    }

    fn render_configuration(&self, config: &RepositoryConfig) -> io::Result<()> {
        println!("Default repository: {}", self.style_bold(&config.default_repo));
        println!("Default channel:    {}", config.default_channel);
        println!("Architecture:       {}", config.arch());

        if config.repos.is_empty() {
            return Ok(());
        }
        let mut table = self.table(&["Name", "URL", "Priority"]);
        for (name, repo) in &config.repos {
            table.add_row(vec![
                Cell::new(name),
                Cell::new(&repo.url),
                Cell::new(repo.priority),
            ]);
        }
        println!("{table}");
        Ok(())
    }

    fn table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !self.colors_enabled() {
            table.force_no_tty();
        }
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
        table
    }

    fn status_cell(&self, status: TaskStatus) -> Cell {
        let cell = Cell::new(status);
        if !self.colors_enabled() {
            return cell;
        }
        match status {
            TaskStatus::Succeeded => cell.fg(Color::Green),
            TaskStatus::Failed => cell.fg(Color::Red),
            TaskStatus::Canceled | TaskStatus::AwaitingInteraction => cell.fg(Color::Yellow),
            TaskStatus::Queued | TaskStatus::Running => cell,
        }
    }

    fn style_success(&self, text: &str) -> String {
        if self.colors_enabled() {
            Style::new().green().apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn style_bold(&self, text: &str) -> String {
        if self.colors_enabled() {
            Style::new().bold().apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}

fn outcome_summary(task: &TaskState) -> String {
    match &task.outcome {
        Some(TaskOutcome::Succeeded(output)) => match output {
            TaskOutput::Installed { .. } => "installed".to_string(),
            TaskOutput::Skipped { .. } => "kept existing".to_string(),
            TaskOutput::Updated { from, to, .. } => {
                format!("{} -> {}", from.version, to.version)
            }
            TaskOutput::Uninstalled {
                already_removed: true,
                ..
            } => "already removed".to_string(),
            TaskOutput::Uninstalled { .. } => "removed".to_string(),
            TaskOutput::Pruned { removed } => format!("{} removed", removed.len()),
            TaskOutput::Migrated {
                from_format,
                to_format,
            } => format!("format {from_format} -> {to_format}"),
        },
        Some(TaskOutcome::Failed(failure)) => failure.to_string(),
        Some(TaskOutcome::Canceled) => "canceled".to_string(),
        None => task.last_message().unwrap_or("-").to_string(),
    }
}
