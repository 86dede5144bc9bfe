//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::diagnostics::{Diagnostics, Severity};
use crate::planner::{ActionOutcome, ActionType, ApplyPlan, ExecutionResult, RefreshReport};
use crate::state::{LockInfo, ProviderState};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Run")]
    run: String,
    #[tabled(rename = "After")]
    after: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Execution result row for table display.
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Run")]
    run: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Result")]
    outcome: String,
    #[tabled(rename = "ID")]
    id: String,
}

/// Recorded run row for table display.
#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "Run")]
    run: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Playbook")]
    playbook: String,
    #[tabled(rename = "Hosts")]
    hosts: usize,
    #[tabled(rename = "Last execution")]
    last_execution: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats an apply plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &ApplyPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &ApplyPlan) -> String {
        if plan.is_empty() {
            return format!("{} No changes. Every run is up to date.\n", "✓".green());
        }

        let mut output = String::from("\nApply plan\n\n");

        let rows: Vec<PlanActionRow> = plan
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                run: a.name.clone(),
                after: a.depends_on.join(", "),
                reason: Self::truncate(&a.reason, 50),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to delete\n",
            plan.count(ActionType::Create).to_string().green(),
            plan.count(ActionType::Update).to_string().yellow(),
            plan.count(ActionType::Replace).to_string().yellow(),
            plan.count(ActionType::Delete).to_string().red()
        );

        output
    }

    /// Formats the result of executing a plan.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ExecutionJson::from(result)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_execution_text(result),
        }
    }

    fn format_execution_text(result: &ExecutionResult) -> String {
        let mut output = String::new();

        if !result.results.is_empty() {
            let rows: Vec<ResultRow> = result
                .results
                .iter()
                .map(|r| ResultRow {
                    run: r.action.name.clone(),
                    action: Self::format_action_type(r.action.action_type),
                    outcome: Self::format_outcome(r.outcome),
                    id: r.run_id.map(|id| id.to_string()).unwrap_or_default(),
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        for r in &result.results {
            if !r.diagnostics.is_empty() {
                let _ = write!(output, "\n{}:\n", r.action.name.bold());
                output.push_str(&Self::format_diagnostics_text(&r.diagnostics));
            }
        }

        let status = if result.all_successful() {
            format!("{} Apply complete", "✓".green())
        } else {
            format!("{} Apply finished with errors", "✗".red())
        };
        let _ = write!(output, "\n{status}: {result}\n");

        output
    }

    /// Formats refresh reports.
    #[must_use]
    pub fn format_refresh(&self, reports: &[RefreshReport]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json: Vec<RefreshJson<'_>> = reports.iter().map(RefreshJson::from).collect();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                if reports.is_empty() {
                    return String::from("No runs recorded.\n");
                }

                let mut output = String::new();
                for report in reports {
                    let mark = if report.success { "✓".green() } else { "✗".red() };
                    let _ = writeln!(output, "{mark} {}", report.name);
                    output.push_str(&Self::format_diagnostics_text(&report.diagnostics));
                }
                output
            }
        }
    }

    /// Formats the provider state.
    #[must_use]
    pub fn format_state(&self, state: &ProviderState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = writeln!(output, "\nState version {}", state.version);
                let _ = writeln!(output, "Last updated: {}", state.last_updated);

                if state.runs.is_empty() {
                    output.push_str("\n   No runs recorded.\n");
                } else {
                    let rows: Vec<RunRow> = state
                        .runs
                        .iter()
                        .map(|(name, record)| RunRow {
                            run: name.clone(),
                            id: record.state.id_string(),
                            playbook: Self::truncate(&record.state.attributes.playbook_file, 40),
                            hosts: record.state.attributes.hosts.len(),
                            last_execution: record.state.last_execution_rfc3339(),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\nRecent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let mark = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "  {mark} {} {} {}",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.run
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Manifest is valid", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Manifest is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(lock).unwrap_or_default(),
            OutputFormat::Text => format!(
                "State locked: {} (holder {}, expires in {}s)\n",
                lock.lock_id,
                lock.holder,
                lock.remaining_secs()
            ),
        }
    }

    /// Formats a single status line.
    #[must_use]
    pub fn message(&self, status: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => match status {
                "error" => format!("{} {message}", "✗".red()),
                "warning" => format!("{} {message}", "⚠".yellow()),
                _ => format!("{} {message}", "✓".green()),
            },
        }
    }

    /// Formats diagnostics as indented text.
    fn format_diagnostics_text(diagnostics: &Diagnostics) -> String {
        let mut output = String::new();
        for diagnostic in diagnostics {
            let severity = match diagnostic.severity {
                Severity::Error => "error".red().to_string(),
                Severity::Warning => "warning".yellow().to_string(),
            };
            let _ = write!(output, "   {severity}: {}", diagnostic.summary);
            if let Some(attribute) = &diagnostic.attribute {
                let _ = write!(output, " (attribute \"{attribute}\")");
            }
            output.push('\n');
            for line in diagnostic.detail.lines() {
                let _ = writeln!(output, "     {line}");
            }
        }
        output
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Replace => "-/+replace".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
        }
    }

    fn format_outcome(outcome: ActionOutcome) -> String {
        match outcome {
            ActionOutcome::Succeeded => "ok".green().to_string(),
            ActionOutcome::Failed => "failed".red().to_string(),
            ActionOutcome::Skipped => "skipped".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct ExecutionJson<'a> {
    successful: usize,
    failed: usize,
    skipped: usize,
    results: Vec<ResultJson<'a>>,
}

#[derive(serde::Serialize)]
struct ResultJson<'a> {
    run: &'a str,
    action: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    diagnostics: &'a Diagnostics,
}

#[derive(serde::Serialize)]
struct RefreshJson<'a> {
    run: &'a str,
    success: bool,
    diagnostics: &'a Diagnostics,
}

impl<'a> From<&'a ExecutionResult> for ExecutionJson<'a> {
    fn from(result: &'a ExecutionResult) -> Self {
        Self {
            successful: result.successful,
            failed: result.failed,
            skipped: result.skipped,
            results: result
                .results
                .iter()
                .map(|r| ResultJson {
                    run: &r.action.name,
                    action: r.action.action_type.to_string(),
                    outcome: match r.outcome {
                        ActionOutcome::Succeeded => "succeeded",
                        ActionOutcome::Failed => "failed",
                        ActionOutcome::Skipped => "skipped",
                    },
                    id: r.run_id.map(|id| id.to_string()),
                    diagnostics: &r.diagnostics,
                })
                .collect(),
        }
    }
}

impl<'a> From<&'a RefreshReport> for RefreshJson<'a> {
    fn from(report: &'a RefreshReport) -> Self {
        Self {
            run: &report.name,
            success: report.success,
            diagnostics: &report.diagnostics,
        }
    }
}
