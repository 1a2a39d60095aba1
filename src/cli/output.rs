//! Output formatting for CLI commands.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{DeployConfig, ValidationResult};
use crate::error::DeployError;
use crate::planner::{ActionKind, PlannedAction};
use crate::reconciler::{RunOutcome, RunReport};
use crate::state::TargetSnapshot;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Action row for table display.
#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Target")]
    identity: String,
    #[tabled(rename = "Changes")]
    changes: String,
}

/// Stored target row for table display.
#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Hook")]
    hook: String,
    #[tabled(rename = "Target")]
    target: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the report of a finished run.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &RunReport) -> String {
        if report.outcome == RunOutcome::NoAction {
            return format!(
                "{} No changes required - {} target(s) up to date.\n",
                "✓".green(),
                report.unchanged
            );
        }

        let mut output = String::new();
        let title = if report.dry_run {
            "Planned actions (dry run)"
        } else {
            "Applied actions"
        };
        let _ = write!(output, "\n{title}\n\n");

        let rows: Vec<ActionRow> = report
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| ActionRow {
                index: i + 1,
                action: Self::format_action_kind(a.kind),
                provider: a.provider.clone(),
                identity: a.identity.short().to_string(),
                changes: Self::format_changes(a),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let verb = if report.dry_run { "to" } else { "were" };
        let _ = write!(
            output,
            "\n{} {verb} spawn, {} {verb} update, {} {verb} kill, {} unchanged\n",
            report.count(ActionKind::Spawn).to_string().green(),
            report.count(ActionKind::Update).to_string().yellow(),
            report.count(ActionKind::Kill).to_string().red(),
            report.unchanged
        );

        if let Some(path) = &report.dry_run_output {
            let _ = writeln!(output, "Would-be state written to {}", path.display());
        }

        if !report.warnings.is_empty() {
            let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
            for warning in &report.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }

        output
    }

    /// Formats the stored snapshot.
    #[must_use]
    pub fn format_snapshot(&self, snapshot: &TargetSnapshot) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(snapshot).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let updated = snapshot.updated_at.map_or_else(
                    || String::from("never"),
                    |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                );
                let _ = write!(output, "\nState (version {})\n", snapshot.version);
                let _ = writeln!(output, "   Last updated: {updated}");
                let _ = writeln!(
                    output,
                    "   Targets: {} across {} provider(s)\n",
                    snapshot.target_count(),
                    snapshot.providers.len()
                );

                if snapshot.is_empty() {
                    output.push_str("   No targets stored.\n");
                    return output;
                }

                let rows: Vec<TargetRow> = snapshot
                    .providers
                    .iter()
                    .flat_map(|(name, record)| {
                        record.targets.iter().map(move |target| TargetRow {
                            provider: name.clone(),
                            hook: record.hook.to_string(),
                            target: Self::truncate(&Self::compact(target), 60),
                        })
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats the outcome of `validate`.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &DeployConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "project": config.project.name,
                    "environment": config.project.environment,
                    "providers": config.providers.len(),
                    "targets": config.targets.len(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid!\n", "✓".green());
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output.push_str("\nConfiguration summary:\n");
                let _ = writeln!(output, "   Project: {}", config.project.name);
                let _ = writeln!(output, "   Environment: {}", config.project.environment);
                let _ = writeln!(output, "   Providers: {}", config.providers.len());
                let _ = writeln!(output, "   Targets: {}", config.targets.len());
                output
            }
        }
    }

    /// Formats an error, including the rollback outcome of failed applies and
    /// a retry hint for lock contention.
    #[must_use]
    pub fn format_error(&self, error: &DeployError) -> String {
        let rollback = match error {
            DeployError::Apply { rollback, .. } => Some(rollback),
            _ => None,
        };

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": "error",
                    "message": error.to_string(),
                    "retryable": error.is_retryable(),
                    "rollback": rollback,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} {error}\n", "✗".red());
                if error.is_retryable() {
                    let _ = writeln!(
                        output,
                        "   {} retry once the other run is done, or run `converge state unlock --force` if it crashed",
                        "hint:".cyan()
                    );
                }
                let Some(rollback) = rollback else {
                    return output;
                };
                for failure in &rollback.failures {
                    let _ = writeln!(output, "   {} {failure}", "revert failed:".red());
                }
                for action in &rollback.unrecoverable {
                    let _ = writeln!(output, "   {} {action}", "not reverted:".yellow());
                }
                output
            }
        }
    }

    fn format_action_kind(kind: ActionKind) -> String {
        match kind {
            ActionKind::Spawn => "+spawn".green().to_string(),
            ActionKind::Update => "~update".yellow().to_string(),
            ActionKind::Kill => "-kill".red().to_string(),
        }
    }

    fn format_changes(action: &PlannedAction) -> String {
        if action.changes.is_empty() {
            String::from("-")
        } else {
            Self::truncate(&action.changes.join(", "), 40)
        }
    }

    fn compact(target: &Value) -> String {
        serde_json::to_string(target).unwrap_or_default()
    }

    /// Truncates a string to at most `max_len` characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::RunWarning;
    use crate::target::TargetIdentity;
    use serde_json::json;

    fn report(outcome: RunOutcome) -> RunReport {
        let identity = TargetIdentity::of(&json!({ "name": "a" }));
        RunReport {
            outcome,
            dry_run: outcome == RunOutcome::DryRun,
            actions: vec![
                PlannedAction::spawn("web", &identity, 0),
                PlannedAction::update("web", &identity, 1, vec![String::from("size")]),
            ],
            unchanged: 2,
            warnings: vec![RunWarning::DuplicateIdentity {
                provider: String::from("web"),
                identity,
                index: 1,
            }],
            snapshot: TargetSnapshot::new(),
            dry_run_output: None,
        }
    }

    #[test]
    fn test_report_text() {
        let text = OutputFormatter::new(OutputFormat::Text).format_report(&report(RunOutcome::DryRun));
        assert!(text.contains("dry run"));
        assert!(text.contains("+spawn"));
        assert!(text.contains("size"));
        assert!(text.contains("Warnings"));
    }

    #[test]
    fn test_report_json() {
        let text = OutputFormatter::new(OutputFormat::Json).format_report(&report(RunOutcome::Applied));
        let json: Value = serde_json::from_str(&text).expect("invalid json");
        assert_eq!(json["outcome"], "applied");
        assert_eq!(json["actions"][1]["kind"], "update");
        assert!(json.get("snapshot").is_none());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(OutputFormatter::truncate("héllo wörld", 8), "héllo...");
        assert_eq!(OutputFormatter::truncate("short", 8), "short");
    }

    #[test]
    fn test_lock_contention_error_hints_at_unlock() {
        let err = DeployError::from(crate::error::StateError::LockedByOther {
            holder: String::from("ci-7"),
            since: String::from("2026-01-01T00:00:00Z"),
        });

        let text = OutputFormatter::new(OutputFormat::Text).format_error(&err);
        assert!(text.contains("state unlock --force"));

        let json: Value =
            serde_json::from_str(&OutputFormatter::new(OutputFormat::Json).format_error(&err))
                .expect("invalid json");
        assert_eq!(json["retryable"], true);
    }

    #[test]
    fn test_other_errors_have_no_unlock_hint() {
        let err = DeployError::internal("boom");
        let text = OutputFormatter::new(OutputFormat::Text).format_error(&err);
        assert!(!text.contains("unlock"));
    }
}
