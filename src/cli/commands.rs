//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Converge - declarative deployment reconciler.
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the deployment manifest.
    #[arg(short, long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile the declared targets against the stored ones.
    Apply {
        /// Compute actions without calling any plugin action.
        #[arg(long)]
        dry_run: bool,

        /// Exit with code 2 when changes were applied.
        #[arg(long)]
        detailed_exitcode: bool,
    },

    /// Show what `apply` would do (same as `apply --dry-run`).
    Plan {
        /// Exit with code 2 when changes are pending.
        #[arg(long)]
        detailed_exitcode: bool,
    },

    /// Validate the deployment manifest.
    Validate {
        /// Show warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Inspect or repair the target store.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show the stored targets.
    Show,

    /// Release the run lock.
    Unlock {
        /// Lock ID to release.
        #[arg(long)]
        lock_id: Option<String>,

        /// Release whatever lock is held (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_flags() {
        let cli = Cli::try_parse_from(["converge", "apply", "--dry-run", "--detailed-exitcode"])
            .expect("parse failed");
        assert!(matches!(
            cli.command,
            Commands::Apply {
                dry_run: true,
                detailed_exitcode: true
            }
        ));
        assert_eq!(cli.output, OutputFormat::Text);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "converge",
            "state",
            "unlock",
            "--force",
            "--output",
            "json",
            "--log-format",
            "json",
            "-v",
        ])
        .expect("parse failed");
        assert!(cli.verbose);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::State {
                command: StateCommands::Unlock { force: true, .. }
            }
        ));
    }
}
