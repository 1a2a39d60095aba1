//! Converge CLI entrypoint.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use converge::cli::{Cli, Commands, OutputFormat, OutputFormatter, StateCommands};
use converge::config::{
    ConfigParser, ConfigValidator, DeployConfig, StateBackend, find_config_file,
};
use converge::error::{ConfigError, Result};
use converge::plugin::BuiltinLoader;
use converge::reconciler::Reconciler;
use converge::script::{DotenvSecrets, ManifestScript, SecretsLoader};
use converge::state::{LocalTargetStore, S3TargetStore, TargetStore};

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code of a successful run that changed something, with `--detailed-exitcode`.
const EXIT_CHANGES: u8 = 2;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    match runtime.block_on(run(cli, &formatter)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool, format: OutputFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli, formatter: &OutputFormatter) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Apply {
            dry_run,
            detailed_exitcode,
        } => cmd_apply(config_path, dry_run, detailed_exitcode, formatter).await,
        Commands::Plan { detailed_exitcode } => {
            cmd_apply(config_path, true, detailed_exitcode, formatter).await
        }
        Commands::Validate { warnings } => {
            cmd_validate(config_path, warnings, formatter).map(|()| ExitCode::SUCCESS)
        }
        Commands::State { command } => cmd_state(config_path, command, formatter)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}

/// Reconcile the manifest targets, or plan them with `dry_run`.
async fn cmd_apply(
    config_path: Option<&Path>,
    dry_run: bool,
    detailed_exitcode: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let project = Project::load(config_path)?;
    let store = project.open_store().await?;
    let script = ManifestScript::from_config(&project.config)?;

    info!(
        "{} {}/{}: {} target(s) declared",
        if dry_run { "Planning" } else { "Applying" },
        project.config.project.name,
        project.config.project.environment,
        script.target_count()
    );

    let mut reconciler = Reconciler::new(&store, Arc::new(BuiltinLoader::new(&project.base_dir)))
        .with_dry_run(dry_run)
        .with_secrets(project.secrets());
    if dry_run {
        reconciler = reconciler
            .with_dry_run_output(project.config.state.dry_run_path(&project.base_dir));
    }

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, rolling back");
        } else {
            std::future::pending::<()>().await;
        }
    };
    let report = reconciler.run_until(script, cancel).await?;
    println!("{}", formatter.format_report(&report));

    if detailed_exitcode && report.has_changes() {
        Ok(ExitCode::from(EXIT_CHANGES))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Validate the manifest.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let config = ConfigParser::new().load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&config)?;
    println!("{}", formatter.format_validation(&config, &result, show_warnings));
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = Project::load(config_path)?;
    let store = project.open_store().await?;

    match command {
        StateCommands::Show => {
            let snapshot = store.load().await?;
            println!("{}", formatter.format_snapshot(&snapshot));
            if let Some(lock) = store.get_lock_info().await? {
                eprintln!(
                    "Locked by {} since {} ({}s remaining)",
                    lock.holder,
                    lock.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    lock.remaining_secs()
                );
            }
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock) = store.get_lock_info().await? {
                    store.release_lock(&lock.lock_id).await?;
                    eprintln!("State forcefully unlocked (was held by {}).", lock.holder);
                } else {
                    eprintln!("State is not locked.");
                }
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("State unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// A parsed, validated manifest and the directory it lives in.
struct Project {
    config: DeployConfig,
    base_dir: PathBuf,
}

impl Project {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_file = resolve_config_path(config_path)?;
        debug!("Loading configuration from: {}", config_file.display());

        let config = ConfigParser::new().load_with_env(&config_file)?;
        let result = ConfigValidator::new().validate(&config)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        let base_dir = config_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self { config, base_dir })
    }

    /// Creates the target store selected by the manifest.
    async fn open_store(&self) -> Result<Box<dyn TargetStore>> {
        let state = &self.config.state;
        let store: Box<dyn TargetStore> = match state.backend {
            StateBackend::Local => match &state.path {
                Some(path) => Box::new(LocalTargetStore::with_state_path(self.base_dir.join(path))),
                None => Box::new(LocalTargetStore::with_base_dir(
                    state.local_dir(&self.base_dir),
                )),
            },
            StateBackend::S3 => {
                let bucket = state.bucket.as_deref().ok_or_else(|| {
                    ConfigError::validation("S3 backend requires a bucket", "state.bucket")
                })?;
                Box::new(
                    S3TargetStore::new(bucket, state.prefix.as_deref(), state.region.as_deref())
                        .await,
                )
            }
        };
        debug!("Using {} target store", store.backend_type());
        Ok(store)
    }

    /// Secrets loader for the manifest's `secrets` section.
    ///
    /// Without an explicit `env_file`, a `.env` next to the manifest is
    /// loaded if present.
    fn secrets(&self) -> Arc<dyn SecretsLoader> {
        let secrets = &self.config.secrets;
        let loader = secrets.env_file.as_ref().map_or_else(
            || DotenvSecrets::new(self.base_dir.join(".env")),
            |file| DotenvSecrets::explicit(self.base_dir.join(file)),
        );
        Arc::new(loader.with_required(secrets.required.clone()))
    }
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))
}
