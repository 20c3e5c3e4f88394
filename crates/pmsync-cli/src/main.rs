mod cmd;
mod locate;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, prune::PruneArgs, reconcile::ReconcileArgs};
use pmsync_core::config::{Config, Overrides};
use pmsync_core::PmError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pmsync",
    about = "Keep Epic/Task/Subtask hierarchies in sync with a manager roster, and prune stale ones",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest pmsync.yaml upward from the current directory)
    #[arg(long, global = true, env = "PMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Also append logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    env: EnvArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that may come from the environment instead of the config file.
#[derive(clap::Args)]
struct EnvArgs {
    /// Tracker base URL
    #[arg(long, global = true, env = "JIRA_URL", hide_env_values = true)]
    jira_url: Option<String>,

    /// Tracker account name
    #[arg(long, global = true, env = "API_USERNAME", hide_env_values = true)]
    api_username: Option<String>,

    /// Tracker API token
    #[arg(long, global = true, env = "API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Project used when a roster row lists none, and for prune
    #[arg(long, global = true, env = "PROJECT_KEY")]
    project_key: Option<String>,

    /// Spreadsheet API key
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Spreadsheet holding the roster
    #[arg(long, global = true, env = "GOOGLE_SPREADSHEET_ID")]
    spreadsheet_id: Option<String>,

    /// Sheet or A1 range holding the roster
    #[arg(long, global = true, env = "GOOGLE_SPREADSHEET_NAME")]
    sheet: Option<String>,
}

impl EnvArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            tracker_url: self.jira_url.clone(),
            tracker_username: self.api_username.clone(),
            tracker_token: self.api_token.clone(),
            default_project: self.project_key.clone(),
            sheets_api_key: self.google_api_key.clone(),
            spreadsheet_id: self.spreadsheet_id.clone(),
            sheet_range: self.sheet.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure each owner's Epic → Task → Subtask chain exists for a day
    Reconcile(ReconcileArgs),

    /// Delete stale Subtasks, then Tasks left without children
    Prune(PruneArgs),

    /// Show the owner → projects roster as parsed from the spreadsheet
    Directory,

    /// Validate or display the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Reconcile(_) | Commands::Prune(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    let path = locate::resolve_config(cli.config.as_deref());
    let loaded = load_config(&path, cli.config.is_some(), &cli.env.overrides());

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| loaded.as_ref().ok().and_then(|c| c.log_file.clone()));

    let result = init_logging(default_level, log_file.as_deref())
        .and_then(|()| loaded)
        .and_then(|config| match cli.command {
            Commands::Reconcile(args) => cmd::reconcile::run(&config, args, cli.json),
            Commands::Prune(args) => cmd::prune::run(&config, args, cli.json),
            Commands::Directory => cmd::directory::run(&config, cli.json),
            Commands::Config { subcommand } => cmd::config::run(&config, &path, subcommand, cli.json),
        });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}

/// 2 when the run was refused before any work (configuration or roster), else 1.
fn exit_code(e: &anyhow::Error) -> i32 {
    let fatal = e
        .chain()
        .any(|cause| cause.downcast_ref::<PmError>().is_some_and(PmError::is_fatal));
    if fatal {
        2
    } else {
        1
    }
}

/// Load the config file and apply environment overrides.
///
/// A file that was asked for explicitly must exist. A discovered path that
/// does not exist yields defaults, so a run can be configured entirely from
/// the environment.
fn load_config(path: &Path, explicit: bool, overrides: &Overrides) -> anyhow::Result<Config> {
    let mut config = match Config::load(path) {
        Ok(config) => config,
        Err(PmError::ConfigNotFound(_)) if !explicit => Config::default(),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to load config from {}", path.display()))
        }
    };
    config.apply_overrides(overrides);
    Ok(config)
}

fn init_logging(level: tracing::Level, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
