//! crmsync CLI - manual triggers for the CRM mirror.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crmsync")]
#[command(version)]
#[command(about = "Mirror a remote CRM record catalog into a local database")]
#[command(
    long_about = "crmsync pulls contacts, deals, tasks, the event log, chat messages and the \
account catalogs (pipelines, task types, users) from a rate-limited CRM API into a local \
SQLite or Postgres database. Runs are incremental: each entity type tracks a watermark and \
unchanged records are skipped by content fingerprint."
)]
#[command(after_long_help = r#"EXAMPLES
    Apply migrations and sync everything:
        $ crmsync migrate up
        $ crmsync sync all

    Incremental contact sync:
        $ crmsync sync contacts

    Refetch the full deal catalog, ignoring the watermark:
        $ crmsync sync deals --full

    Show the configured request-rate limits:
        $ crmsync limits

CONFIGURATION
    crmsync reads configuration from:
      1. ~/.config/crmsync/config.toml (or $XDG_CONFIG_HOME/crmsync/config.toml)
      2. ./crmsync.toml
      3. Environment variables (CRMSYNC_* prefix)

ENVIRONMENT VARIABLES
    CRMSYNC_DATABASE_URL    Database connection string (default: ~/.local/state/crmsync/crmsync.db)
    CRMSYNC_CRM_TOKEN       Bearer token for the CRM API
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Sync one entity type, or all of them
    Sync {
        /// contacts, deals, tasks, events, messages, pipelines, task-types,
        /// users, or "all"
        entity: String,

        /// Ignore the watermark and refetch the whole catalog
        #[arg(short, long)]
        full: bool,
    },
    /// Show the configured request-rate limits
    Limits,
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Fresh install - drop all tables and reapply migrations
    Fresh,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = config::Config::load();

    let result = match cli.command {
        Commands::Migrate { action } => commands::migrate::handle_migrate(action, &config).await,
        Commands::Sync { entity, full } => {
            commands::sync::handle_sync(&config, &entity, full).await
        }
        Commands::Limits => commands::limits::handle_limits(&config).await,
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
