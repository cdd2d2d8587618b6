//! possync CLI
//!
//! Command-line interface for possync - cloud sync for the point-of-sale
//! local store.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use possync_core::Config;

mod commands;
mod context;
mod output;

use context::AppContext;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "possync")]
#[command(about = "possync - cloud sync with offline queuing for the POS local store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or set application configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show or set sync settings
    SyncConfig {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Check that a cloud server is reachable
    TestConnection {
        /// Server URL (defaults to the configured cloud_url)
        url: Option<String>,
    },
    /// Log in to the cloud
    Login {
        #[arg(short, long)]
        username: String,
        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Forget the cloud login
    Logout,
    /// Run one full sync now
    Sync,
    /// Show pending counts and last sync
    Status,
    /// Queue a local write in the embedded ledger
    Record {
        /// Entity type (products, customers, sales)
        entity: String,
        /// Record as a JSON object with an "id" field
        json: String,
    },
    /// Keep syncing on the configured interval until Ctrl-C
    Watch,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current values
    Show,
    /// Set a value
    Set {
        /// Key to set
        key: String,
        /// New value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // App config commands don't need the orchestrator
    if let Commands::Config { command } = &cli.command {
        return match command.clone() {
            Some(ConfigCommands::Show) | None => {
                commands::config::show(cli.config.as_ref(), &output)
            }
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, cli.config.as_ref(), &output)
            }
        };
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let ctx = AppContext::open(config)?;
    let orchestrator = &ctx.orchestrator;

    match cli.command {
        Commands::Config { .. } => unreachable!(), // Handled above
        Commands::SyncConfig { command } => match command {
            Some(ConfigCommands::Show) | None => commands::sync_config::show(orchestrator, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::sync_config::set(orchestrator, key, value, &output)
            }
        },
        Commands::TestConnection { url } => {
            commands::session::test_connection(orchestrator, url, &output).await
        }
        Commands::Login { username, password } => {
            commands::session::login(orchestrator, username, password, &output).await
        }
        Commands::Logout => commands::session::logout(orchestrator, &output),
        Commands::Sync => commands::sync::sync(orchestrator, &output).await,
        Commands::Status => commands::status::show(orchestrator, &output).await,
        Commands::Record { entity, json } => {
            commands::record::record(ctx.ledger.as_deref(), orchestrator, entity, json, &output)
        }
        Commands::Watch => commands::sync::watch(orchestrator, &output).await,
    }
}

/// Initialize logging
///
/// Only initializes if POSSYNC_LOG is set. Logs to config.log_file when set,
/// otherwise to stderr.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("POSSYNC_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "possync_core={},possync_cli={}",
        log_level, log_level
    ));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(log_file))
                .try_init();

            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
