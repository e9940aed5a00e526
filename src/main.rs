//! Solana Balance Sweeper - moves a wallet's balance to a fixed address once it
//! is worth enough
//!
//! # WARNING
//! - This bot moves real money. Double-check the destination address.
//! - A generated wallet only lives in memory; use `keygen` and `KEYPAIR_PATH`
//!   for anything you intend to fund.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

// Use the library crate
use sol_sweeper::cli::commands;
use sol_sweeper::config::Config;

/// Solana Balance Sweeper
#[derive(Parser)]
#[command(name = "sweeper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "sweeper.toml")]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram bot (and auto-sweep, if configured)
    Run,

    /// Show the wallet's current balance and value
    Status,

    /// Sweep now if the balance is worth at least the threshold
    Sweep {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Print the deposit address
    Address,

    /// Show current configuration (secrets masked)
    Config,

    /// Check RPC, price feed and Telegram connectivity
    Health,

    /// Generate a new wallet keypair file
    Keygen {
        /// Where to write the keypair
        #[arg(short, long, default_value = "sweeper-keypair.json")]
        out: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json);

    if let Err(e) = execute(cli.command, &cli.config).await {
        error!("Command failed: {:#}", e);
        // Bad config or an unreadable/insecure keypair stops us before any network call
        let fatal = e
            .downcast_ref::<sol_sweeper::Error>()
            .is_some_and(|e| e.is_configuration());
        std::process::exit(if fatal { 2 } else { 1 });
    }

    Ok(())
}

async fn execute(command: Commands, config_path: &str) -> Result<()> {
    match command {
        // Key generation needs no configuration
        Commands::Keygen { out, force } => commands::keygen(&out, force),
        Commands::Run => commands::run(&load_config(config_path)?).await,
        Commands::Status => commands::status(&load_config(config_path)?).await,
        Commands::Sweep { yes } => commands::sweep(&load_config(config_path)?, yes).await,
        Commands::Address => commands::address(&load_config(config_path)?),
        Commands::Config => commands::show_config(&load_config(config_path)?),
        Commands::Health => commands::health(&load_config(config_path)?).await,
    }
}

fn load_config(path: &str) -> Result<Config> {
    let config = Config::load(path)
        .map_err(|e| sol_sweeper::Error::Config(format!("{:#}", e)))?;
    info!("Configuration loaded from {}", path);
    Ok(config)
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sol_sweeper=info,sweeper=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
