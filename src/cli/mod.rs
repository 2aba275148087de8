//! CLI module for taskchain
//!
//! Provides commands:
//! - `run`: Start the scheduler (default)
//! - `start` / `stop`: Queue a signal for a running scheduler
//! - `runs`: Show the run journal of a chain

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskchain_core::SqliteChainStore;

use crate::config::AppConfig;

mod run;
mod runs;
mod signal;

/// Taskchain CLI
#[derive(Parser, Debug)]
#[command(name = "taskchain")]
#[command(about = "Scheduler for chains of SQL, program and builtin tasks")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler (default)
    Run,
    /// Ask a running scheduler to start a chain now
    Start {
        /// Chain configuration id
        config_id: i64,
    },
    /// Ask a running scheduler to stop a chain
    Stop {
        /// Chain configuration id
        config_id: i64,
    },
    /// Show status rows and execution log of a chain
    Runs {
        /// Chain id
        chain_id: i64,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run::run(config).await,
        Commands::Start { config_id } => signal::start(&config, config_id).await,
        Commands::Stop { config_id } => signal::stop(&config, config_id).await,
        Commands::Runs { chain_id } => runs::run(&config, chain_id).await,
    }
}

/// Catalog connections kept beyond one per worker, for the poller and listener lookups
const SPARE_CATALOG_CONNECTIONS: u32 = 4;

/// Every running chain holds a catalog connection for its whole transaction
fn catalog_pool_size(workers: usize) -> u32 {
    u32::try_from(workers)
        .unwrap_or(u32::MAX)
        .saturating_add(SPARE_CATALOG_CONNECTIONS)
}

/// Open the configured SQLite store
pub(crate) async fn open_store(config: &AppConfig) -> Result<SqliteChainStore> {
    let store = SqliteChainStore::with_max_connections(
        &config.database.path,
        &config.database.journal_path,
        catalog_pool_size(config.scheduler.workers),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to open store at {} / {}",
            config.database.path.display(),
            config.database.journal_path.display()
        )
    })?;
    Ok(store.with_signal_poll_interval(config.scheduler.signal_poll_interval()))
}
