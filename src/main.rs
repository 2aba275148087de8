//! Taskchain - Task Chain Scheduler
//!
//! CLI entry point for the taskchain scheduler.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskchain=info,taskchain_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    if matches!(cli.command, None | Some(cli::Commands::Run)) {
        info!("Starting taskchain v{}", env!("CARGO_PKG_VERSION"));
    }

    cli::run(cli, config).await
}
