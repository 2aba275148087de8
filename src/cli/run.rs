//! Scheduler startup

use anyhow::{Context, Result};
use std::sync::Arc;
use taskchain_core::shutdown::cancel_on_signal;
use taskchain_core::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;

/// Run the scheduler until Ctrl+C or SIGTERM
pub async fn run(config: AppConfig) -> Result<()> {
    let store = super::open_store(&config).await?;

    let scheduler = Scheduler::builder()
        .store(Arc::new(store))
        .config(config.scheduler.engine_config())
        .build()
        .context("Failed to build scheduler")?;

    info!(
        catalog = %config.database.path.display(),
        journal = %config.database.journal_path.display(),
        no_program_tasks = config.scheduler.no_program_tasks,
        "Store ready"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    scheduler
        .run(shutdown)
        .await
        .context("Scheduler terminated with an error")
}
