//! START / STOP signals for a running scheduler

use anyhow::{Context, Result};
use taskchain_core::SignalCommand;

use crate::config::AppConfig;

pub async fn start(config: &AppConfig, config_id: i64) -> Result<()> {
    send(config, config_id, SignalCommand::Start).await
}

pub async fn stop(config: &AppConfig, config_id: i64) -> Result<()> {
    send(config, config_id, SignalCommand::Stop).await
}

async fn send(config: &AppConfig, config_id: i64, command: SignalCommand) -> Result<()> {
    let store = super::open_store(config).await?;
    store
        .send_signal(config_id, command)
        .await
        .with_context(|| format!("Failed to send {} for configuration {}", command, config_id))?;

    println!("{} queued for configuration {}", command, config_id);
    Ok(())
}
