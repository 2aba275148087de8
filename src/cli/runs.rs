//! Run journal of one chain

use anyhow::{Context, Result};

use crate::config::AppConfig;

pub async fn run(config: &AppConfig, chain_id: i64) -> Result<()> {
    let store = super::open_store(config).await?;

    let statuses = store
        .run_statuses(chain_id)
        .await
        .context("Failed to read run statuses")?;
    let logs = store
        .execution_logs(chain_id)
        .await
        .context("Failed to read execution log")?;

    if statuses.is_empty() && logs.is_empty() {
        println!("No runs recorded for chain {}", chain_id);
        return Ok(());
    }

    println!("Status ({} rows)", statuses.len());
    for row in &statuses {
        let subject = row
            .command_id
            .map(|id| format!("task {}", id))
            .unwrap_or_else(|| "chain".to_string());
        println!(
            "  run {:>5}  {}  {:<12} {}",
            row.run_id,
            row.created_at.format("%Y-%m-%d %H:%M:%S"),
            subject,
            row.status
        );
    }

    println!("Execution log ({} rows)", logs.len());
    for entry in &logs {
        println!(
            "  task {:>5}  {:<8} rc={:<4} {:>8}us  {}",
            entry.command_id, entry.kind, entry.returncode, entry.duration_us, entry.script
        );
        for line in entry.output.lines() {
            println!("      {}", line);
        }
    }
    Ok(())
}
