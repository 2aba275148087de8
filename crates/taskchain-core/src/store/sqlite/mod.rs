//! SQLite job store
//!
//! Reference [`ChainStore`] backed by two SQLite databases: a catalog holding
//! chain definitions (SQL elements run against it), and a journal holding
//! signals, the interval schedule, run statuses and execution logs.
//!
//! SQLite allows one writer per database, so chains whose SQL elements write
//! should run with exclusive execution.

mod migrations;
mod queries;
mod transaction;


pub use queries::{ChainDefinition, ChainSchedule, ExecutionLogEntry, RunStatusEntry};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChainStore, StoreTransaction};
use crate::error::{ChainError, Result};
use crate::scheduler::{
    Chain, ChainElement, ChainSignal, RunStatus, RunStatusId, SignalCommand, StatusSubject,
};
use transaction::SqliteTransaction;

const DEFAULT_SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const CHAIN_COLUMNS: &str =
    "chain_id, task_id, chain_name, self_destruct, exclusive_execution, max_instances";

/// SQLite-based chain store
pub struct SqliteChainStore {
    pub(super) catalog: Pool<Sqlite>,
    pub(super) journal: Pool<Sqlite>,
    signal_poll_interval: Duration,
}

impl SqliteChainStore {
    /// Open (creating if needed) the catalog and journal databases
    pub async fn from_paths(catalog: &Path, journal: &Path) -> Result<Self> {
        Self::with_max_connections(catalog, journal, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Open with an explicit catalog pool size.
    ///
    /// Every running chain holds one catalog connection for its transaction,
    /// so the pool should be at least as large as the worker pool.
    pub async fn with_max_connections(
        catalog: &Path,
        journal: &Path,
        max_connections: u32,
    ) -> Result<Self> {
        let store = Self {
            catalog: connect(catalog, max_connections).await?,
            journal: connect(journal, 4).await?,
            signal_poll_interval: DEFAULT_SIGNAL_POLL_INTERVAL,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Set how often the signal table is polled
    pub fn with_signal_poll_interval(mut self, interval: Duration) -> Self {
        self.signal_poll_interval = interval;
        self
    }

    /// Consume the oldest queued signal, skipping malformed ones
    async fn take_next_signal(&self) -> Result<Option<ChainSignal>> {
        let mut tx = self.journal.begin().await?;
        loop {
            let row: Option<(i64, i64, String)> = sqlx::query_as(
                "SELECT id, config_id, command FROM chain_signals ORDER BY id ASC LIMIT 1",
            )
            .fetch_optional(&mut *tx)
            .await?;

            let Some((id, config_id, command)) = row else {
                tx.commit().await?;
                return Ok(None);
            };

            sqlx::query("DELETE FROM chain_signals WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            match command.parse::<SignalCommand>() {
                Ok(command) if config_id != 0 => {
                    tx.commit().await?;
                    return Ok(Some(ChainSignal { command, config_id }));
                }
                Ok(_) => warn!(signal_id = id, "Dropping signal without configuration id"),
                Err(e) => warn!(signal_id = id, error = %e, "Dropping malformed signal"),
            }
        }
    }

    async fn select_chains(&self, filter: &str) -> Result<Vec<Chain>> {
        let sql = format!("SELECT {} FROM chains WHERE {} ORDER BY chain_id", CHAIN_COLUMNS, filter);
        let chains = sqlx::query_as::<_, Chain>(&sql)
            .fetch_all(&self.catalog)
            .await?;
        Ok(chains)
    }
}

async fn connect(path: &Path, max_connections: u32) -> Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

#[async_trait]
impl ChainStore for SqliteChainStore {
    async fn wait_for_signal(&self, shutdown: &CancellationToken) -> ChainSignal {
        loop {
            if shutdown.is_cancelled() {
                return ChainSignal::shutdown();
            }

            match self.take_next_signal().await {
                Ok(Some(signal)) => return signal,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to read chain signals"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => return ChainSignal::shutdown(),
                _ = tokio::time::sleep(self.signal_poll_interval) => {}
            }
        }
    }

    async fn select_chain_by_config(&self, config_id: i64) -> Result<Chain> {
        let sql = format!("SELECT {} FROM chains WHERE live AND task_id = ?", CHAIN_COLUMNS);
        sqlx::query_as::<_, Chain>(&sql)
            .bind(config_id)
            .fetch_optional(&self.catalog)
            .await?
            .ok_or(ChainError::ChainNotFound(config_id))
    }

    async fn select_due_chains(&self) -> Result<Vec<Chain>> {
        let now = Utc::now();
        let candidates: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT chain_id, interval_secs FROM chains
            WHERE live AND NOT run_at_reboot AND interval_secs IS NOT NULL
            "#,
        )
        .fetch_all(&self.catalog)
        .await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.journal.begin().await?;
        let scheduled: HashMap<i64, DateTime<Utc>> = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "SELECT chain_id, next_run_at FROM chain_schedule",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let mut due = Vec::new();
        for (chain_id, interval_secs) in candidates {
            if scheduled.get(&chain_id).is_some_and(|next| *next > now) {
                continue;
            }
            sqlx::query(
                r#"
                INSERT INTO chain_schedule (chain_id, next_run_at) VALUES (?, ?)
                ON CONFLICT(chain_id) DO UPDATE SET next_run_at = excluded.next_run_at
                "#,
            )
            .bind(chain_id)
            .bind(now + ChronoDuration::seconds(interval_secs))
            .execute(&mut *tx)
            .await?;
            due.push(chain_id);
        }
        tx.commit().await?;

        if due.is_empty() {
            return Ok(Vec::new());
        }

        let ids = due
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.select_chains(&format!("chain_id IN ({})", ids)).await
    }

    async fn select_reboot_chains(&self) -> Result<Vec<Chain>> {
        self.select_chains("live AND run_at_reboot").await
    }

    async fn can_proceed(&self, chain_id: i64, max_instances: i64) -> Result<bool> {
        if max_instances <= 0 {
            return Ok(true);
        }

        let running: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM chain_runs WHERE chain_id = ? AND finished_at IS NULL",
        )
        .bind(chain_id)
        .fetch_one(&self.journal)
        .await?;

        debug!(chain_id, running, max_instances, "Admission check");
        Ok(running < max_instances)
    }

    async fn close_abandoned_runs(&self) -> Result<u64> {
        let now = Utc::now();
        let mut tx = self.journal.begin().await?;

        let open: Vec<(i64, i64, i64)> = sqlx::query_as(
            "SELECT run_id, chain_id, task_id FROM chain_runs WHERE finished_at IS NULL",
        )
        .fetch_all(&mut *tx)
        .await?;

        for (run_id, chain_id, task_id) in &open {
            sqlx::query(
                r#"
                INSERT INTO run_status (run_id, chain_id, task_id, command_id, status, created_at)
                VALUES (?, ?, ?, NULL, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(chain_id)
            .bind(task_id)
            .bind(RunStatus::ChainFailed.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE chain_runs SET finished_at = ?, status = ? WHERE run_id = ?")
                .bind(now)
                .bind(RunStatus::ChainFailed.as_str())
                .bind(run_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        if !open.is_empty() {
            info!(closed = open.len(), "Closed runs left open by a previous process");
        }
        Ok(open.len() as u64)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.catalog.begin().await?;
        Ok(Box::new(SqliteTransaction::new(tx)))
    }

    async fn create_run_status(&self, chain_id: i64, task_id: i64) -> Result<RunStatusId> {
        let result =
            sqlx::query("INSERT INTO chain_runs (chain_id, task_id, started_at) VALUES (?, ?, ?)")
                .bind(chain_id)
                .bind(task_id)
                .bind(Utc::now())
                .execute(&self.journal)
                .await?;

        Ok(RunStatusId(result.last_insert_rowid()))
    }

    async fn update_status(
        &self,
        run: RunStatusId,
        subject: StatusSubject<'_>,
        status: RunStatus,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO run_status (run_id, chain_id, task_id, command_id, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.0)
        .bind(subject.chain_id())
        .bind(subject.task_id())
        .bind(subject.command_id())
        .bind(status.as_str())
        .bind(now)
        .execute(&self.journal)
        .await?;

        let closes_run = subject.command_id().is_none() || status == RunStatus::ChainFailed;
        if closes_run && status.is_terminal() {
            sqlx::query(
                "UPDATE chain_runs SET finished_at = ?, status = ? WHERE run_id = ? AND finished_at IS NULL",
            )
            .bind(now)
            .bind(status.as_str())
            .bind(run.0)
            .execute(&self.journal)
            .await?;
        }

        Ok(())
    }

    async fn write_execution_log(
        &self,
        element: &ChainElement,
        result_code: i32,
        output: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_log (
                chain_id, task_id, command_id, kind, script,
                started_at, duration_us, returncode, output, logged_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(element.chain_id)
        .bind(element.task_id)
        .bind(element.command_id)
        .bind(element.kind.as_str())
        .bind(&element.script)
        .bind(element.started_at)
        .bind(element.duration)
        .bind(result_code)
        .bind(output)
        .bind(Utc::now())
        .execute(&self.journal)
        .await?;

        Ok(())
    }

    async fn delete_chain_config(&self, chain_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM chains WHERE chain_id = ?")
            .bind(chain_id)
            .execute(&self.catalog)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ChainError::ChainNotFound(chain_id));
        }

        sqlx::query("DELETE FROM chain_schedule WHERE chain_id = ?")
            .bind(chain_id)
            .execute(&self.journal)
            .await?;
        Ok(())
    }
}
