use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::SqliteChainStore;
use crate::error::{ChainError, Result};
use crate::scheduler::{Chain, ChainElement, SignalCommand};

/// When a chain is picked up by the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "secs", rename_all = "snake_case")]
pub enum ChainSchedule {
    /// Only through START signals
    Manual,
    /// Once, on the scheduler's startup pass
    Reboot,
    /// Repeatedly, every `n` seconds
    Every(u64),
}

/// Chain configuration to insert into the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDefinition {
    /// Configuration identity used by signals
    pub task_id: i64,
    /// Human-readable name
    pub chain_name: String,
    /// Poll cadence
    pub schedule: ChainSchedule,
    /// Whether the chain is enabled
    pub live: bool,
    /// Delete after one run
    pub self_destruct: bool,
    /// Exclusive execution
    pub exclusive_execution: bool,
    /// Instance ceiling (`<= 0` unlimited)
    pub max_instances: i64,
}

impl ChainDefinition {
    /// Create a live, manual, non-exclusive definition
    pub fn new(task_id: i64, chain_name: impl Into<String>) -> Self {
        Self {
            task_id,
            chain_name: chain_name.into(),
            schedule: ChainSchedule::Manual,
            live: true,
            self_destruct: false,
            exclusive_execution: false,
            max_instances: 0,
        }
    }

    /// Set schedule
    pub fn with_schedule(mut self, schedule: ChainSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set exclusive execution
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive_execution = exclusive;
        self
    }

    /// Set self destruct
    pub fn with_self_destruct(mut self, self_destruct: bool) -> Self {
        self.self_destruct = self_destruct;
        self
    }

    /// Set max instances
    pub fn with_max_instances(mut self, max_instances: i64) -> Self {
        self.max_instances = max_instances;
        self
    }

    /// Set live flag
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }
}

/// One persisted status transition
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunStatusEntry {
    /// Run identity
    pub run_id: i64,
    /// Chain identity
    pub chain_id: i64,
    /// Configuration identity
    pub task_id: i64,
    /// Element identity, `None` for the chain-level row
    pub command_id: Option<i64>,
    /// Status name
    pub status: String,
    /// When the row was written
    pub created_at: DateTime<Utc>,
}

/// One persisted element execution
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionLogEntry {
    /// Chain identity
    pub chain_id: i64,
    /// Element identity
    pub command_id: i64,
    /// Element kind name
    pub kind: String,
    /// Statement or program
    pub script: String,
    /// Elapsed microseconds
    pub duration_us: i64,
    /// Result code
    pub returncode: i32,
    /// Captured output
    pub output: String,
}

impl SqliteChainStore {
    /// Insert a chain configuration
    pub async fn create_chain(&self, definition: &ChainDefinition) -> Result<Chain> {
        let (reboot, interval) = match definition.schedule {
            ChainSchedule::Manual => (false, None),
            ChainSchedule::Reboot => (true, None),
            ChainSchedule::Every(secs) => {
                let secs = i64::try_from(secs).map_err(|_| {
                    ChainError::InvalidConfig(format!("interval too large: {}", secs))
                })?;
                (false, Some(secs))
            }
        };

        let result = sqlx::query(
            r#"
            INSERT INTO chains (
                task_id, chain_name, run_at_reboot, interval_secs, live,
                self_destruct, exclusive_execution, max_instances, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(definition.task_id)
        .bind(&definition.chain_name)
        .bind(reboot)
        .bind(interval)
        .bind(definition.live)
        .bind(definition.self_destruct)
        .bind(definition.exclusive_execution)
        .bind(definition.max_instances)
        .bind(Utc::now())
        .execute(&self.catalog)
        .await?;

        Ok(Chain {
            chain_id: result.last_insert_rowid(),
            task_id: definition.task_id,
            chain_name: definition.chain_name.clone(),
            self_destruct: definition.self_destruct,
            exclusive_execution: definition.exclusive_execution,
            max_instances: definition.max_instances,
        })
    }

    /// Append an element to a chain configuration, returning its command id
    pub async fn add_task(&self, element: &ChainElement) -> Result<i64> {
        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM chain_tasks WHERE task_id = ?",
        )
        .bind(element.task_id)
        .fetch_one(&self.catalog)
        .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO chain_tasks (task_id, position, kind, script, command_name, ignore_error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(element.task_id)
        .bind(position)
        .bind(element.kind.as_str())
        .bind(&element.script)
        .bind(&element.command_name)
        .bind(element.ignore_error)
        .execute(&self.catalog)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Append a parameter value to an element
    pub async fn add_parameter(&self, command_id: i64, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_parameters (command_id, order_id, value)
            SELECT ?, COALESCE(MAX(order_id), 0) + 1, ? FROM task_parameters WHERE command_id = ?
            "#,
        )
        .bind(command_id)
        .bind(value)
        .bind(command_id)
        .execute(&self.catalog)
        .await?;

        Ok(())
    }

    /// Queue a START/STOP signal for the listener
    pub async fn send_signal(&self, config_id: i64, command: SignalCommand) -> Result<()> {
        if config_id == 0 {
            return Err(ChainError::InvalidConfig(
                "configuration id 0 is reserved".to_string(),
            ));
        }

        sqlx::query("INSERT INTO chain_signals (config_id, command, created_at) VALUES (?, ?, ?)")
            .bind(config_id)
            .bind(command.as_str())
            .bind(Utc::now())
            .execute(&self.journal)
            .await?;

        Ok(())
    }

    /// Status rows of a chain, oldest first
    pub async fn run_statuses(&self, chain_id: i64) -> Result<Vec<RunStatusEntry>> {
        let rows = sqlx::query_as::<_, RunStatusEntry>(
            r#"
            SELECT run_id, chain_id, task_id, command_id, status, created_at
            FROM run_status
            WHERE chain_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(chain_id)
        .fetch_all(&self.journal)
        .await?;

        Ok(rows)
    }

    /// Execution log of a chain, oldest first
    pub async fn execution_logs(&self, chain_id: i64) -> Result<Vec<ExecutionLogEntry>> {
        let rows = sqlx::query_as::<_, ExecutionLogEntry>(
            r#"
            SELECT chain_id, command_id, kind, script, duration_us, returncode, output
            FROM execution_log
            WHERE chain_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(chain_id)
        .fetch_all(&self.journal)
        .await?;

        Ok(rows)
    }
}
