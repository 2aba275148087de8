//! Task dispatcher
//!
//! Runs one chain element according to its kind and records the outcome in
//! the store's execution log.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::types::{ChainElement, TaskKind, TaskOutcome};
use crate::error::{ChainError, Result, FAILURE_CODE};
use crate::store::{ChainStore, StoreTransaction};
use crate::tasks::{BuiltinRegistry, ProgramRunner};

/// Executes single elements for the chain executor
pub struct TaskDispatcher {
    store: Arc<dyn ChainStore>,
    programs: Arc<dyn ProgramRunner>,
    builtins: Arc<BuiltinRegistry>,
    no_program_tasks: bool,
}

impl TaskDispatcher {
    /// Create a dispatcher
    pub fn new(
        store: Arc<dyn ChainStore>,
        programs: Arc<dyn ProgramRunner>,
        builtins: Arc<BuiltinRegistry>,
        no_program_tasks: bool,
    ) -> Self {
        Self {
            store,
            programs,
            builtins,
            no_program_tasks,
        }
    }

    /// Run `element` inside the chain transaction.
    ///
    /// Records `started_at` and `duration` on the element. Parameter lookup
    /// failures and disabled program tasks return without executing or
    /// logging anything.
    pub async fn dispatch(
        &self,
        tx: &mut dyn StoreTransaction,
        element: &mut ChainElement,
        cancel: &CancellationToken,
    ) -> TaskOutcome {
        let params = match tx.fetch_param_values(element).await {
            Ok(params) => params,
            Err(e) => {
                error!(error = %e, "Cannot fetch task parameters");
                return TaskOutcome::Failed { code: FAILURE_CODE };
            }
        };

        element.started_at = Some(Utc::now());
        if element.kind == TaskKind::Program && self.no_program_tasks {
            info!("Program task execution skipped");
            return TaskOutcome::Skipped;
        }

        let started = Instant::now();
        let result = self.execute(tx, element, &params, cancel).await;
        element.duration = i64::try_from(started.elapsed().as_micros()).unwrap_or(i64::MAX);

        let (code, output) = match result {
            Ok(output) => {
                info!("Task executed successfully");
                (0, output)
            }
            Err(e) => {
                error!(error = %e, "Task execution failed");
                let partial = e.partial_output();
                let output = if partial.is_empty() {
                    e.to_string()
                } else {
                    [partial, &e.to_string()].join("\n")
                };
                (e.result_code(), output)
            }
        };

        // Not tied to the chain token: the log survives a STOP.
        if let Err(e) = self.store.write_execution_log(element, code, &output).await {
            warn!(error = %e, "Failed to write execution log");
        }

        if code == 0 {
            TaskOutcome::Succeeded
        } else {
            TaskOutcome::Failed { code }
        }
    }

    async fn execute(
        &self,
        tx: &mut dyn StoreTransaction,
        element: &ChainElement,
        params: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(ChainError::Cancelled);
        }
        match element.kind {
            TaskKind::Sql => tx.execute_statement(element, params).await,
            TaskKind::Program => self.programs.run(&element.script, params, cancel).await,
            TaskKind::Builtin => {
                self.builtins
                    .invoke(&element.command_name, params, cancel)
                    .await
            }
        }
    }
}
