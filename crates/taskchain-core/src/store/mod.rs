//! Job store interfaces
//!
//! The engine never talks to a database directly. It consumes a
//! [`ChainStore`] for chain selection, admission, run-status bookkeeping and
//! execution logs, and a [`StoreTransaction`] owned by exactly one chain run
//! for everything that must commit or roll back together.
//!
//! Status and log writes take no cancellation token: they are persisted even
//! when the run that issues them has been stopped.

mod sqlite;

pub use sqlite::{
    ChainDefinition, ChainSchedule, ExecutionLogEntry, RunStatusEntry, SqliteChainStore,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::scheduler::{Chain, ChainElement, ChainSignal, RunStatus, RunStatusId, StatusSubject};

/// Persistent job store consumed by the scheduler
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Block until the next START/STOP signal.
    ///
    /// Returns [`ChainSignal::shutdown`] once `shutdown` is cancelled.
    async fn wait_for_signal(&self, shutdown: &CancellationToken) -> ChainSignal;

    /// Resolve the chain referenced by a signal
    async fn select_chain_by_config(&self, config_id: i64) -> Result<Chain>;

    /// Chains due for execution now
    async fn select_due_chains(&self) -> Result<Vec<Chain>>;

    /// Chains to run once after scheduler start
    async fn select_reboot_chains(&self) -> Result<Vec<Chain>>;

    /// Whether another instance of the chain may start
    async fn can_proceed(&self, chain_id: i64, max_instances: i64) -> Result<bool>;

    /// Close runs a previous process left without a terminal status.
    ///
    /// Called once before the first dispatch; returns how many were closed.
    async fn close_abandoned_runs(&self) -> Result<u64> {
        Ok(0)
    }

    /// Open the transaction a chain run executes in
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Issue the run-status identity for one chain execution
    async fn create_run_status(&self, chain_id: i64, task_id: i64) -> Result<RunStatusId>;

    /// Record a status transition for an element or the whole chain
    async fn update_status(
        &self,
        run: RunStatusId,
        subject: StatusSubject<'_>,
        status: RunStatus,
    ) -> Result<()>;

    /// Persist an element's result code and captured output
    async fn write_execution_log(
        &self,
        element: &ChainElement,
        result_code: i32,
        output: &str,
    ) -> Result<()>;

    /// Remove a chain configuration after a self-destructing run
    async fn delete_chain_config(&self, chain_id: i64) -> Result<()>;
}

/// Store transaction owned by a single chain run
#[async_trait]
pub trait StoreTransaction: Send {
    /// Ordered elements of the chain configuration
    async fn fetch_elements(&mut self, task_id: i64) -> Result<Vec<ChainElement>>;

    /// Resolved parameter values of one element
    async fn fetch_param_values(&mut self, element: &ChainElement) -> Result<Vec<String>>;

    /// Run an SQL element inside this transaction, returning its output
    async fn execute_statement(
        &mut self,
        element: &ChainElement,
        params: &[String],
    ) -> Result<String>;

    /// Make the chain's work durable
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the chain's work
    async fn rollback(self: Box<Self>) -> Result<()>;
}
