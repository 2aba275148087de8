//! Chain executor
//!
//! Runs one chain's elements in order inside a single store transaction:
//! Begin → per-element dispatch → Commit, or Rollback at the first element
//! that fails without `ignore_error`. A cancelled run never commits.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use super::dispatcher::TaskDispatcher;
use super::types::{
    Chain, ChainElement, ChainRunResult, RunStatus, RunStatusId, StatusSubject,
};
use crate::store::{ChainStore, StoreTransaction};

/// Executes whole chains
pub struct ChainExecutor {
    store: Arc<dyn ChainStore>,
    dispatcher: TaskDispatcher,
}

impl ChainExecutor {
    /// Create an executor
    pub fn new(store: Arc<dyn ChainStore>, dispatcher: TaskDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Run `chain` to completion, failure, or cancellation
    pub async fn execute(&self, chain: &Chain, cancel: &CancellationToken) -> ChainRunResult {
        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(error = %e, "Cannot start transaction");
                return ChainRunResult::Abandoned;
            }
        };

        let elements = match tx.fetch_elements(chain.task_id).await {
            Ok(elements) if !elements.is_empty() => elements,
            Ok(_) => {
                warn!("Chain has no tasks");
                rollback(tx).await;
                return ChainRunResult::Abandoned;
            }
            Err(e) => {
                error!(error = %e, "Cannot fetch chain tasks");
                rollback(tx).await;
                return ChainRunResult::Abandoned;
            }
        };

        let run = match self
            .store
            .create_run_status(chain.chain_id, chain.task_id)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!(error = %e, "Cannot create run status");
                rollback(tx).await;
                return ChainRunResult::Abandoned;
            }
        };

        for mut element in elements {
            element.chain_id = chain.chain_id;
            let span = tracing::info_span!("task", command_id = element.command_id);
            let proceed = self
                .run_element(tx.as_mut(), run, &mut element, cancel)
                .instrument(span)
                .await;

            if !proceed {
                rollback(tx).await;
                return ChainRunResult::Failed;
            }
        }

        self.set_status(
            run,
            StatusSubject::Chain {
                chain_id: chain.chain_id,
                task_id: chain.task_id,
            },
            RunStatus::ChainDone,
        )
        .await;

        // TODO: a failed commit after CHAIN_DONE leaves the journal claiming success;
        // write a corrective CHAIN_FAILED row once the store can distinguish it.
        if let Err(e) = tx.commit().await {
            error!(error = %e, "Commit failed");
            return ChainRunResult::Failed;
        }

        info!("Chain executed successfully");
        ChainRunResult::Done
    }

    /// Dispatch one element; `false` means the chain must stop
    async fn run_element(
        &self,
        tx: &mut dyn StoreTransaction,
        run: RunStatusId,
        element: &mut ChainElement,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() {
            warn!("Chain cancelled before task");
            self.set_status(run, StatusSubject::Element(element), RunStatus::ChainFailed)
                .await;
            return false;
        }

        info!(kind = %element.kind, "Starting task");
        self.set_status(run, StatusSubject::Element(element), RunStatus::Started)
            .await;

        let outcome = self.dispatcher.dispatch(tx, element, cancel).await;

        if cancel.is_cancelled() || (!outcome.is_success() && !element.ignore_error) {
            error!(?outcome, "Chain failed");
            self.set_status(run, StatusSubject::Element(element), RunStatus::ChainFailed)
                .await;
            return false;
        }

        if !outcome.is_success() {
            warn!(?outcome, "Task failed, error ignored");
        }
        self.set_status(run, StatusSubject::Element(element), RunStatus::ChainDone)
            .await;
        true
    }

    async fn set_status(&self, run: RunStatusId, subject: StatusSubject<'_>, status: RunStatus) {
        if let Err(e) = self.store.update_status(run, subject, status).await {
            warn!(error = %e, %status, "Failed to update run status");
        }
    }
}

async fn rollback(tx: Box<dyn StoreTransaction>) {
    if let Err(e) = tx.rollback().await {
        error!(error = %e, "Rollback failed");
    }
}
