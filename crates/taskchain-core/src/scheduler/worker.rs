//! Worker pool
//!
//! A fixed set of symmetric workers draining the execution queue. For every
//! chain a worker runs admission, takes the execution lock, registers the run
//! for STOP signals, executes it and cleans up.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

use super::executor::ChainExecutor;
use super::lock::ExecutionLock;
use super::registry::ActiveChains;
use super::types::{Chain, ChainRunResult};
use crate::queue::ChainReceiver;
use crate::store::ChainStore;

/// Shared state every worker uses
pub struct WorkerPool {
    store: Arc<dyn ChainStore>,
    executor: Arc<ChainExecutor>,
    lock: ExecutionLock,
    active: Arc<ActiveChains>,
}

impl WorkerPool {
    /// Create a pool around an executor
    pub fn new(
        store: Arc<dyn ChainStore>,
        executor: Arc<ChainExecutor>,
        lock: ExecutionLock,
        active: Arc<ActiveChains>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            executor,
            lock,
            active,
        })
    }

    /// Spawn `workers` tasks consuming `queue` until `shutdown`
    pub fn spawn(
        self: &Arc<Self>,
        workers: usize,
        queue: ChainReceiver,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|id| {
                let pool = Arc::clone(self);
                let queue = queue.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.work(id, queue, shutdown).await })
            })
            .collect()
    }

    async fn work(&self, id: usize, queue: ChainReceiver, shutdown: CancellationToken) {
        debug!(worker = id, "Worker started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let chain = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                chain = queue.recv() => match chain {
                    Some(chain) => chain,
                    None => break,
                },
            };

            let span = tracing::info_span!("chain", chain_id = chain.chain_id, worker = id);
            self.process(chain, &shutdown).instrument(span).await;
        }
        debug!(worker = id, "Worker stopped");
    }

    /// Run one chain through admission, locking and execution.
    ///
    /// Returns `None` when admission refused the chain.
    pub async fn process(
        &self,
        chain: Chain,
        shutdown: &CancellationToken,
    ) -> Option<ChainRunResult> {
        info!(chain_name = %chain.chain_name, "Starting chain");

        match self
            .store
            .can_proceed(chain.chain_id, chain.max_instances)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(max_instances = chain.max_instances, "Cannot proceed, instance limit reached");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Admission check failed");
                return None;
            }
        }

        let guard = self.lock.acquire(chain.exclusive_execution).await;
        let registration = self.active.register(chain.task_id, shutdown);

        let result = self.executor.execute(&chain, registration.token()).await;

        if chain.self_destruct {
            match self.store.delete_chain_config(chain.chain_id).await {
                Ok(()) => info!("Self-destructing chain configuration deleted"),
                Err(e) => error!(error = %e, "Cannot delete chain configuration"),
            }
        }

        drop(registration);
        drop(guard);
        debug!(?result, "Chain finished");
        Some(result)
    }
}
