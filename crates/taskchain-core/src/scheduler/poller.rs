//! Poller
//!
//! Pulls due chains (or, once at startup, reboot chains) from the store and
//! queues them. Large batches are paced across the refetch interval.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::queue::ChainSender;
use crate::store::ChainStore;

/// Periodic chain source
pub struct Poller {
    store: Arc<dyn ChainStore>,
    queue: ChainSender,
    workers: usize,
    refetch_interval_secs: u64,
}

impl Poller {
    /// Create a poller
    pub fn new(
        store: Arc<dyn ChainStore>,
        queue: ChainSender,
        workers: usize,
        refetch_interval_secs: u64,
    ) -> Self {
        Self {
            store,
            queue,
            workers,
            refetch_interval_secs,
        }
    }

    /// Run one poll cycle, returning how many chains were queued.
    ///
    /// Query failures are logged and end the cycle with nothing queued.
    pub async fn poll(&self, reboot: bool) -> usize {
        let fetched = if reboot {
            self.store.select_reboot_chains().await
        } else {
            self.store.select_due_chains().await
        };

        let chains = match fetched {
            Ok(chains) => chains,
            Err(e) => {
                error!(reboot, error = %e, "Could not query pending chains");
                return 0;
            }
        };

        let count = chains.len();
        if reboot {
            info!(count, "Retrieve scheduled chains to run @reboot");
        } else {
            info!(count, "Retrieve scheduled chains to run");
        }

        let pause = throttle_delay(count, self.workers, self.refetch_interval_secs);
        let mut queued = 0;
        for chain in chains {
            if let Some(pause) = pause {
                tokio::time::sleep(pause).await;
            }
            let chain_id = chain.chain_id;
            if let Err(e) = self.queue.send(chain).await {
                error!(chain_id, error = %e, "Cannot queue chain");
                break;
            }
            debug!(chain_id, "Putting chain to the execution queue");
            queued += 1;
        }
        queued
    }
}

/// Pause between pushes for a batch of `count` chains.
///
/// Batches larger than `workers × refetch_interval_secs` are spread evenly
/// over the refetch interval; smaller ones are queued at once.
pub fn throttle_delay(count: usize, workers: usize, refetch_interval_secs: u64) -> Option<Duration> {
    let threshold = (workers as u64).saturating_mul(refetch_interval_secs);
    if count == 0 || count as u64 <= threshold {
        return None;
    }
    Some(Duration::from_millis(
        refetch_interval_secs.saturating_mul(1000) / count as u64,
    ))
}
