//! Signal listener
//!
//! Turns START signals into queued chains and STOP signals into
//! cancellations of registered runs.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::registry::ActiveChains;
use super::types::SignalCommand;
use crate::queue::ChainSender;
use crate::store::ChainStore;

/// Reacts to the store's START/STOP signals
pub struct SignalListener {
    store: Arc<dyn ChainStore>,
    queue: ChainSender,
    active: Arc<ActiveChains>,
}

impl SignalListener {
    /// Create a listener
    pub fn new(store: Arc<dyn ChainStore>, queue: ChainSender, active: Arc<ActiveChains>) -> Self {
        Self {
            store,
            queue,
            active,
        }
    }

    /// Handle signals until the store yields the shutdown sentinel
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Signal listener started");
        loop {
            let signal = self.store.wait_for_signal(&shutdown).await;
            if signal.is_shutdown() {
                break;
            }

            match signal.command {
                SignalCommand::Start => {
                    let chain = match self.store.select_chain_by_config(signal.config_id).await {
                        Ok(chain) => chain,
                        Err(e) => {
                            error!(config_id = signal.config_id, error = %e, "Cannot resolve signalled chain");
                            continue;
                        }
                    };

                    debug!(chain_id = chain.chain_id, "Putting signalled chain to the execution queue");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        sent = self.queue.send(chain) => {
                            if let Err(e) = sent {
                                error!(error = %e, "Cannot queue signalled chain");
                                break;
                            }
                        }
                    }
                }
                SignalCommand::Stop => {
                    if self.active.cancel(signal.config_id) {
                        info!(config_id = signal.config_id, "Running chain stopped");
                    } else {
                        debug!(config_id = signal.config_id, "Nothing running to stop");
                    }
                }
            }
        }
        info!("Signal listener stopped");
    }
}
