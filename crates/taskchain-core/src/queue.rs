//! Chain Execution Queue
//!
//! The single producer/consumer channel between the dispatch sources (signal
//! listener, poller) and the worker pool:
//! - Any number of producers, each delivering in its own FIFO order
//! - Any number of consumers; every chain is received exactly once
//! - Bounded, so producers wait when workers fall behind

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{ChainError, Result};
use crate::scheduler::Chain;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Bounded multi-producer, multi-consumer queue of chains
pub struct ChainQueue {
    sender: mpsc::Sender<Chain>,
    receiver: Arc<Mutex<mpsc::Receiver<Chain>>>,
}

impl ChainQueue {
    /// Create a queue holding at most `capacity` pending chains.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Handle for a producer.
    pub fn sender(&self) -> ChainSender {
        ChainSender {
            inner: self.sender.clone(),
        }
    }

    /// Handle for a consumer.
    pub fn receiver(&self) -> ChainReceiver {
        ChainReceiver {
            inner: Arc::clone(&self.receiver),
        }
    }
}

impl Default for ChainQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Producer side of the queue
#[derive(Clone)]
pub struct ChainSender {
    inner: mpsc::Sender<Chain>,
}

impl ChainSender {
    /// Push a chain, waiting for room if the queue is full.
    pub async fn send(&self, chain: Chain) -> Result<()> {
        let chain_id = chain.chain_id;
        self.inner
            .send(chain)
            .await
            .map_err(|_| ChainError::QueueClosed)?;
        debug!(chain_id, "Chain queued for execution");
        Ok(())
    }
}

/// Consumer side of the queue
#[derive(Clone)]
pub struct ChainReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Chain>>>,
}

impl ChainReceiver {
    /// Wait for the next chain. `None` once every sender is gone.
    ///
    /// Cancel-safe: a dropped call loses no chain.
    pub async fn recv(&self) -> Option<Chain> {
        let mut receiver = self.inner.lock().await;
        receiver.recv().await
    }
}
