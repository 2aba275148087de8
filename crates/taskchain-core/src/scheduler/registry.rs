//! Active-chain registry
//!
//! Maps a chain configuration id to the cancellation token of its running
//! instances. A STOP signal can only reach a chain through this map.
//!
//! There is at most one entry per configuration id. Instances of the same
//! configuration running side by side share the entry; each holds a child
//! token, so a STOP cancels all of them while a finishing instance only
//! cancels its own.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct ActiveEntry {
    generation: u64,
    token: CancellationToken,
    holders: usize,
}

/// Registry of running chain configurations
#[derive(Default)]
pub struct ActiveChains {
    chains: DashMap<i64, ActiveEntry>,
    generations: AtomicU64,
}

impl ActiveChains {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a starting instance of `config_id`.
    ///
    /// The returned guard owns the instance's token and deregisters on drop.
    pub fn register(self: &Arc<Self>, config_id: i64, parent: &CancellationToken) -> ActiveChainGuard {
        let mut entry = self.chains.entry(config_id).or_insert_with(|| ActiveEntry {
            generation: self.generations.fetch_add(1, Ordering::Relaxed),
            token: parent.child_token(),
            holders: 0,
        });
        entry.holders += 1;
        let guard = ActiveChainGuard {
            registry: Arc::clone(self),
            config_id,
            generation: entry.generation,
            token: entry.token.child_token(),
        };
        drop(entry);

        debug!(config_id, "Chain registered as active");
        guard
    }

    /// Cancel every running instance of `config_id`.
    ///
    /// Returns `false` when nothing is registered under that id.
    pub fn cancel(&self, config_id: i64) -> bool {
        match self.chains.remove(&config_id) {
            Some((_, entry)) => {
                entry.token.cancel();
                debug!(config_id, "Active chain cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether `config_id` has a running instance
    pub fn contains(&self, config_id: i64) -> bool {
        self.chains.contains_key(&config_id)
    }

    /// Number of registered configurations
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether nothing is running
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    fn release(&self, config_id: i64, generation: u64) {
        if let Some(mut entry) = self.chains.get_mut(&config_id) {
            if entry.generation == generation {
                entry.holders = entry.holders.saturating_sub(1);
            }
        }
        self.chains
            .remove_if(&config_id, |_, e| e.generation == generation && e.holders == 0);
    }
}

/// Registration of one running chain instance
pub struct ActiveChainGuard {
    registry: Arc<ActiveChains>,
    config_id: i64,
    generation: u64,
    token: CancellationToken,
}

impl ActiveChainGuard {
    /// Token the chain run must observe
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for ActiveChainGuard {
    fn drop(&mut self) {
        self.registry.release(self.config_id, self.generation);
        self.token.cancel();
    }
}
