//! Exclusive / non-exclusive execution lock
//!
//! A single readers-writer lock shared by every worker. Exclusive chains take
//! it as writers and run alone; other chains take it as readers and run
//! alongside each other. Held for the whole chain run.

use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Process-wide chain execution lock
#[derive(Debug, Clone, Default)]
pub struct ExecutionLock {
    inner: Arc<RwLock<()>>,
}

/// Held while a chain runs; releases the lock when dropped
#[derive(Debug)]
pub enum ExecutionGuard {
    /// Writer mode
    Exclusive(OwnedRwLockWriteGuard<()>),
    /// Reader mode
    Shared(OwnedRwLockReadGuard<()>),
}

impl ExecutionGuard {
    /// Whether the guard excludes every other chain
    pub fn is_exclusive(&self) -> bool {
        matches!(self, ExecutionGuard::Exclusive(_))
    }
}

impl ExecutionLock {
    /// Create an unlocked lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock in the mode the chain asks for.
    ///
    /// Waiters are served in order, so a waiting exclusive chain holds back
    /// readers that arrive after it.
    pub async fn acquire(&self, exclusive: bool) -> ExecutionGuard {
        if exclusive {
            ExecutionGuard::Exclusive(Arc::clone(&self.inner).write_owned().await)
        } else {
            ExecutionGuard::Shared(Arc::clone(&self.inner).read_owned().await)
        }
    }
}
