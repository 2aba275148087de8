//! Scheduler engine
//!
//! Wires the dispatch sources, the execution queue and the worker pool:
//! - Reboot pass once at startup, then a poll every refetch interval
//! - Signal listener for START/STOP
//! - Graceful shutdown with a drain timeout

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::dispatcher::TaskDispatcher;
use super::executor::ChainExecutor;
use super::listener::SignalListener;
use super::lock::ExecutionLock;
use super::poller::Poller;
use super::registry::ActiveChains;
use super::worker::WorkerPool;
use crate::error::{ChainError, Result};
use crate::queue::{ChainQueue, DEFAULT_QUEUE_CAPACITY};
use crate::store::ChainStore;
use crate::tasks::{BuiltinRegistry, CommandRunner, ProgramRunner};

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of chain workers
    pub workers: usize,
    /// Poll period in seconds; also the window large batches are spread over
    pub refetch_interval_secs: u64,
    /// Execution queue bound
    pub queue_capacity: usize,
    /// Refuse to run PROGRAM elements
    pub no_program_tasks: bool,
    /// How long shutdown waits for running chains
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 16,
            refetch_interval_secs: 60,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            no_program_tasks: false,
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set refetch interval
    pub fn with_refetch_interval(mut self, secs: u64) -> Self {
        self.refetch_interval_secs = secs;
        self
    }

    /// Set queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Disable PROGRAM elements
    pub fn with_no_program_tasks(mut self, disabled: bool) -> Self {
        self.no_program_tasks = disabled;
        self
    }

    /// Set shutdown drain timeout
    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ChainError::InvalidConfig("workers must be positive".to_string()));
        }
        if self.refetch_interval_secs == 0 {
            return Err(ChainError::InvalidConfig(
                "refetch interval must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ChainError::InvalidConfig(
                "queue capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Task-chain scheduler
pub struct Scheduler {
    store: Arc<dyn ChainStore>,
    config: SchedulerConfig,
    active: Arc<ActiveChains>,
    pool: Arc<WorkerPool>,
}

impl Scheduler {
    /// Start building a scheduler
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    /// Registry of running chains
    pub fn active_chains(&self) -> &Arc<ActiveChains> {
        &self.active
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!(
            workers = self.config.workers,
            refetch_interval_secs = self.config.refetch_interval_secs,
            "Scheduler starting"
        );

        if let Err(e) = self.store.close_abandoned_runs().await {
            warn!(error = %e, "Failed to close abandoned runs");
        }

        let queue = ChainQueue::new(self.config.queue_capacity);
        let workers = self
            .pool
            .spawn(self.config.workers, queue.receiver(), shutdown.clone());

        let listener = SignalListener::new(
            Arc::clone(&self.store),
            queue.sender(),
            Arc::clone(&self.active),
        );
        let listener_shutdown = shutdown.clone();
        let listener = tokio::spawn(async move { listener.run(listener_shutdown).await });

        let poller = Poller::new(
            Arc::clone(&self.store),
            queue.sender(),
            self.config.workers,
            self.config.refetch_interval_secs,
        );
        let interval = Duration::from_secs(self.config.refetch_interval_secs);

        let mut reboot = true;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = poller.poll(reboot) => {}
            }
            if reboot {
                reboot = false;
                continue;
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Scheduler shutting down");
        drop(poller);
        drop(queue);

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        let drain = async {
            if let Err(e) = listener.await {
                warn!(error = %e, "Signal listener ended abnormally");
            }
            for worker in workers {
                if let Err(e) = worker.await {
                    warn!(error = %e, "Worker ended abnormally");
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                running = self.active.len(),
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout exceeded"
            );
        }

        info!("Scheduler stopped");
        Ok(())
    }
}

/// Builder for creating a Scheduler
pub struct SchedulerBuilder {
    store: Option<Arc<dyn ChainStore>>,
    config: SchedulerConfig,
    programs: Option<Arc<dyn ProgramRunner>>,
    builtins: Option<BuiltinRegistry>,
    active: Option<Arc<ActiveChains>>,
    lock: Option<ExecutionLock>,
}

impl SchedulerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            store: None,
            config: SchedulerConfig::default(),
            programs: None,
            builtins: None,
            active: None,
            lock: None,
        }
    }

    /// Set the store
    pub fn store(mut self, store: Arc<dyn ChainStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the program runner (defaults to [`CommandRunner`])
    pub fn programs(mut self, programs: Arc<dyn ProgramRunner>) -> Self {
        self.programs = Some(programs);
        self
    }

    /// Set the builtin registry (defaults to [`BuiltinRegistry::new`])
    pub fn builtins(mut self, builtins: BuiltinRegistry) -> Self {
        self.builtins = Some(builtins);
        self
    }

    /// Share an active-chain registry
    pub fn active_chains(mut self, active: Arc<ActiveChains>) -> Self {
        self.active = Some(active);
        self
    }

    /// Share an execution lock
    pub fn lock(mut self, lock: ExecutionLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Build the scheduler
    pub fn build(self) -> Result<Scheduler> {
        let store = self
            .store
            .ok_or_else(|| ChainError::InvalidConfig("Store is required".to_string()))?;
        self.config.validate()?;

        let programs = self
            .programs
            .unwrap_or_else(|| Arc::new(CommandRunner::new()));
        let builtins = Arc::new(self.builtins.unwrap_or_default());
        let active = self.active.unwrap_or_else(ActiveChains::new);

        let dispatcher = TaskDispatcher::new(
            Arc::clone(&store),
            programs,
            builtins,
            self.config.no_program_tasks,
        );
        let executor = Arc::new(ChainExecutor::new(Arc::clone(&store), dispatcher));
        let pool = WorkerPool::new(
            Arc::clone(&store),
            executor,
            self.lock.unwrap_or_default(),
            Arc::clone(&active),
        );

        Ok(Scheduler {
            store,
            config: self.config,
            active,
            pool,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
