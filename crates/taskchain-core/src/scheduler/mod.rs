//! Chain scheduler
//!
//! Chains arrive from two sources and are executed by a fixed worker pool:
//!
//! - **Poller**: due chains every refetch interval, reboot chains once
//! - **Signal listener**: START queues a chain, STOP cancels a running one
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐
//! │  Poller  │   │ SignalListener │
//! └────┬─────┘   └───────┬────────┘
//!      │                 │  STOP ──► ActiveChains
//!      ▼                 ▼
//! ┌────────────────────────────────┐
//! │           ChainQueue           │  Bounded FIFO
//! └───────────────┬────────────────┘
//!                 ▼
//! ┌────────────────────────────────┐
//! │           WorkerPool           │  Admission, ExecutionLock
//! └───────────────┬────────────────┘
//!                 ▼
//! ┌────────────────────────────────┐
//! │ ChainExecutor → TaskDispatcher │  One transaction per run
//! └────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use taskchain_core::scheduler::{Scheduler, SchedulerConfig};
//! use taskchain_core::store::SqliteChainStore;
//!
//! let store = SqliteChainStore::from_paths(&catalog, &journal).await?;
//! let scheduler = Scheduler::builder()
//!     .store(Arc::new(store))
//!     .config(SchedulerConfig::new().with_workers(4))
//!     .build()?;
//!
//! scheduler.run(shutdown_token).await?;
//! ```

mod dispatcher;
mod engine;
mod executor;
mod listener;
mod lock;
mod poller;
mod registry;
mod types;
mod worker;

pub use dispatcher::TaskDispatcher;
pub use engine::{Scheduler, SchedulerBuilder, SchedulerConfig};
pub use executor::ChainExecutor;
pub use listener::SignalListener;
pub use lock::{ExecutionGuard, ExecutionLock};
pub use poller::{throttle_delay, Poller};
pub use registry::{ActiveChainGuard, ActiveChains};
pub use types::{
    Chain, ChainElement, ChainRunResult, ChainSignal, RunStatus, RunStatusId, SignalCommand,
    StatusSubject, TaskKind, TaskOutcome,
};
pub use worker::WorkerPool;
