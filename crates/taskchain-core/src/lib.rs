//! Taskchain Core - Chain Scheduling Engine
//!
//! This crate runs chains of SQL, program and builtin tasks against a
//! persistent job store, including:
//! - Scheduler: poller, signal listener, worker pool and chain execution
//! - Store: the job store interface and its SQLite implementation
//! - Tasks: external program runner and builtin routines
//! - Queue: the bounded execution queue between sources and workers
//! - Shutdown: process signal handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod queue;
pub mod scheduler;
pub mod shutdown;
pub mod store;
pub mod tasks;

pub use error::{ChainError, Result, FAILURE_CODE};
pub use queue::{ChainQueue, ChainReceiver, ChainSender};
pub use scheduler::{
    Chain, ChainElement, ChainRunResult, ChainSignal, RunStatus, RunStatusId, Scheduler,
    SchedulerBuilder, SchedulerConfig, SignalCommand, StatusSubject, TaskKind, TaskOutcome,
};
pub use store::{ChainStore, SqliteChainStore, StoreTransaction};
pub use tasks::{BuiltinRegistry, BuiltinTask, CommandRunner, ProgramRunner};
