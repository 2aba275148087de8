//! Application configuration
//!
//! Contains the configuration structures for the taskchain binary.

mod loader;

pub use loader::load_config;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use taskchain_core::SchedulerConfig;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerAppConfig,
}

/// SQLite locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Chain catalog: configurations, tasks, parameters, signals
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Run journal: run statuses and execution log
    #[serde(default = "default_journal_path")]
    pub journal_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            journal_path: default_journal_path(),
        }
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("data/taskchain.db")
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("data/taskchain-journal.db")
}

/// Scheduler configuration (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerAppConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_refetch_interval")]
    pub refetch_interval_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub no_program_tasks: bool,
    #[serde(default = "default_signal_poll_interval")]
    pub signal_poll_interval_ms: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerAppConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            refetch_interval_secs: default_refetch_interval(),
            queue_capacity: default_queue_capacity(),
            no_program_tasks: false,
            signal_poll_interval_ms: default_signal_poll_interval(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SchedulerAppConfig {
    /// Engine settings for this configuration
    pub fn engine_config(&self) -> SchedulerConfig {
        SchedulerConfig::new()
            .with_workers(self.workers)
            .with_refetch_interval(self.refetch_interval_secs)
            .with_queue_capacity(self.queue_capacity)
            .with_no_program_tasks(self.no_program_tasks)
            .with_shutdown_timeout(self.shutdown_timeout_secs)
    }

    pub fn signal_poll_interval(&self) -> Duration {
        Duration::from_millis(self.signal_poll_interval_ms)
    }
}

fn default_workers() -> usize {
    16
}

fn default_refetch_interval() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    16
}

fn default_signal_poll_interval() -> u64 {
    500
}

fn default_shutdown_timeout() -> u64 {
    30
}
