//! Chain and element records
//!
//! Contains the passive data types exchanged between the dispatch sources,
//! the workers and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::{ChainError, Result};

/// One scheduled invocation of a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Chain {
    /// Identity of the scheduled chain entry
    pub chain_id: i64,
    /// Identity of the chain configuration; key of the active-chain registry
    pub task_id: i64,
    /// Human-readable chain name
    pub chain_name: String,
    /// Delete the configuration after one run
    pub self_destruct: bool,
    /// Run without any other chain alongside
    pub exclusive_execution: bool,
    /// Concurrency ceiling enforced by the store (`<= 0` means unlimited)
    pub max_instances: i64,
}

impl Chain {
    /// Create a non-exclusive, unlimited chain
    pub fn new(chain_id: i64, task_id: i64, chain_name: impl Into<String>) -> Self {
        Self {
            chain_id,
            task_id,
            chain_name: chain_name.into(),
            self_destruct: false,
            exclusive_execution: false,
            max_instances: 0,
        }
    }

    /// Set exclusive execution
    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive_execution = exclusive;
        self
    }

    /// Set self destruct
    pub fn with_self_destruct(mut self, self_destruct: bool) -> Self {
        self.self_destruct = self_destruct;
        self
    }

    /// Set the instance ceiling
    pub fn with_max_instances(mut self, max_instances: i64) -> Self {
        self.max_instances = max_instances;
        self
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "chain {}", self.chain_id),
        }
    }
}

/// Kind of work an element performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    /// Statement executed inside the chain transaction
    Sql,
    /// External program
    Program,
    /// Routine from the builtin registry
    Builtin,
}

impl TaskKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Sql => "SQL",
            TaskKind::Program => "PROGRAM",
            TaskKind::Builtin => "BUILTIN",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SQL" => Ok(TaskKind::Sql),
            "PROGRAM" => Ok(TaskKind::Program),
            "BUILTIN" => Ok(TaskKind::Builtin),
            other => Err(ChainError::InvalidData(format!("unknown task kind: {}", other))),
        }
    }
}

/// One step of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainElement {
    /// Element identity
    pub command_id: i64,
    /// Chain this element runs for; set by the executor
    pub chain_id: i64,
    /// Chain configuration the element belongs to
    pub task_id: i64,
    /// What the element does
    pub kind: TaskKind,
    /// Statement or program to run
    pub script: String,
    /// Builtin routine name
    pub command_name: String,
    /// Continue the chain when this element fails
    pub ignore_error: bool,
    /// When dispatch started
    pub started_at: Option<DateTime<Utc>>,
    /// Elapsed wall time in microseconds
    pub duration: i64,
}

impl ChainElement {
    /// Create an element of the given kind
    pub fn new(command_id: i64, task_id: i64, kind: TaskKind, script: impl Into<String>) -> Self {
        let script = script.into();
        Self {
            command_id,
            chain_id: 0,
            task_id,
            kind,
            command_name: if kind == TaskKind::Builtin {
                script.clone()
            } else {
                String::new()
            },
            script,
            ignore_error: false,
            started_at: None,
            duration: 0,
        }
    }

    /// Set ignore error
    pub fn with_ignore_error(mut self, ignore_error: bool) -> Self {
        self.ignore_error = ignore_error;
        self
    }
}

/// Command carried by an external signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalCommand {
    /// Run the referenced chain now
    Start,
    /// Cancel the running instance of the referenced chain
    Stop,
}

impl SignalCommand {
    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCommand::Start => "START",
            SignalCommand::Stop => "STOP",
        }
    }
}

impl fmt::Display for SignalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalCommand {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "START" => Ok(SignalCommand::Start),
            "STOP" => Ok(SignalCommand::Stop),
            other => Err(ChainError::InvalidData(format!("unknown signal command: {}", other))),
        }
    }
}

/// Event delivered by the store's signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSignal {
    /// What to do
    pub command: SignalCommand,
    /// Chain configuration the command refers to; zero means shutdown
    pub config_id: i64,
}

impl ChainSignal {
    /// Signal telling the listener to stop
    pub fn shutdown() -> Self {
        Self {
            command: SignalCommand::Stop,
            config_id: 0,
        }
    }

    /// Whether this is the shutdown sentinel
    pub fn is_shutdown(&self) -> bool {
        self.config_id == 0
    }
}

/// Status of an element or a chain within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Element dispatch began
    Started,
    /// Element (or chain) completed
    ChainDone,
    /// Element failed and aborted the chain
    ChainFailed,
}

impl RunStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "STARTED",
            RunStatus::ChainDone => "CHAIN_DONE",
            RunStatus::ChainFailed => "CHAIN_FAILED",
        }
    }

    /// Whether this status closes a chain run
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Started)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "STARTED" => Ok(RunStatus::Started),
            "CHAIN_DONE" => Ok(RunStatus::ChainDone),
            "CHAIN_FAILED" => Ok(RunStatus::ChainFailed),
            other => Err(ChainError::InvalidData(format!("unknown run status: {}", other))),
        }
    }
}

/// Identity of one chain execution, issued by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunStatusId(pub i64);

impl fmt::Display for RunStatusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a status row describes
#[derive(Debug, Clone, Copy)]
pub enum StatusSubject<'a> {
    /// A single element of the chain
    Element(&'a ChainElement),
    /// The chain as a whole
    Chain {
        /// Chain identity
        chain_id: i64,
        /// Configuration identity
        task_id: i64,
    },
}

impl StatusSubject<'_> {
    /// Chain identity of the subject
    pub fn chain_id(&self) -> i64 {
        match self {
            StatusSubject::Element(element) => element.chain_id,
            StatusSubject::Chain { chain_id, .. } => *chain_id,
        }
    }

    /// Configuration identity of the subject
    pub fn task_id(&self) -> i64 {
        match self {
            StatusSubject::Element(element) => element.task_id,
            StatusSubject::Chain { task_id, .. } => *task_id,
        }
    }

    /// Element identity, `None` for the chain itself
    pub fn command_id(&self) -> Option<i64> {
        match self {
            StatusSubject::Element(element) => Some(element.command_id),
            StatusSubject::Chain { .. } => None,
        }
    }
}

/// Outcome of dispatching one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Ran and returned zero
    Succeeded,
    /// Ran (or could not be prepared) and failed with this code
    Failed {
        /// Recorded result code, never zero
        code: i32,
    },
    /// Not run because its kind is disabled
    Skipped,
}

impl TaskOutcome {
    /// Whether the chain may continue past this element without `ignore_error`
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

/// How a chain run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRunResult {
    /// All elements completed; transaction committed
    Done,
    /// An element failed or the run was cancelled; transaction rolled back
    Failed,
    /// The run never started (no transaction or no elements); nothing recorded
    Abandoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_round_trip() {
        for kind in [TaskKind::Sql, TaskKind::Program, TaskKind::Builtin] {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
        assert!("SHELL".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_signal_command_parsing() {
        assert_eq!("START".parse::<SignalCommand>().unwrap(), SignalCommand::Start);
        assert_eq!(" stop ".parse::<SignalCommand>().unwrap(), SignalCommand::Stop);
        assert!("PAUSE".parse::<SignalCommand>().is_err());
    }

    #[test]
    fn test_shutdown_sentinel() {
        assert!(ChainSignal::shutdown().is_shutdown());
        let signal = ChainSignal {
            command: SignalCommand::Start,
            config_id: 7,
        };
        assert!(!signal.is_shutdown());
    }

    #[test]
    fn test_chain_display_is_json() {
        let chain = Chain::new(1, 2, "backup").with_exclusive(true);
        let rendered = chain.to_string();
        assert!(rendered.contains("\"chain_name\":\"backup\""));
        assert!(rendered.contains("\"exclusive_execution\":true"));
    }

    #[test]
    fn test_builtin_element_uses_script_as_name() {
        let element = ChainElement::new(1, 2, TaskKind::Builtin, "Sleep");
        assert_eq!(element.command_name, "Sleep");

        let element = ChainElement::new(1, 2, TaskKind::Sql, "SELECT 1");
        assert!(element.command_name.is_empty());
    }

    #[test]
    fn test_skipped_is_not_success() {
        assert!(TaskOutcome::Succeeded.is_success());
        assert!(!TaskOutcome::Skipped.is_success());
        assert!(!TaskOutcome::Failed { code: 1 }.is_success());
    }

    #[test]
    fn test_run_status_names() {
        assert_eq!(RunStatus::ChainFailed.to_string(), "CHAIN_FAILED");
        assert_eq!("CHAIN_DONE".parse::<RunStatus>().unwrap(), RunStatus::ChainDone);
        assert!(!RunStatus::Started.is_terminal());
    }
}
