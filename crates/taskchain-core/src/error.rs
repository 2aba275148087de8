//! Error types for taskchain-core
//!
//! Every fallible engine and collaborator operation returns [`ChainError`].
//! The engine itself rarely propagates these to a caller: failures surface
//! through logs and persisted run-status rows.

use thiserror::Error;

/// Result code recorded for an element that failed without a code of its own.
pub const FAILURE_CODE: i32 = -1;

/// Core error type
#[derive(Debug, Error)]
pub enum ChainError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (spawning programs, creating directories)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// No chain configuration matches the given id
    #[error("chain not found for configuration {0}")]
    ChainNotFound(i64),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Stored value could not be interpreted
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// No builtin task is registered under this name
    #[error("unknown builtin task: {0}")]
    UnknownBuiltin(String),

    /// External program exited with a non-zero code
    #[error("program exited with code {code}")]
    ProgramFailed {
        /// Exit code reported by the program
        code: i32,
        /// Combined output captured before the failure
        output: String,
    },

    /// Task execution failed
    #[error("execution error: {0}")]
    Execution(String),

    /// Execution was cancelled by a STOP signal or shutdown
    #[error("chain execution cancelled")]
    Cancelled,

    /// The execution queue has no remaining consumers
    #[error("execution queue closed")]
    QueueClosed,
}

impl ChainError {
    /// Result code this error should be recorded with.
    ///
    /// Program failures keep their exit code; everything else maps to
    /// [`FAILURE_CODE`].
    pub fn result_code(&self) -> i32 {
        match self {
            ChainError::ProgramFailed { code, .. } if *code != 0 => *code,
            _ => FAILURE_CODE,
        }
    }

    /// Output captured before the error, if any.
    pub fn partial_output(&self) -> &str {
        match self {
            ChainError::ProgramFailed { output, .. } => output,
            _ => "",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ChainError>;
