//! Builtin task registry
//!
//! BUILTIN elements name a routine registered here. The registry ships with
//! `NoOp`, `Sleep` and `Log`; embedders can register their own.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{ChainError, Result};

/// A routine callable from a BUILTIN element
#[async_trait]
pub trait BuiltinTask: Send + Sync {
    /// Run with the element's parameter values, returning captured output
    async fn invoke(&self, params: &[String], cancel: &CancellationToken) -> Result<String>;
}

/// Name → routine lookup
#[derive(Clone)]
pub struct BuiltinRegistry {
    tasks: HashMap<String, Arc<dyn BuiltinTask>>,
}

impl BuiltinRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Create a registry with the default routines
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("NoOp", Arc::new(NoOp));
        registry.register("Sleep", Arc::new(Sleep));
        registry.register("Log", Arc::new(Log));
        registry
    }

    /// Register (or replace) a routine
    pub fn register(&mut self, name: impl Into<String>, task: Arc<dyn BuiltinTask>) {
        self.tasks.insert(name.into(), task);
    }

    /// Whether a routine is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Invoke a routine by name
    pub async fn invoke(
        &self,
        name: &str,
        params: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| ChainError::UnknownBuiltin(name.to_string()))?;
        task.invoke(params, cancel).await
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Does nothing
struct NoOp;

#[async_trait]
impl BuiltinTask for NoOp {
    async fn invoke(&self, _params: &[String], _cancel: &CancellationToken) -> Result<String> {
        Ok(String::new())
    }
}

/// Sleeps for the number of seconds in each parameter
struct Sleep;

#[async_trait]
impl BuiltinTask for Sleep {
    async fn invoke(&self, params: &[String], cancel: &CancellationToken) -> Result<String> {
        for raw in params {
            let secs: u64 = serde_json::from_str(raw.trim())?;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = cancel.cancelled() => return Err(ChainError::Cancelled),
            }
        }
        Ok(String::new())
    }
}

/// Writes each parameter to the log
struct Log;

#[async_trait]
impl BuiltinTask for Log {
    async fn invoke(&self, params: &[String], _cancel: &CancellationToken) -> Result<String> {
        for message in params {
            info!(message = %message, "Log task");
        }
        Ok(params.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routines() {
        let registry = BuiltinRegistry::new();
        assert!(registry.contains("NoOp"));
        assert!(registry.contains("Sleep"));
        assert!(registry.contains("Log"));
        assert!(!BuiltinRegistry::empty().contains("NoOp"));
    }

    #[tokio::test]
    async fn test_unknown_routine() {
        let registry = BuiltinRegistry::new();
        let err = registry
            .invoke("Shutdown", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::UnknownBuiltin(name) if name == "Shutdown"));
    }

    #[tokio::test]
    async fn test_log_returns_messages() {
        let registry = BuiltinRegistry::new();
        let params = vec!["hello".to_string(), "world".to_string()];
        let out = registry
            .invoke("Log", &params, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, "hello\nworld");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cancellable() {
        let registry = BuiltinRegistry::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = registry
            .invoke("Sleep", &["60".to_string()], &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Cancelled));
    }

    #[tokio::test]
    async fn test_sleep_rejects_bad_parameter() {
        let registry = BuiltinRegistry::new();
        let result = registry
            .invoke("Sleep", &["soon".to_string()], &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ChainError::Serialization(_))));
    }
}
