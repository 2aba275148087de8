//! External program execution
//!
//! Each parameter value of a PROGRAM element is a JSON array of string
//! arguments. The program runs once per parameter set (once without
//! arguments when there are none) and stops at the first non-zero exit.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{ChainError, Result};

/// Collaborator that runs external programs
#[async_trait]
pub trait ProgramRunner: Send + Sync {
    /// Run `script` with the element's parameter values.
    ///
    /// Returns the combined output on success. A non-zero exit is reported as
    /// [`ChainError::ProgramFailed`] carrying the exit code. Honoring `cancel`
    /// is up to the implementation.
    async fn run(&self, script: &str, params: &[String], cancel: &CancellationToken)
        -> Result<String>;
}

/// Runs programs on the local host with `tokio::process`
#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    /// Create a runner
    pub fn new() -> Self {
        Self
    }

    async fn run_once(
        &self,
        script: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<(i32, String)> {
        let mut cmd = Command::new(script);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn()?;
        debug!(program = script, ?args, "Program started");

        // Dropping the wait future kills the child.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => return Err(ChainError::Cancelled),
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let code = output.status.code().unwrap_or(-1);
        Ok((code, combined))
    }
}

/// Decode one parameter value into program arguments
pub(crate) fn parse_args(raw: &str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

#[async_trait]
impl ProgramRunner for CommandRunner {
    async fn run(
        &self,
        script: &str,
        params: &[String],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let arg_sets = if params.is_empty() {
            vec![Vec::new()]
        } else {
            params
                .iter()
                .map(|raw| parse_args(raw))
                .collect::<Result<Vec<_>>>()?
        };

        let mut outputs = Vec::with_capacity(arg_sets.len());
        for args in arg_sets {
            let (code, out) = self.run_once(script, &args, cancel).await?;
            outputs.push(format!("{} {:?}: {}", script, args, out));
            if code != 0 {
                return Err(ChainError::ProgramFailed {
                    code,
                    output: outputs.join("\n"),
                });
            }
        }
        Ok(outputs.join("\n"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        assert!(parse_args("").unwrap().is_empty());
        assert_eq!(
            parse_args(r#"["-c", "exit 0"]"#).unwrap(),
            vec!["-c".to_string(), "exit 0".to_string()]
        );
        assert!(parse_args("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_runs_once_per_parameter_set() {
        let runner = CommandRunner::new();
        let params = vec![r#"["-c", "echo one"]"#.to_string(), r#"["-c", "echo two"]"#.to_string()];

        let out = runner
            .run("sh", &params, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.contains("one"));
        assert!(out.contains("two"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_stops_and_reports_code() {
        let runner = CommandRunner::new();
        let params = vec![
            r#"["-c", "echo first; exit 3"]"#.to_string(),
            r#"["-c", "echo never"]"#.to_string(),
        ];

        let err = runner
            .run("sh", &params, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ChainError::ProgramFailed { code, output } => {
                assert_eq!(code, 3);
                assert!(output.contains("first"));
                assert!(!output.contains("never"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = CommandRunner::new();
        let err = runner
            .run("/definitely/not/here", &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Io(_)));
    }

    #[tokio::test]
    async fn test_cancellation_kills_program() {
        let runner = CommandRunner::new();
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let params = vec![r#"["-c", "sleep 10"]"#.to_string()];
        let err = runner.run("sh", &params, &token).await.unwrap_err();
        assert!(matches!(err, ChainError::Cancelled));
    }
}
