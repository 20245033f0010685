//! Subprocess-backed execution collaborator.
//!
//! Runs generated payloads with a bounded timeout and combined output
//! capture. A hung process never blocks the pipeline: on timeout the
//! child is killed and a failed [`ExecutionResult`] is returned.

use crate::collab::{CommandExecutor, PayloadKind};
use crate::task::ExecutionResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// Executes scripts through an interpreter and commands through `sh -c`,
/// in a fixed working directory.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// Working directory for spawned processes.
    working_dir: PathBuf,
    /// Interpreter for [`PayloadKind::Script`] payloads.
    interpreter: String,
}

impl ShellExecutor {
    /// Create an executor rooted at the given directory.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(working_dir: P) -> Self {
        Self {
            working_dir: working_dir.into(),
            interpreter: "python3".to_string(),
        }
    }

    /// Override the script interpreter.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: &str) -> Self {
        self.interpreter = interpreter.to_string();
        self
    }

    fn command_for(&self, payload: &str, kind: PayloadKind) -> AsyncCommand {
        let mut cmd = match kind {
            PayloadKind::Script => {
                let mut cmd = AsyncCommand::new(&self.interpreter);
                cmd.arg("-c").arg(payload);
                cmd
            }
            PayloadKind::Command => {
                let mut cmd = AsyncCommand::new("sh");
                cmd.arg("-c").arg(payload);
                cmd
            }
        };
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(
        &self,
        payload: &str,
        kind: PayloadKind,
        timeout: Duration,
    ) -> ExecutionResult {
        debug!(%kind, timeout_secs = timeout.as_secs(), "executing payload");
        let started = Instant::now();

        let child = match self.command_for(payload, kind).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "failed to spawn process");
                return ExecutionResult::failure(
                    payload,
                    format!("failed to spawn process: {e}"),
                    started.elapsed(),
                );
            }
        };

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let elapsed = started.elapsed();
                if output.status.success() {
                    ExecutionResult::success(payload, stdout, elapsed)
                } else {
                    let mut result = ExecutionResult::failure(payload, stderr, elapsed);
                    result.output = stdout;
                    result.metadata.insert(
                        "return_code".to_string(),
                        serde_json::json!(output.status.code()),
                    );
                    result
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "process wait failed");
                ExecutionResult::failure(payload, e.to_string(), started.elapsed())
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "execution timed out");
                ExecutionResult::failure(
                    payload,
                    format!("execution timed out after {}s", timeout.as_secs()),
                    started.elapsed(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> ShellExecutor {
        ShellExecutor::new(".")
    }

    #[tokio::test]
    async fn test_command_success_captures_stdout() {
        let result = executor()
            .execute("echo hello", PayloadKind::Command, Duration::from_secs(5))
            .await;
        assert!(result.success);
        assert_eq!(result.output.trim(), "hello");
        assert!(result.error.is_empty());
        assert_eq!(result.code, "echo hello");
    }

    #[tokio::test]
    async fn test_command_failure_captures_stderr_and_code() {
        let result = executor()
            .execute(
                "echo oops >&2; exit 3",
                PayloadKind::Command,
                Duration::from_secs(5),
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error.trim(), "oops");
        assert_eq!(result.metadata["return_code"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn test_timeout_is_failed_result_not_error() {
        let result = executor()
            .execute("sleep 5", PayloadKind::Command, Duration::from_millis(100))
            .await;
        assert!(!result.success);
        assert!(result.error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_script_runs_through_interpreter() {
        // `sh` stands in for a real interpreter so the test has no
        // python dependency; `-c` semantics are identical.
        let result = ShellExecutor::new(".")
            .with_interpreter("sh")
            .execute("echo scripted", PayloadKind::Script, Duration::from_secs(5))
            .await;
        assert!(result.success);
        assert_eq!(result.output.trim(), "scripted");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_failed_result() {
        let result = ShellExecutor::new(".")
            .with_interpreter("definitely-not-a-real-interpreter")
            .execute("print(1)", PayloadKind::Script, Duration::from_secs(5))
            .await;
        assert!(!result.success);
        assert!(result.error.contains("failed to spawn"));
    }
}
