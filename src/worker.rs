//! Worker retry state machine.
//!
//! Turns one task description into a verified executable result through a
//! bounded generate/execute/diagnose loop:
//!
//! ```text
//! GENERATE ──> EXECUTE ──ok──> SUCCESS
//!    ▲            │
//!    │          fail
//!    │            ▼
//!    └──── ANALYZE_FAILURE        (bounded by max_attempts)
//! ```
//!
//! Collaborator failures are data, not exceptions: an unavailable generator
//! yields a sentinel failure string and the state machine keeps its retry
//! accounting deterministic. Repair context accumulates as a bounded list
//! of prior attempts, not as unbounded prompt-text growth.

use crate::collab::cleaning::strip_code_fences;
use crate::collab::{CommandExecutor, Generator, PayloadKind};
use crate::config::EngineConfig;
use crate::task::ExecutionResult;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sentinel returned when the generation collaborator has no transport.
pub const GENERATION_UNAVAILABLE: &str = "error: generation collaborator unavailable";

/// Sentinel returned when the analysis collaborator has no transport.
pub const ANALYSIS_UNAVAILABLE: &str = "error: analysis collaborator unavailable";

/// How many prior attempts are carried as repair context.
const MAX_REPAIR_CONTEXT: usize = 3;

const CODER_PROMPT: &str = "You are the coder of a software delivery pipeline. Generate a \
complete, executable script or a single shell command for the task below. Reply with the code \
or command only, no explanation.";

const DIAGNOSE_PROMPT: &str = "You are the tech lead of a software delivery pipeline. The code \
below failed. Identify the cause and reply with a concise fix suggestion only.";

/// A generated payload with its execution tag, decided once at generation
/// time.
#[derive(Debug, Clone)]
pub struct GeneratedPayload {
    pub kind: PayloadKind,
    pub payload: String,
}

/// One failed attempt carried forward as repair context.
#[derive(Debug, Clone)]
pub struct RepairAttempt {
    pub code: String,
    pub error: String,
    pub suggestion: String,
}

/// Terminal outcome of one worker run.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    pub success: bool,
    /// Captured stdout of the passing attempt.
    pub output: String,
    /// Last error text when the retry budget is exhausted.
    pub error: String,
    /// The code of the passing attempt, or the last failing attempt.
    pub code: String,
    /// Attempts consumed (1-indexed; equals `max_attempts` on failure).
    pub attempts: u32,
}

impl WorkerOutcome {
    /// Render the outcome as the execution-log string handed to the
    /// audit collaborator.
    #[must_use]
    pub fn execution_log(&self) -> String {
        if self.success {
            format!(
                "Execution succeeded.\nOutput:\n{}\nCode:\n{}",
                self.output, self.code
            )
        } else {
            format!(
                "Execution failed.\nError:\n{}\nCode:\n{}",
                self.error, self.code
            )
        }
    }
}

/// Detect an install command inside a fix suggestion.
///
/// Returns the matched command line when the suggestion contains a
/// package-install instruction the controller may run as a pre-step.
#[must_use]
pub fn detect_install_command(suggestion: &str) -> Option<String> {
    // Compiled per call; suggestions arrive at human cadence.
    let pattern = Regex::new(
        r"(?m)^\s*((?:sudo\s+)?(?:pip3?\s+install|apt(?:-get)?\s+install(?:\s+-y)?|cargo\s+add|npm\s+install)\s+\S.*)$",
    )
    .expect("install pattern is valid");
    pattern
        .captures(suggestion)
        .map(|caps| caps[1].trim().to_string())
}

/// Bounded-retry worker that generates, executes, and repairs one task.
pub struct Worker {
    generator: Arc<dyn Generator>,
    executor: Arc<dyn CommandExecutor>,
    config: EngineConfig,
}

impl Worker {
    /// Create a worker over the given collaborators.
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generator>,
        executor: Arc<dyn CommandExecutor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            generator,
            executor,
            config,
        }
    }

    /// Run the full state machine for one task description.
    ///
    /// Returns success on the first passing execution; returns failure with
    /// the last code/error pair once the retry budget is exhausted. Never
    /// retries unboundedly.
    pub async fn run(&self, description: &str) -> WorkerOutcome {
        info!(task = description, "worker starting");
        let mut repairs: Vec<RepairAttempt> = Vec::new();
        let mut last_code = String::new();
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            debug!(attempt, max = self.config.max_attempts, "worker attempt");

            let result = match self.generate(description, &repairs).await {
                Ok(generated) => {
                    self.executor
                        .execute(&generated.payload, generated.kind, self.config.task_timeout())
                        .await
                }
                Err(sentinel) => {
                    // Treated as a failed attempt so retry accounting
                    // stays deterministic.
                    ExecutionResult::failure("", sentinel, Duration::ZERO)
                }
            };

            if result.success {
                info!(attempt, "worker succeeded");
                return WorkerOutcome {
                    success: true,
                    output: result.output,
                    error: String::new(),
                    code: result.code,
                    attempts: attempt,
                };
            }

            warn!(attempt, error = %result.error, "attempt failed");
            last_code = result.code.clone();
            last_error = result.error.clone();

            if attempt == self.config.max_attempts {
                break;
            }

            let suggestion = self.diagnose(description, &result.code, &result.error).await;

            if let Some(install) = detect_install_command(&suggestion) {
                info!(command = %install, "running install pre-step");
                let install_result = self
                    .executor
                    .execute(&install, PayloadKind::Command, self.config.install_timeout())
                    .await;
                if !install_result.success {
                    // Best effort only; the retry proceeds regardless.
                    warn!(error = %install_result.error, "install pre-step failed");
                }
            }

            repairs.push(RepairAttempt {
                code: result.code,
                error: result.error,
                suggestion,
            });
            if repairs.len() > MAX_REPAIR_CONTEXT {
                repairs.remove(0);
            }
        }

        info!(attempts = self.config.max_attempts, "worker exhausted retries");
        WorkerOutcome {
            success: false,
            output: String::new(),
            error: last_error,
            code: last_code,
            attempts: self.config.max_attempts,
        }
    }

    /// GENERATE state: produce a tagged payload, or a sentinel error string
    /// when the collaborator is unavailable.
    async fn generate(
        &self,
        description: &str,
        repairs: &[RepairAttempt],
    ) -> std::result::Result<GeneratedPayload, String> {
        let mut prompt = format!("{CODER_PROMPT}\n\nTask:\n{description}");
        for (i, repair) in repairs.iter().enumerate() {
            prompt.push_str(&format!(
                "\n\nPrior attempt {}:\nCode:\n{}\nError:\n{}\nFix suggestion:\n{}",
                i + 1,
                repair.code,
                repair.error,
                repair.suggestion
            ));
        }

        match self.generator.generate(&prompt).await {
            Ok(reply) => {
                let payload = strip_code_fences(&reply);
                let kind = PayloadKind::classify(&payload);
                debug!(%kind, chars = payload.len(), "generated payload");
                Ok(GeneratedPayload { kind, payload })
            }
            Err(e) => {
                warn!(error = %e, "generation collaborator unavailable");
                Err(GENERATION_UNAVAILABLE.to_string())
            }
        }
    }

    /// ANALYZE_FAILURE state: ask the analysis collaborator for a fix
    /// suggestion; sentinel text when unavailable.
    async fn diagnose(&self, description: &str, code: &str, error: &str) -> String {
        let context = format!(
            "{DIAGNOSE_PROMPT}\n\nTask:\n{description}\n\nCode:\n{code}\n\nError:\n{error}"
        );
        match self.generator.analyze(&context).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "analysis collaborator unavailable");
                ANALYSIS_UNAVAILABLE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockExecutor, MockGenerator};

    fn config_with_attempts(max_attempts: u32) -> EngineConfig {
        EngineConfig {
            max_attempts,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_passes_code_through() {
        let generator = Arc::new(MockGenerator::new().with_generate_response("print(1)"));
        let executor = Arc::new(MockExecutor::passing("1\n"));
        let worker = Worker::new(generator, executor.clone(), config_with_attempts(3));

        let outcome = worker.run("write a function returning 1").await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.code, "print(1)");
        assert_eq!(outcome.output, "1\n");
        assert_eq!(executor.executed_payloads(), vec!["print(1)".to_string()]);
    }

    #[tokio::test]
    async fn test_fenced_reply_is_stripped_before_execution() {
        let generator =
            Arc::new(MockGenerator::new().with_generate_response("```python\nprint(2)\n```"));
        let executor = Arc::new(MockExecutor::passing("2\n"));
        let worker = Worker::new(generator, executor.clone(), config_with_attempts(3));

        worker.run("print two").await;
        assert_eq!(executor.executed_payloads(), vec!["print(2)".to_string()]);
    }

    #[tokio::test]
    async fn test_retries_bounded_by_max_attempts() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_generate_response("boom()")
                .with_analyze_response("fix the call"),
        );
        let executor = Arc::new(MockExecutor::failing("NameError: boom"));
        let worker = Worker::new(generator.clone(), executor.clone(), config_with_attempts(3));

        let outcome = worker.run("impossible task").await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.error, "NameError: boom");
        assert_eq!(outcome.code, "boom()");
        // 3 generate calls; 2 diagnose calls (no diagnosis after the last attempt).
        assert_eq!(generator.generate_calls(), 3);
        assert_eq!(generator.analyze_calls(), 2);
    }

    #[tokio::test]
    async fn test_repair_context_reaches_next_generate_prompt() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_generate_responses(vec!["bad_code()", "print(1)"])
                .with_analyze_response("define the function first"),
        );
        let executor = Arc::new(MockExecutor::with_results(vec![
            ExecutionResult::failure("bad_code()", "NameError", Duration::ZERO),
            ExecutionResult::success("print(1)", "1\n", Duration::ZERO),
        ]));
        let worker = Worker::new(generator.clone(), executor, config_with_attempts(3));

        let outcome = worker.run("print one").await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);

        let prompts = generator.generate_prompts();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("Prior attempt"));
        assert!(prompts[1].contains("Prior attempt 1"));
        assert!(prompts[1].contains("define the function first"));
        assert!(prompts[1].contains("NameError"));
    }

    #[tokio::test]
    async fn test_repair_context_is_bounded() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_generate_response("boom()")
                .with_analyze_response("try again"),
        );
        let executor = Arc::new(MockExecutor::failing("still broken"));
        let worker = Worker::new(generator.clone(), executor, config_with_attempts(6));

        worker.run("impossible").await;
        let prompts = generator.generate_prompts();
        let last = prompts.last().unwrap();
        // Only the bounded window of prior attempts is rendered.
        assert!(last.contains("Prior attempt 3"));
        assert!(!last.contains("Prior attempt 4"));
    }

    #[tokio::test]
    async fn test_install_suggestion_triggers_pre_step() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_generate_responses(vec!["import requests", "import requests"])
                .with_analyze_response("The module is missing.\npip install requests"),
        );
        let executor = Arc::new(MockExecutor::with_results(vec![
            ExecutionResult::failure("import requests", "ModuleNotFoundError", Duration::ZERO),
            // Install pre-step result.
            ExecutionResult::success("pip install requests", "installed", Duration::ZERO),
            ExecutionResult::success("import requests", "", Duration::ZERO),
        ]));
        let worker = Worker::new(generator, executor.clone(), config_with_attempts(3));

        let outcome = worker.run("fetch a url").await;
        assert!(outcome.success);
        let payloads = executor.executed_payloads();
        assert_eq!(payloads[1], "pip install requests");
    }

    #[tokio::test]
    async fn test_failed_install_does_not_abort_retry() {
        let generator = Arc::new(
            MockGenerator::new()
                .with_generate_responses(vec!["import requests", "print(1)"])
                .with_analyze_response("pip install requests"),
        );
        let executor = Arc::new(MockExecutor::with_results(vec![
            ExecutionResult::failure("import requests", "ModuleNotFoundError", Duration::ZERO),
            ExecutionResult::failure("pip install requests", "no network", Duration::ZERO),
            ExecutionResult::success("print(1)", "1\n", Duration::ZERO),
        ]));
        let worker = Worker::new(generator, executor, config_with_attempts(3));

        let outcome = worker.run("fetch a url").await;
        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_unavailable_generator_fails_after_budget() {
        let generator = Arc::new(MockGenerator::new().with_error("no client configured"));
        let executor = Arc::new(MockExecutor::passing("unused"));
        let worker = Worker::new(generator, executor.clone(), config_with_attempts(2));

        let outcome = worker.run("anything").await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error, GENERATION_UNAVAILABLE);
        // The sentinel never reaches the executor.
        assert!(executor.executed_payloads().is_empty());
    }

    #[test]
    fn test_detect_install_command() {
        assert_eq!(
            detect_install_command("The module is missing.\npip install requests"),
            Some("pip install requests".to_string())
        );
        assert_eq!(
            detect_install_command("sudo apt-get install -y jq"),
            Some("sudo apt-get install -y jq".to_string())
        );
        assert_eq!(
            detect_install_command("cargo add serde"),
            Some("cargo add serde".to_string())
        );
        assert!(detect_install_command("just fix the typo in line 3").is_none());
        assert!(detect_install_command("you could install more RAM").is_none());
    }

    #[test]
    fn test_execution_log_rendering() {
        let ok = WorkerOutcome {
            success: true,
            output: "1\n".to_string(),
            error: String::new(),
            code: "print(1)".to_string(),
            attempts: 1,
        };
        assert!(ok.execution_log().contains("succeeded"));
        assert!(ok.execution_log().contains("print(1)"));

        let bad = WorkerOutcome {
            success: false,
            output: String::new(),
            error: "NameError".to_string(),
            code: "boom()".to_string(),
            attempts: 3,
        };
        assert!(bad.execution_log().contains("failed"));
        assert!(bad.execution_log().contains("NameError"));
    }
}
