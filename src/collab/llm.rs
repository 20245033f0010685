//! LLM-backed collaborator implementations.
//!
//! [`CliGenerator`] shells out to a configurable LLM CLI, piping the prompt
//! over stdin. [`LlmPlanner`] and [`LlmAuditor`] are role adapters over any
//! [`Generator`]: they format the role prompt, parse the structured reply
//! defensively, and honor the no-throw contracts by degrading malformed or
//! unavailable replies to an empty plan or a FAIL verdict.

use crate::collab::cleaning::{extract_json, strip_code_fences};
use crate::collab::{Auditor, Generator, PlannedTask, Planner, PostMortem};
use crate::config::LlmCliConfig;
use crate::task::{AuditResult, Task};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

const PLANNER_PROMPT: &str = "You are the project planner of a software delivery pipeline. \
Break the requirement into small executable tasks. Reply with a JSON array only; each element \
has \"id\", \"description\" and \"priority\" (high, medium or low). Order the array by intended \
execution order.";

const AUDITOR_PROMPT: &str = "You are the auditor of a software delivery pipeline. Judge \
whether the execution log shows the task was accomplished. Reply with a JSON object only: \
{\"status\": \"PASS\" or \"FAIL\", \"feedback\": \"...\"}.";

/// Generation collaborator backed by an external LLM CLI.
#[derive(Debug, Clone)]
pub struct CliGenerator {
    config: LlmCliConfig,
    working_dir: PathBuf,
}

impl CliGenerator {
    /// Create a generator for the given CLI configuration.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(config: LlmCliConfig, working_dir: P) -> Self {
        Self {
            config,
            working_dir: working_dir.into(),
        }
    }

    /// Whether the configured CLI binary is on `PATH`.
    #[must_use]
    pub fn is_available(&self) -> bool {
        which::which(&self.config.command).is_ok()
    }

    /// Model label used in logs.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn run_cli(&self, prompt: &str) -> anyhow::Result<String> {
        if !self.is_available() {
            anyhow::bail!("LLM CLI '{}' not found on PATH", self.config.command);
        }

        debug!(
            model = %self.config.model,
            prompt_chars = prompt.len(),
            "invoking LLM CLI"
        );

        let mut child = AsyncCommand::new(&self.config.command)
            .args(&self.config.args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.flush().await?;
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            anyhow::bail!(
                "LLM CLI exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            )
        }
    }
}

#[async_trait]
impl Generator for CliGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.run_cli(prompt).await
    }

    async fn analyze(&self, context: &str) -> anyhow::Result<String> {
        self.run_cli(context).await
    }
}

/// Planning collaborator adapter over a [`Generator`].
pub struct LlmPlanner {
    generator: Arc<dyn Generator>,
}

impl LlmPlanner {
    /// Create a planner over the given generator.
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    fn parse_tasks(reply: &str) -> Vec<PlannedTask> {
        let Some(json) = extract_json(reply) else {
            warn!("planner reply carried no JSON payload");
            return Vec::new();
        };
        match serde_json::from_str::<Vec<PlannedTask>>(&json) {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "planner reply was not a valid task list");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, requirement: &str) -> Vec<PlannedTask> {
        let prompt = format!("{PLANNER_PROMPT}\n\nRequirement:\n{requirement}");
        match self.generator.generate(&prompt).await {
            Ok(reply) => Self::parse_tasks(&reply),
            Err(e) => {
                warn!(error = %e, "planning collaborator unavailable");
                Vec::new()
            }
        }
    }

    async fn replan(&self, current_queue: &[Task], feedback: &str) -> Vec<PlannedTask> {
        let queue_json = serde_json::to_string(current_queue).unwrap_or_else(|_| "[]".to_string());
        let prompt = format!(
            "{PLANNER_PROMPT}\n\nCurrent task queue:\n{queue_json}\n\nAudit feedback:\n{feedback}\n\n\
             Regenerate the full task queue so the feedback is addressed."
        );
        match self.generator.generate(&prompt).await {
            Ok(reply) => Self::parse_tasks(&reply),
            Err(e) => {
                warn!(error = %e, "replanning collaborator unavailable");
                Vec::new()
            }
        }
    }
}

/// Audit collaborator adapter over a [`Generator`].
pub struct LlmAuditor {
    generator: Arc<dyn Generator>,
}

#[derive(Debug, Deserialize)]
struct AuditReply {
    status: String,
    feedback: String,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    score: Option<u8>,
}

impl LlmAuditor {
    /// Create an auditor over the given generator.
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    fn parse_verdict(reply: &str) -> AuditResult {
        let Some(json) = extract_json(reply) else {
            warn!("audit reply carried no JSON payload");
            return AuditResult::fail("audit reply could not be parsed");
        };
        match serde_json::from_str::<AuditReply>(&json) {
            Ok(parsed) => {
                let mut result = if parsed.status.eq_ignore_ascii_case("pass") {
                    AuditResult::pass(parsed.feedback)
                } else {
                    AuditResult::fail(parsed.feedback)
                };
                result.suggestions = parsed.suggestions;
                result.score = parsed.score;
                result
            }
            Err(e) => {
                warn!(error = %e, "audit reply had unexpected shape");
                AuditResult::fail("audit reply had unexpected shape")
            }
        }
    }
}

#[async_trait]
impl Auditor for LlmAuditor {
    async fn audit(&self, task_description: &str, execution_log: &str) -> AuditResult {
        let prompt = format!(
            "{AUDITOR_PROMPT}\n\nTask description:\n{task_description}\n\nExecution log:\n{execution_log}"
        );
        match self.generator.generate(&prompt).await {
            Ok(reply) => Self::parse_verdict(&strip_code_fences(&reply)),
            Err(e) => {
                warn!(error = %e, "audit collaborator unavailable");
                AuditResult::fail(format!("audit collaborator unavailable: {e}"))
            }
        }
    }
}

const POST_MORTEM_PROMPT: &str = "You are the retrospective analyst of a software delivery \
pipeline. From the execution summary below, extract the single most useful lesson for future \
runs, in at most three sentences. Reply with the lesson text only.";

/// Post-mortem collaborator adapter over a [`Generator`].
///
/// Distills a lesson from the run summary and appends it to a lessons file.
/// Failures to analyze or persist degrade to a `false` return, never an
/// error.
pub struct LlmPostMortem {
    generator: Arc<dyn Generator>,
    lessons_path: PathBuf,
}

impl LlmPostMortem {
    /// Create a post-mortem analyst appending lessons to the given file.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(generator: Arc<dyn Generator>, lessons_path: P) -> Self {
        Self {
            generator,
            lessons_path: lessons_path.into(),
        }
    }

    fn append_lesson(&self, context: &str, lesson: &str) -> std::io::Result<()> {
        if let Some(parent) = self.lessons_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.lessons_path)?;
        writeln!(
            file,
            "## {} | {}\n{}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            context.lines().next().unwrap_or(""),
            lesson.trim()
        )
    }
}

#[async_trait]
impl PostMortem for LlmPostMortem {
    async fn analyze_and_store(&self, execution_summary: &str, project_context: &str) -> bool {
        let prompt = format!(
            "{POST_MORTEM_PROMPT}\n\nProject context:\n{project_context}\n\n\
             Execution summary:\n{execution_summary}"
        );
        let lesson = match self.generator.analyze(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "post-mortem collaborator unavailable");
                return false;
            }
        };
        if lesson.trim().is_empty() {
            warn!("post-mortem produced no lesson");
            return false;
        }
        match self.append_lesson(project_context, &lesson) {
            Ok(()) => {
                debug!(path = %self.lessons_path.display(), "lesson stored");
                true
            }
            Err(e) => {
                warn!(error = %e, "lesson could not be persisted");
                false
            }
        }
    }
}
