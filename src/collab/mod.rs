//! Collaborator contracts for the orchestration core.
//!
//! The core drives five external collaborators through narrow, object-safe
//! traits: planning, generation, auditing, subprocess execution, and the
//! end-of-run post-mortem. The collaborators themselves (LLM transports,
//! memory stores) live behind these seams; the core only depends on the
//! contracts below.
//!
//! # No-throw contracts
//!
//! [`Planner`], [`Auditor`], [`CommandExecutor`] and [`PostMortem`] never
//! raise past the core: transport failures degrade to an empty plan, a
//! `FAIL` verdict, a failed [`ExecutionResult`], or `false`. [`Generator`]
//! returns `Result` and its callers convert errors into sentinel values so
//! the retry state machine stays deterministic.

pub mod cleaning;
pub mod llm;
pub mod shell;

use crate::task::{AuditResult, ExecutionResult, Task, TaskPriority};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use llm::{CliGenerator, LlmAuditor, LlmPlanner, LlmPostMortem};
pub use shell::ShellExecutor;

/// How a generated payload should be executed.
///
/// The tag is produced once, at generation time, and travels with the
/// payload; downstream code never re-infers it from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// A script for the configured interpreter.
    Script,
    /// A shell command line.
    Command,
}

impl PayloadKind {
    /// Classify a payload with a lightweight token heuristic: leading
    /// import/def/class/print tokens or a shebang mark a script, anything
    /// else is treated as a shell command.
    #[must_use]
    pub fn classify(payload: &str) -> Self {
        const SCRIPT_TOKENS: [&str; 6] = ["import ", "from ", "def ", "class ", "print(", "#!"];
        let trimmed = payload.trim_start();
        if SCRIPT_TOKENS.iter().any(|t| trimmed.starts_with(t)) {
            PayloadKind::Script
        } else {
            PayloadKind::Command
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadKind::Script => write!(f, "script"),
            PayloadKind::Command => write!(f, "command"),
        }
    }
}

/// One task as the planning collaborator describes it: id, description,
/// priority. Everything else is filled in by the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
}

impl PlannedTask {
    /// Create a planned task with the default (medium) priority.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: None,
            description: description.into(),
            priority: TaskPriority::default(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Promote to a full [`Task`], keeping a planner-assigned id when present.
    #[must_use]
    pub fn into_task(self, max_attempts: u32) -> Task {
        let task = Task::new(self.description)
            .with_priority(self.priority)
            .with_max_attempts(max_attempts);
        match self.id {
            Some(id) if !id.trim().is_empty() => task.with_id(id),
            _ => task,
        }
    }
}

/// Planning collaborator: turns a requirement into an ordered task list and
/// regenerates the queue from audit feedback.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plan tasks for a requirement. An empty list means planning failed
    /// or yielded nothing; the caller decides what that means.
    async fn plan(&self, requirement: &str) -> Vec<PlannedTask>;

    /// Regenerate the queue in response to audit feedback. Must not raise;
    /// on transport failure return an empty list.
    async fn replan(&self, current_queue: &[Task], feedback: &str) -> Vec<PlannedTask>;
}

/// Generation collaborator: produces code for a prompt and failure analyses
/// for a diagnostic context.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate code or a command for the given prompt.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;

    /// Analyze a failure context and return a fix suggestion.
    async fn analyze(&self, context: &str) -> anyhow::Result<String>;
}

/// Audit collaborator: judges one execution log against its task description.
#[async_trait]
pub trait Auditor: Send + Sync {
    /// Return a PASS/FAIL verdict with feedback. Must not raise; degrade
    /// unavailable or malformed replies to a FAIL verdict.
    async fn audit(&self, task_description: &str, execution_log: &str) -> AuditResult;
}

/// Execution collaborator: runs one payload in a subprocess with a bounded
/// timeout. A timeout or spawn failure is a failed result, never an error.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, payload: &str, kind: PayloadKind, timeout: Duration)
        -> ExecutionResult;
}

/// Post-mortem collaborator: analyzes and stores the run summary. Invoked
/// exactly once per run, success or failure.
#[async_trait]
pub trait PostMortem: Send + Sync {
    /// Returns whether the analysis was stored. Must not raise; the
    /// scheduler finalizes regardless.
    async fn analyze_and_store(&self, execution_summary: &str, project_context: &str) -> bool;
}
