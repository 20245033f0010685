//! Task and plan model for the execution pipeline.
//!
//! A [`Task`] is one unit of planned work with a priority and a lifecycle
//! status; a [`TaskPlan`] is the ordered, mutable queue of tasks for one
//! user requirement. [`ExecutionResult`] captures a single worker attempt
//! and [`AuditResult`] the verdict the audit collaborator returns for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Priority of a task, used for per-iteration queue ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl TaskPriority {
    /// Numeric rank used for selection: lower runs first.
    #[must_use]
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Medium => 1,
            TaskPriority::Low => 2,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Pending
    }
}

/// One unit of planned work.
///
/// A completed task is immutable except for audit annotations in its
/// `context` map.
///
/// # Example
///
/// ```
/// use codecrew::task::{Task, TaskPriority, TaskStatus};
///
/// let mut task = Task::new("write a function returning 1").with_priority(TaskPriority::High);
/// assert_eq!(task.status, TaskStatus::Pending);
/// assert!(task.can_retry());
///
/// task.mark_completed("done");
/// assert_eq!(task.status, TaskStatus::Completed);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Opaque identifier, unique within a plan.
    pub id: String,
    /// Human-readable description handed to the worker.
    pub description: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub status: TaskStatus,
    /// Ids of tasks this task depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form context accumulated by the controller and auditor.
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    /// Final output on success.
    #[serde(default)]
    pub result: Option<String>,
    /// Last error text on failure.
    #[serde(default)]
    pub error: Option<String>,
    /// Number of failed attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Retry budget; a task stays retryable while `attempts < max_attempts`.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_max_attempts() -> u32 {
    3
}

impl Task {
    /// Create a pending medium-priority task with a fresh id.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("task_{}", Uuid::new_v4().simple()),
            description: description.into(),
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
            dependencies: Vec::new(),
            context: BTreeMap::new(),
            result: None,
            error: None,
            attempts: 0,
            max_attempts: default_max_attempts(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the id (planner-assigned ids win over the generated one).
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Transition to `InProgress`.
    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
        self.updated_at = Utc::now();
    }

    /// Transition to `Completed`, recording the result.
    pub fn mark_completed(&mut self, result: impl Into<String>) {
        self.status = TaskStatus::Completed;
        self.result = Some(result.into());
        self.updated_at = Utc::now();
    }

    /// Transition to `Failed`, recording the error and consuming one attempt.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.attempts += 1;
        self.updated_at = Utc::now();
    }

    /// Whether the retry budget allows another attempt.
    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Status label of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    Updated,
    Executing,
    Completed,
}

/// Ordered, mutable collection of tasks for one user requirement.
///
/// The cursor (`current_task_index`) is monotonically non-decreasing except
/// when replanning explicitly resets it to 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    /// The original user requirement.
    pub user_request: String,
    pub tasks: Vec<Task>,
    pub current_task_index: usize,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

impl TaskPlan {
    /// Create a plan over the given tasks.
    #[must_use]
    pub fn new(user_request: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            user_request: user_request.into(),
            tasks,
            current_task_index: 0,
            status: PlanStatus::Planned,
            created_at: Utc::now(),
        }
    }

    /// Task at the cursor, if the cursor is within bounds.
    #[must_use]
    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.get(self.current_task_index)
    }

    /// Advance the cursor by one and return the new current task.
    pub fn advance(&mut self) -> Option<&Task> {
        self.current_task_index += 1;
        self.tasks.get(self.current_task_index)
    }

    /// Insert a task at `position`, or append when `position` is `None`.
    pub fn add_task(&mut self, task: Task, position: Option<usize>) {
        match position {
            Some(pos) if pos <= self.tasks.len() => self.tasks.insert(pos, task),
            _ => self.tasks.push(task),
        }
    }

    /// The not-yet-visited sub-sequence (from the cursor onward).
    #[must_use]
    pub fn remaining(&self) -> &[Task] {
        if self.current_task_index < self.tasks.len() {
            &self.tasks[self.current_task_index..]
        } else {
            &[]
        }
    }

    /// Replace the queue after a replan and reset the cursor to 0.
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.current_task_index = 0;
        self.status = PlanStatus::Updated;
    }

    /// True iff every task's status is `Completed`.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }

    /// Number of completed tasks.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }
}

/// Captured outcome of a single worker attempt. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Captured stdout of the attempt.
    #[serde(default)]
    pub output: String,
    /// Captured stderr or failure description.
    #[serde(default)]
    pub error: String,
    /// The code or command that was run.
    #[serde(default)]
    pub code: String,
    /// Wall-clock time the attempt took, in seconds.
    #[serde(default)]
    pub execution_time: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ExecutionResult {
    /// A passing result with the given output.
    #[must_use]
    pub fn success(code: impl Into<String>, output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            code: code.into(),
            execution_time: elapsed.as_secs_f64(),
            metadata: BTreeMap::new(),
        }
    }

    /// A failing result with the given error text.
    #[must_use]
    pub fn failure(code: impl Into<String>, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            code: code.into(),
            execution_time: elapsed.as_secs_f64(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Verdict of the audit collaborator. Consumed read-only by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditStatus {
    Pass,
    Fail,
}

/// Audit verdict plus the feedback the planner replans from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditResult {
    pub status: AuditStatus,
    pub feedback: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub score: Option<u8>,
}

impl AuditResult {
    /// A passing verdict.
    #[must_use]
    pub fn pass(feedback: impl Into<String>) -> Self {
        Self {
            status: AuditStatus::Pass,
            feedback: feedback.into(),
            suggestions: Vec::new(),
            score: None,
        }
    }

    /// A failing verdict.
    #[must_use]
    pub fn fail(feedback: impl Into<String>) -> Self {
        Self {
            status: AuditStatus::Fail,
            feedback: feedback.into(),
            suggestions: Vec::new(),
            score: None,
        }
    }

    /// Whether the verdict is a pass.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == AuditStatus::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank_ordering() {
        assert!(TaskPriority::High.rank() < TaskPriority::Medium.rank());
        assert!(TaskPriority::Medium.rank() < TaskPriority::Low.rank());
    }

    #[test]
    fn test_priority_serde_lowercase() {
        let json = serde_json::to_string(&TaskPriority::High).unwrap();
        assert_eq!(json, "\"high\"");
        let p: TaskPriority = serde_json::from_str("\"low\"").unwrap();
        assert_eq!(p, TaskPriority::Low);
    }

    #[test]
    fn test_task_new_defaults() {
        let task = Task::new("do something");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.attempts, 0);
        assert_eq!(task.max_attempts, 3);
        assert!(task.id.starts_with("task_"));
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::new("do something");
        task.mark_in_progress();
        assert_eq!(task.status, TaskStatus::InProgress);

        task.mark_failed("boom");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.error.as_deref(), Some("boom"));

        task.mark_completed("output");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("output"));
    }

    #[test]
    fn test_can_retry_bounded_by_max_attempts() {
        let mut task = Task::new("flaky").with_max_attempts(2);
        assert!(task.can_retry());
        task.mark_failed("e1");
        assert!(task.can_retry());
        task.mark_failed("e2");
        assert!(!task.can_retry());
    }

    #[test]
    fn test_plan_cursor_and_advance() {
        let tasks = vec![Task::new("a"), Task::new("b")];
        let mut plan = TaskPlan::new("req", tasks);
        assert_eq!(plan.current_task().unwrap().description, "a");

        plan.advance();
        assert_eq!(plan.current_task().unwrap().description, "b");

        plan.advance();
        assert!(plan.current_task().is_none());
    }

    #[test]
    fn test_plan_add_task_positional() {
        let mut plan = TaskPlan::new("req", vec![Task::new("a"), Task::new("c")]);
        plan.add_task(Task::new("b"), Some(1));
        let order: Vec<&str> = plan.tasks.iter().map(|t| t.description.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);

        plan.add_task(Task::new("d"), None);
        assert_eq!(plan.tasks.last().unwrap().description, "d");
    }

    #[test]
    fn test_plan_is_completed() {
        let mut plan = TaskPlan::new("req", vec![Task::new("a"), Task::new("b")]);
        assert!(!plan.is_completed());

        for task in &mut plan.tasks {
            task.mark_completed("ok");
        }
        assert!(plan.is_completed());
        assert_eq!(plan.completed_count(), 2);
    }

    #[test]
    fn test_plan_replace_resets_cursor() {
        let mut plan = TaskPlan::new("req", vec![Task::new("a"), Task::new("b")]);
        plan.advance();
        assert_eq!(plan.current_task_index, 1);

        plan.replace_tasks(vec![Task::new("x")]);
        assert_eq!(plan.current_task_index, 0);
        assert_eq!(plan.status, PlanStatus::Updated);
        assert_eq!(plan.tasks.len(), 1);
    }

    #[test]
    fn test_plan_remaining_slice() {
        let mut plan = TaskPlan::new("req", vec![Task::new("a"), Task::new("b"), Task::new("c")]);
        assert_eq!(plan.remaining().len(), 3);
        plan.advance();
        assert_eq!(plan.remaining().len(), 2);
        plan.advance();
        plan.advance();
        assert!(plan.remaining().is_empty());
    }

    #[test]
    fn test_execution_result_constructors() {
        let ok = ExecutionResult::success("print(1)", "1\n", Duration::from_millis(250));
        assert!(ok.success);
        assert_eq!(ok.code, "print(1)");
        assert!(ok.error.is_empty());
        assert!((ok.execution_time - 0.25).abs() < 1e-9);

        let bad = ExecutionResult::failure("boom", "NameError", Duration::from_secs(1));
        assert!(!bad.success);
        assert_eq!(bad.error, "NameError");
    }

    #[test]
    fn test_audit_status_serde_uppercase() {
        let json = serde_json::to_string(&AuditStatus::Pass).unwrap();
        assert_eq!(json, "\"PASS\"");
        let s: AuditStatus = serde_json::from_str("\"FAIL\"").unwrap();
        assert_eq!(s, AuditStatus::Fail);
    }

    #[test]
    fn test_audit_result_helpers() {
        assert!(AuditResult::pass("good").passed());
        assert!(!AuditResult::fail("bad").passed());
    }

    #[test]
    fn test_task_serde_round_trip() {
        let task = Task::new("serialize me").with_priority(TaskPriority::High);
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.description, "serialize me");
        assert_eq!(back.priority, TaskPriority::High);
    }

    #[test]
    fn test_planner_shaped_task_deserializes() {
        // Planner replies carry only id, description and priority.
        let json = r#"{
            "id": "t1",
            "description": "write a function",
            "priority": "high",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, "t1");
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.max_attempts, 3);
    }
}
