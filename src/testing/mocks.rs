//! Mock collaborator implementations.
//!
//! Thread-safe mocks for the five collaborator contracts. Scripted values
//! are consumed front-to-back; when a script runs out the mock falls back
//! to its fixed default so long-running loops stay deterministic.

use crate::collab::{
    Auditor, CommandExecutor, Generator, PayloadKind, PlannedTask, Planner, PostMortem,
};
use crate::task::{AuditResult, ExecutionResult, Task};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// =============================================================================
// MockGenerator
// =============================================================================

/// Mock generation collaborator with scripted replies and call recording.
#[derive(Debug, Default)]
pub struct MockGenerator {
    /// Queued `generate` replies, consumed first.
    generate_queue: Mutex<VecDeque<String>>,
    /// Fallback `generate` reply once the queue is empty.
    generate_response: Mutex<String>,
    /// Fixed `analyze` reply.
    analyze_response: Mutex<String>,
    /// Error returned by both operations when set.
    error: Option<String>,
    generate_count: AtomicU32,
    analyze_count: AtomicU32,
    generate_prompts: Mutex<Vec<String>>,
    analyze_contexts: Mutex<Vec<String>>,
}

impl MockGenerator {
    /// Create a mock with empty replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback `generate` reply.
    #[must_use]
    pub fn with_generate_response(self, response: &str) -> Self {
        *self.generate_response.lock().unwrap() = response.to_string();
        self
    }

    /// Queue `generate` replies consumed in order before the fallback.
    #[must_use]
    pub fn with_generate_responses(self, responses: Vec<&str>) -> Self {
        {
            let mut queue = self.generate_queue.lock().unwrap();
            queue.extend(responses.into_iter().map(String::from));
        }
        self
    }

    /// Set the `analyze` reply.
    #[must_use]
    pub fn with_analyze_response(self, response: &str) -> Self {
        *self.analyze_response.lock().unwrap() = response.to_string();
        self
    }

    /// Make both operations fail with the given error.
    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Number of `generate` calls observed.
    pub fn generate_calls(&self) -> u32 {
        self.generate_count.load(Ordering::SeqCst)
    }

    /// Number of `analyze` calls observed.
    pub fn analyze_calls(&self) -> u32 {
        self.analyze_count.load(Ordering::SeqCst)
    }

    /// Prompts received by `generate`, in order.
    pub fn generate_prompts(&self) -> Vec<String> {
        self.generate_prompts.lock().unwrap().clone()
    }

    /// Contexts received by `analyze`, in order.
    pub fn analyze_contexts(&self) -> Vec<String> {
        self.analyze_contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.generate_count.fetch_add(1, Ordering::SeqCst);
        self.generate_prompts.lock().unwrap().push(prompt.to_string());

        if let Some(ref error) = self.error {
            anyhow::bail!("{}", error)
        }
        if let Some(queued) = self.generate_queue.lock().unwrap().pop_front() {
            return Ok(queued);
        }
        Ok(self.generate_response.lock().unwrap().clone())
    }

    async fn analyze(&self, context: &str) -> anyhow::Result<String> {
        self.analyze_count.fetch_add(1, Ordering::SeqCst);
        self.analyze_contexts.lock().unwrap().push(context.to_string());

        if let Some(ref error) = self.error {
            anyhow::bail!("{}", error)
        }
        Ok(self.analyze_response.lock().unwrap().clone())
    }
}

// =============================================================================
// MockExecutor
// =============================================================================

/// Mock execution collaborator with scripted results.
#[derive(Debug, Default)]
pub struct MockExecutor {
    /// Scripted results consumed in order.
    results: Mutex<VecDeque<ExecutionResult>>,
    /// Fallback behavior when the script is exhausted: pass with this
    /// output, or fail with this error.
    fallback_output: Option<String>,
    fallback_error: Option<String>,
    call_count: AtomicU32,
    payloads: Mutex<Vec<String>>,
}

impl MockExecutor {
    /// Every execution passes with the given output.
    #[must_use]
    pub fn passing(output: &str) -> Self {
        Self {
            fallback_output: Some(output.to_string()),
            ..Self::default()
        }
    }

    /// Every execution fails with the given error.
    #[must_use]
    pub fn failing(error: &str) -> Self {
        Self {
            fallback_error: Some(error.to_string()),
            ..Self::default()
        }
    }

    /// Consume the scripted results in order; fail afterwards.
    #[must_use]
    pub fn with_results(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    /// Number of executions observed.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Payloads received, in order.
    pub fn executed_payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(
        &self,
        payload: &str,
        _kind: PayloadKind,
        _timeout: Duration,
    ) -> ExecutionResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.to_string());

        if let Some(scripted) = self.results.lock().unwrap().pop_front() {
            return scripted;
        }
        if let Some(ref output) = self.fallback_output {
            return ExecutionResult::success(payload, output.clone(), Duration::ZERO);
        }
        let error = self
            .fallback_error
            .clone()
            .unwrap_or_else(|| "mock executor script exhausted".to_string());
        ExecutionResult::failure(payload, error, Duration::ZERO)
    }
}

// =============================================================================
// MockPlanner
// =============================================================================

/// Mock planning collaborator with a fixed plan and queued replans.
#[derive(Debug, Default)]
pub struct MockPlanner {
    plan: Mutex<Vec<PlannedTask>>,
    /// Queued replan results; when exhausted, the initial plan is reused.
    replans: Mutex<VecDeque<Vec<PlannedTask>>>,
    plan_count: AtomicU32,
    replan_count: AtomicU32,
    feedbacks: Mutex<Vec<String>>,
}

impl MockPlanner {
    /// Create a planner that returns no tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the initial plan.
    #[must_use]
    pub fn with_plan(self, plan: Vec<PlannedTask>) -> Self {
        *self.plan.lock().unwrap() = plan;
        self
    }

    /// Queue replan results consumed in order.
    #[must_use]
    pub fn with_replans(self, replans: Vec<Vec<PlannedTask>>) -> Self {
        {
            let mut queue = self.replans.lock().unwrap();
            queue.extend(replans);
        }
        self
    }

    /// Number of `plan` calls observed.
    pub fn plan_calls(&self) -> u32 {
        self.plan_count.load(Ordering::SeqCst)
    }

    /// Number of `replan` calls observed.
    pub fn replan_calls(&self) -> u32 {
        self.replan_count.load(Ordering::SeqCst)
    }

    /// Feedback strings received by `replan`, in order.
    pub fn feedbacks(&self) -> Vec<String> {
        self.feedbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for MockPlanner {
    async fn plan(&self, _requirement: &str) -> Vec<PlannedTask> {
        self.plan_count.fetch_add(1, Ordering::SeqCst);
        self.plan.lock().unwrap().clone()
    }

    async fn replan(&self, _current_queue: &[Task], feedback: &str) -> Vec<PlannedTask> {
        self.replan_count.fetch_add(1, Ordering::SeqCst);
        self.feedbacks.lock().unwrap().push(feedback.to_string());

        if let Some(queued) = self.replans.lock().unwrap().pop_front() {
            return queued;
        }
        self.plan.lock().unwrap().clone()
    }
}

// =============================================================================
// MockAuditor
// =============================================================================

/// Mock audit collaborator with scripted verdicts.
#[derive(Debug, Default)]
pub struct MockAuditor {
    /// Scripted verdicts consumed in order; the last one repeats.
    verdicts: Mutex<VecDeque<AuditResult>>,
    fallback: Mutex<Option<AuditResult>>,
    call_count: AtomicU32,
    audited: Mutex<Vec<String>>,
}

impl MockAuditor {
    /// Every audit passes.
    #[must_use]
    pub fn always_pass() -> Self {
        let mock = Self::default();
        *mock.fallback.lock().unwrap() = Some(AuditResult::pass("looks good"));
        mock
    }

    /// Every audit fails with the given feedback.
    #[must_use]
    pub fn always_fail(feedback: &str) -> Self {
        let mock = Self::default();
        *mock.fallback.lock().unwrap() = Some(AuditResult::fail(feedback));
        mock
    }

    /// Consume the scripted verdicts in order, then repeat the last one.
    #[must_use]
    pub fn with_verdicts(verdicts: Vec<AuditResult>) -> Self {
        let fallback = verdicts.last().cloned();
        let mock = Self {
            verdicts: Mutex::new(verdicts.into()),
            ..Self::default()
        };
        *mock.fallback.lock().unwrap() = fallback;
        mock
    }

    /// Number of audits observed.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Task descriptions received, in order.
    pub fn audited_descriptions(&self) -> Vec<String> {
        self.audited.lock().unwrap().clone()
    }
}

#[async_trait]
impl Auditor for MockAuditor {
    async fn audit(&self, task_description: &str, _execution_log: &str) -> AuditResult {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.audited.lock().unwrap().push(task_description.to_string());

        if let Some(scripted) = self.verdicts.lock().unwrap().pop_front() {
            return scripted;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| AuditResult::fail("mock auditor has no verdict"))
    }
}

// =============================================================================
// MockPostMortem
// =============================================================================

/// Mock post-mortem collaborator recording its invocations.
#[derive(Debug)]
pub struct MockPostMortem {
    result: bool,
    call_count: AtomicU32,
    summaries: Mutex<Vec<String>>,
}

impl Default for MockPostMortem {
    fn default() -> Self {
        Self {
            result: true,
            call_count: AtomicU32::new(0),
            summaries: Mutex::new(Vec::new()),
        }
    }
}

impl MockPostMortem {
    /// Create a post-mortem that reports success.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stored/not-stored result.
    #[must_use]
    pub fn with_result(mut self, result: bool) -> Self {
        self.result = result;
        self
    }

    /// Number of invocations observed.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Execution summaries received, in order.
    pub fn summaries(&self) -> Vec<String> {
        self.summaries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostMortem for MockPostMortem {
    async fn analyze_and_store(&self, execution_summary: &str, _project_context: &str) -> bool {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.summaries
            .lock()
            .unwrap()
            .push(execution_summary.to_string());
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::AuditStatus;

    #[tokio::test]
    async fn test_generator_queue_then_fallback() {
        let generator = MockGenerator::new()
            .with_generate_responses(vec!["first", "second"])
            .with_generate_response("fallback");

        assert_eq!(generator.generate("p").await.unwrap(), "first");
        assert_eq!(generator.generate("p").await.unwrap(), "second");
        assert_eq!(generator.generate("p").await.unwrap(), "fallback");
        assert_eq!(generator.generate_calls(), 3);
    }

    #[tokio::test]
    async fn test_generator_error() {
        let generator = MockGenerator::new().with_error("down");
        assert!(generator.generate("p").await.is_err());
        assert!(generator.analyze("c").await.is_err());
    }

    #[tokio::test]
    async fn test_executor_scripted_then_exhausted() {
        let executor = MockExecutor::with_results(vec![ExecutionResult::success(
            "c",
            "out",
            Duration::ZERO,
        )]);
        assert!(executor.execute("c", PayloadKind::Command, Duration::ZERO).await.success);
        let exhausted = executor.execute("c", PayloadKind::Command, Duration::ZERO).await;
        assert!(!exhausted.success);
        assert_eq!(executor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_planner_replans_queue() {
        let planner = MockPlanner::new()
            .with_plan(vec![PlannedTask::new("a")])
            .with_replans(vec![vec![PlannedTask::new("b")]]);

        assert_eq!(planner.plan("req").await[0].description, "a");
        assert_eq!(planner.replan(&[], "fb").await[0].description, "b");
        // Queue exhausted: falls back to the initial plan.
        assert_eq!(planner.replan(&[], "fb2").await[0].description, "a");
        assert_eq!(planner.feedbacks(), vec!["fb", "fb2"]);
    }

    #[tokio::test]
    async fn test_auditor_fail_once_then_pass() {
        let auditor = MockAuditor::with_verdicts(vec![
            AuditResult::fail("not yet"),
            AuditResult::pass("better"),
        ]);
        assert_eq!(auditor.audit("t", "l").await.status, AuditStatus::Fail);
        assert_eq!(auditor.audit("t", "l").await.status, AuditStatus::Pass);
        // Last verdict repeats.
        assert_eq!(auditor.audit("t", "l").await.status, AuditStatus::Pass);
        assert_eq!(auditor.call_count(), 3);
    }

    #[tokio::test]
    async fn test_post_mortem_records_summaries() {
        let post_mortem = MockPostMortem::new().with_result(false);
        assert!(!post_mortem.analyze_and_store("summary", "ctx").await);
        assert_eq!(post_mortem.call_count(), 1);
        assert_eq!(post_mortem.summaries(), vec!["summary"]);
    }
}
