//! Task execution loop controller.
//!
//! Executes a flat, dynamically-reordered task queue until exhausted. On
//! every iteration the not-yet-visited sub-sequence is re-sorted by
//! priority rank so tasks inserted by a replan can preempt; an audit FAIL
//! triggers a replan and a cursor reset to 0. Replans are capped: a task
//! the planner never repairs surfaces as a replanning-exhausted error
//! instead of looping forever.

use crate::abort::AbortFlag;
use crate::collab::{Auditor, Planner};
use crate::config::EngineConfig;
use crate::error::{CrewError, Result};
use crate::task::{AuditStatus, PlanStatus, TaskPlan, TaskStatus};
use crate::worker::Worker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Terminal status of one task-loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every queued task was dispatched and the cursor reached the end.
    Completed,
    /// The run was cancelled at a suspension point.
    Aborted,
}

/// One audited dispatch, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub description: String,
    pub verdict: AuditStatus,
    pub feedback: String,
}

/// Aggregate outcome of one task-loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub completed_tasks: usize,
    pub total_tasks: usize,
    /// Replans consumed during the run.
    pub replans: u32,
    /// Every audited dispatch, including ones later replanned away.
    pub records: Vec<TaskRecord>,
}

/// Controller that drives the priority-ordered task queue.
pub struct TaskLoopController {
    planner: Arc<dyn Planner>,
    worker: Worker,
    auditor: Arc<dyn Auditor>,
    config: EngineConfig,
    abort: AbortFlag,
}

impl TaskLoopController {
    /// Create a controller over the given collaborators.
    #[must_use]
    pub fn new(
        planner: Arc<dyn Planner>,
        worker: Worker,
        auditor: Arc<dyn Auditor>,
        config: EngineConfig,
    ) -> Self {
        Self {
            planner,
            worker,
            auditor,
            config,
            abort: AbortFlag::new(),
        }
    }

    /// Use an externally-owned abort flag.
    #[must_use]
    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    /// Plan and execute the full queue for a requirement.
    ///
    /// # Errors
    ///
    /// - [`CrewError::EmptyPlan`] when planning yields no tasks.
    /// - [`CrewError::ReplanLimit`] when the replan cap is exhausted.
    pub async fn run(&self, requirement: &str) -> Result<RunReport> {
        info!(requirement, "planning tasks");
        let planned = self.planner.plan(requirement).await;
        if planned.is_empty() {
            return Err(CrewError::EmptyPlan {
                requirement: requirement.to_string(),
            });
        }

        let tasks = planned
            .into_iter()
            .map(|p| p.into_task(self.config.max_attempts))
            .collect();
        let mut plan = TaskPlan::new(requirement, tasks);
        info!(tasks = plan.tasks.len(), "plan ready");

        self.run_plan(&mut plan).await
    }

    /// Execute an already-built plan until the cursor reaches the queue
    /// length.
    pub async fn run_plan(&self, plan: &mut TaskPlan) -> Result<RunReport> {
        let mut replans: u32 = 0;
        let mut records = Vec::new();
        plan.status = PlanStatus::Executing;

        while plan.current_task_index < plan.tasks.len() {
            if self.abort.is_aborted() {
                warn!("run aborted before dispatch");
                return Ok(RunReport {
                    status: RunStatus::Aborted,
                    completed_tasks: plan.completed_count(),
                    total_tasks: plan.tasks.len(),
                    replans,
                    records,
                });
            }

            if !self.select_next(plan) {
                break;
            }
            let cursor = plan.current_task_index;
            let description = plan.tasks[cursor].description.clone();
            plan.tasks[cursor].mark_in_progress();
            info!(task = %description, cursor, "dispatching task");

            let outcome = self.worker.run(&description).await;
            let execution_log = outcome.execution_log();

            let verdict = self.auditor.audit(&description, &execution_log).await;
            info!(status = ?verdict.status, "audit verdict");
            records.push(TaskRecord {
                description: description.clone(),
                verdict: verdict.status,
                feedback: verdict.feedback.clone(),
            });

            if verdict.status == AuditStatus::Fail {
                plan.tasks[cursor].mark_failed(&verdict.feedback);

                if replans >= self.config.max_replans {
                    warn!(replans, "replanning exhausted");
                    return Err(CrewError::ReplanLimit {
                        replans,
                        cap: self.config.max_replans,
                    });
                }
                replans += 1;

                info!(replans, "requesting replan");
                let updated = self.planner.replan(&plan.tasks, &verdict.feedback).await;
                if updated.is_empty() {
                    // No progress from the planner: keep the queue and
                    // restart iteration order, still counting the replan.
                    warn!("replan yielded no tasks; keeping current queue");
                    plan.current_task_index = 0;
                } else {
                    let tasks = updated
                        .into_iter()
                        .map(|p| p.into_task(self.config.max_attempts))
                        .collect();
                    plan.replace_tasks(tasks);
                }
            } else {
                let result = if outcome.success {
                    outcome.output.clone()
                } else {
                    verdict.feedback.clone()
                };
                plan.tasks[cursor].mark_completed(result);
                plan.advance();
            }
        }

        plan.status = PlanStatus::Completed;
        info!(
            completed = plan.completed_count(),
            total = plan.tasks.len(),
            "task loop finished"
        );
        Ok(RunReport {
            status: RunStatus::Completed,
            completed_tasks: plan.completed_count(),
            total_tasks: plan.tasks.len(),
            replans,
            records,
        })
    }

    /// Move the lowest-rank remaining task to the cursor position.
    ///
    /// Re-sorted on every iteration, not once: a replan can insert a
    /// high-priority task that preempts the rest of the queue. Ties keep
    /// the original queue order, and the relative order of the other
    /// remaining tasks is preserved. Completed tasks are never selected:
    /// a cursor reset over a kept queue must not re-dispatch them. Returns
    /// `false` when no dispatchable task remains, moving the cursor to the
    /// end of the queue.
    fn select_next(&self, plan: &mut TaskPlan) -> bool {
        let cursor = plan.current_task_index;
        let best_offset = plan
            .remaining()
            .iter()
            .enumerate()
            .filter(|(_, task)| task.status != TaskStatus::Completed)
            .min_by_key(|(i, task)| (task.priority.rank(), *i))
            .map(|(i, _)| i);

        match best_offset {
            Some(offset) => {
                if offset > 0 {
                    let selected = plan.tasks.remove(cursor + offset);
                    plan.tasks.insert(cursor, selected);
                }
                true
            }
            None => {
                plan.current_task_index = plan.tasks.len();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::PlannedTask;
    use crate::task::{AuditResult, TaskPriority};
    use crate::testing::mocks::{MockAuditor, MockExecutor, MockGenerator, MockPlanner};

    fn worker_always_passing() -> Worker {
        Worker::new(
            Arc::new(MockGenerator::new().with_generate_response("print(1)")),
            Arc::new(MockExecutor::passing("1\n")),
            EngineConfig::default(),
        )
    }

    fn controller(planner: MockPlanner, auditor: MockAuditor) -> TaskLoopController {
        TaskLoopController::new(
            Arc::new(planner),
            worker_always_passing(),
            Arc::new(auditor),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_single_task_happy_path() {
        let planner = MockPlanner::new().with_plan(vec![PlannedTask::new(
            "write a function returning 1",
        )]);
        let report = controller(planner, MockAuditor::always_pass())
            .run("write a function returning 1")
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.completed_tasks, 1);
        assert_eq!(report.total_tasks, 1);
        assert_eq!(report.replans, 0);
    }

    #[tokio::test]
    async fn test_empty_plan_is_failure() {
        let err = controller(MockPlanner::new(), MockAuditor::always_pass())
            .run("anything")
            .await
            .unwrap_err();
        assert!(matches!(err, CrewError::EmptyPlan { .. }));
    }

    #[tokio::test]
    async fn test_priority_selection_ignores_list_position() {
        let planner = MockPlanner::new().with_plan(vec![
            PlannedTask::new("low task").with_priority(TaskPriority::Low),
            PlannedTask::new("high task").with_priority(TaskPriority::High),
            PlannedTask::new("medium task").with_priority(TaskPriority::Medium),
        ]);
        let auditor = MockAuditor::always_pass();
        let report = controller(planner, auditor).run("req").await.unwrap();

        let order: Vec<&str> = report.records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(order, vec!["high task", "medium task", "low task"]);
        assert_eq!(report.completed_tasks, 3);
    }

    #[tokio::test]
    async fn test_priority_ties_keep_original_order() {
        let planner = MockPlanner::new().with_plan(vec![
            PlannedTask::new("first").with_priority(TaskPriority::Medium),
            PlannedTask::new("second").with_priority(TaskPriority::Medium),
        ]);
        let report = controller(planner, MockAuditor::always_pass())
            .run("req")
            .await
            .unwrap();

        let order: Vec<&str> = report.records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_fail_replans_and_restarts_over_new_queue() {
        let planner = MockPlanner::new()
            .with_plan(vec![PlannedTask::new("broken task")])
            .with_replans(vec![vec![
                PlannedTask::new("urgent fix").with_priority(TaskPriority::High),
                PlannedTask::new("broken task, repaired"),
            ]]);
        let auditor = MockAuditor::with_verdicts(vec![
            AuditResult::fail("the output was wrong"),
            AuditResult::pass("fixed"),
        ]);
        let controller = controller(planner, auditor);
        let report = controller.run("req").await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.replans, 1);
        // The first record is the failing original; iteration then restarts
        // over the new queue with the high-priority task first.
        let order: Vec<&str> = report.records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(
            order,
            vec!["broken task", "urgent fix", "broken task, repaired"]
        );
        assert_eq!(report.completed_tasks, 2);
    }

    #[tokio::test]
    async fn test_replan_feedback_comes_from_audit() {
        let planner = MockPlanner::new()
            .with_plan(vec![PlannedTask::new("task")])
            .with_replans(vec![vec![PlannedTask::new("repaired task")]]);
        let auditor = MockAuditor::with_verdicts(vec![
            AuditResult::fail("missing edge case"),
            AuditResult::pass("ok"),
        ]);
        let planner_handle = Arc::new(planner);
        let controller = TaskLoopController::new(
            planner_handle.clone(),
            worker_always_passing(),
            Arc::new(auditor),
            EngineConfig::default(),
        );

        controller.run("req").await.unwrap();
        assert_eq!(planner_handle.feedbacks(), vec!["missing edge case"]);
    }

    #[tokio::test]
    async fn test_replanning_exhausted_is_fatal() {
        let config = EngineConfig {
            max_replans: 2,
            ..EngineConfig::default()
        };
        // The planner keeps returning the same failing task.
        let planner = Arc::new(MockPlanner::new().with_plan(vec![PlannedTask::new("never works")]));
        let controller = TaskLoopController::new(
            planner.clone(),
            worker_always_passing(),
            Arc::new(MockAuditor::always_fail("still wrong")),
            config,
        );

        let err = controller.run("req").await.unwrap_err();
        assert!(matches!(err, CrewError::ReplanLimit { replans: 2, cap: 2 }));
        assert_eq!(planner.replan_calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_replan_keeps_queue_and_resets_cursor() {
        let config = EngineConfig {
            max_replans: 1,
            ..EngineConfig::default()
        };
        // Replan queue: one empty reply, then the fallback (initial plan).
        let planner = MockPlanner::new()
            .with_plan(vec![PlannedTask::new("task a")])
            .with_replans(vec![vec![]]);
        let auditor =
            MockAuditor::with_verdicts(vec![AuditResult::fail("bad"), AuditResult::pass("ok")]);
        let controller = TaskLoopController::new(
            Arc::new(planner),
            worker_always_passing(),
            Arc::new(auditor),
            config,
        );

        let report = controller.run("req").await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.replans, 1);
        // Same task was re-dispatched after the empty replan.
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].description, report.records[1].description);
    }

    #[tokio::test]
    async fn test_empty_replan_does_not_redispatch_completed_tasks() {
        let planner = MockPlanner::new()
            .with_plan(vec![
                PlannedTask::new("task a").with_priority(TaskPriority::High),
                PlannedTask::new("task b"),
            ])
            .with_replans(vec![vec![]]);
        let auditor = MockAuditor::with_verdicts(vec![
            AuditResult::pass("ok"),
            AuditResult::fail("wrong output"),
            AuditResult::pass("ok now"),
        ]);
        let report = controller(planner, auditor).run("req").await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.replans, 1);
        assert_eq!(report.completed_tasks, 2);
        // After the cursor reset over the kept queue, the completed
        // "task a" stays untouched; only the failed task runs again.
        let order: Vec<&str> = report.records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(order, vec!["task a", "task b", "task b"]);
    }

    #[tokio::test]
    async fn test_abort_before_dispatch_is_consistent() {
        let planner = MockPlanner::new().with_plan(vec![PlannedTask::new("task")]);
        let abort = AbortFlag::new();
        abort.abort();
        let controller = TaskLoopController::new(
            Arc::new(planner),
            worker_always_passing(),
            Arc::new(MockAuditor::always_pass()),
            EngineConfig::default(),
        )
        .with_abort(abort);

        let report = controller.run("req").await.unwrap();
        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.completed_tasks, 0);
        assert!(report.records.is_empty());
    }
}
