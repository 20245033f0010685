//! Staged delivery workflow.
//!
//! A fixed role pipeline for one requirement: analysis, design,
//! implementation, review, execution, environment preparation, testing,
//! final acceptance and a closing summary, with a capped review loop-back
//! and an unconditional post-mortem at the end of every run. The stage
//! machine lives here; the driver is [`scheduler::WorkflowScheduler`].

pub mod scheduler;

pub use scheduler::{WorkflowReport, WorkflowScheduler};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Stage
// =============================================================================

/// Pipeline stages, in execution order, plus the two terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PmAnalysis,
    ArchitectDesign,
    CoderImplementation,
    TechleadReview,
    RunnerExecution,
    SysadminEnvironment,
    QaTesting,
    AuditorAcceptance,
    EvolutionAnalysis,
    Completed,
    Failed,
}

impl Stage {
    /// The stage that follows on success, `None` at a terminal.
    #[must_use]
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::PmAnalysis => Some(Stage::ArchitectDesign),
            Stage::ArchitectDesign => Some(Stage::CoderImplementation),
            Stage::CoderImplementation => Some(Stage::TechleadReview),
            Stage::TechleadReview => Some(Stage::RunnerExecution),
            Stage::RunnerExecution => Some(Stage::SysadminEnvironment),
            Stage::SysadminEnvironment => Some(Stage::QaTesting),
            Stage::QaTesting => Some(Stage::AuditorAcceptance),
            Stage::AuditorAcceptance => Some(Stage::EvolutionAnalysis),
            Stage::EvolutionAnalysis => Some(Stage::Completed),
            Stage::Completed | Stage::Failed => None,
        }
    }

    /// Whether the run is over.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PmAnalysis => "pm_analysis",
            Stage::ArchitectDesign => "architect_design",
            Stage::CoderImplementation => "coder_implementation",
            Stage::TechleadReview => "techlead_review",
            Stage::RunnerExecution => "runner_execution",
            Stage::SysadminEnvironment => "sysadmin_environment",
            Stage::QaTesting => "qa_testing",
            Stage::AuditorAcceptance => "auditor_acceptance",
            Stage::EvolutionAnalysis => "evolution_analysis",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// WorkflowState
// =============================================================================

/// Mutable state threaded through one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// The user requirement driving the run.
    pub requirement: String,
    /// Current stage.
    pub stage: Stage,
    /// Named text artifacts produced so far, keyed by stage name.
    pub artifacts: BTreeMap<String, String>,
    /// Review loop-backs consumed.
    pub review_cycles: u32,
    /// Stages entered, in order, including repeats from loop-backs.
    pub history: Vec<Stage>,
    /// Terminal failure reason, set when `stage` ends up `Failed`.
    pub failure: Option<String>,
}

impl WorkflowState {
    /// Start a run at the first stage.
    #[must_use]
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            stage: Stage::PmAnalysis,
            artifacts: BTreeMap::new(),
            review_cycles: 0,
            history: Vec::new(),
            failure: None,
        }
    }

    /// Record a stage artifact, replacing any earlier value for the stage.
    pub fn record_artifact(&mut self, stage: Stage, content: impl Into<String>) {
        self.artifacts.insert(stage.to_string(), content.into());
    }

    /// Artifact produced by a stage, if any.
    #[must_use]
    pub fn artifact(&self, stage: Stage) -> Option<&str> {
        self.artifacts.get(&stage.to_string()).map(String::as_str)
    }

    /// Move to a stage and log the transition.
    pub fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.history.push(stage);
    }

    /// End the run as failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.stage = Stage::Failed;
        self.history.push(Stage::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_chain_reaches_completed() {
        let mut stage = Stage::PmAnalysis;
        let mut hops = 0;
        while let Some(next) = stage.next() {
            stage = next;
            hops += 1;
        }
        assert_eq!(stage, Stage::Completed);
        assert_eq!(hops, 9);
    }

    #[test]
    fn test_terminals_have_no_successor() {
        assert!(Stage::Completed.next().is_none());
        assert!(Stage::Failed.next().is_none());
        assert!(Stage::Completed.is_terminal());
        assert!(!Stage::TechleadReview.is_terminal());
    }

    #[test]
    fn test_stage_display_is_snake_case() {
        assert_eq!(Stage::PmAnalysis.to_string(), "pm_analysis");
        assert_eq!(Stage::AuditorAcceptance.to_string(), "auditor_acceptance");
    }

    #[test]
    fn test_state_records_artifacts_and_history() {
        let mut state = WorkflowState::new("build a parser");
        state.enter(Stage::PmAnalysis);
        state.record_artifact(Stage::PmAnalysis, "analysis text");
        state.enter(Stage::ArchitectDesign);

        assert_eq!(state.artifact(Stage::PmAnalysis), Some("analysis text"));
        assert_eq!(state.artifact(Stage::ArchitectDesign), None);
        assert_eq!(
            state.history,
            vec![Stage::PmAnalysis, Stage::ArchitectDesign]
        );
    }

    #[test]
    fn test_fail_sets_terminal_and_reason() {
        let mut state = WorkflowState::new("req");
        state.enter(Stage::RunnerExecution);
        state.fail("execution returned a non-zero exit code");
        assert_eq!(state.stage, Stage::Failed);
        assert_eq!(
            state.failure.as_deref(),
            Some("execution returned a non-zero exit code")
        );
    }
}
