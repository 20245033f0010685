//! Workflow stage driver.
//!
//! Drives [`Stage`](super::Stage) transitions over the collaborator
//! contracts. A failed review loops back to implementation (capped); any
//! other stage failure short-circuits to the failed terminal. Finalization
//! always runs the post-mortem exactly once and writes the stage artifacts
//! to disk; artifact write failures degrade to warnings.

use crate::abort::AbortFlag;
use crate::collab::{cleaning, Auditor, CommandExecutor, Generator, PayloadKind, PostMortem};
use crate::config::CrewConfig;
use crate::error::{CrewError, Result};
use crate::task::AuditStatus;
use crate::worker::detect_install_command;
use crate::workflow::{Stage, WorkflowState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ANALYSIS_PROMPT: &str = "You are a project manager. Break down the following requirement \
     into concrete deliverables, constraints and acceptance criteria.\n\nRequirement:\n";

const DESIGN_PROMPT: &str = "You are a software architect. Produce a short technical design \
     (components, data flow, interfaces) for the analysed requirement below.\n\n";

const IMPLEMENT_PROMPT: &str = "You are a senior developer. Write the code that implements the \
     design below. Reply with code only, no commentary.\n\n";

const QA_PROMPT: &str = "You are a QA engineer. Write an executable smoke test for the \
     implementation below. Reply with code only, no commentary.\n\n";

/// Outcome of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub requirement: String,
    /// Terminal stage, `Completed` or `Failed`.
    pub final_stage: Stage,
    /// Stages entered, in order, including loop-back repeats.
    pub stages_run: Vec<Stage>,
    /// Review loop-backs consumed.
    pub review_cycles: u32,
    /// Stage artifacts, keyed by stage name.
    pub artifacts: BTreeMap<String, String>,
    /// Reason the run failed, when it did.
    pub failure: Option<String>,
    /// Whether the post-mortem collaborator stored its analysis.
    pub post_mortem_stored: bool,
}

impl WorkflowReport {
    /// Whether the run reached the completed terminal.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.final_stage == Stage::Completed
    }
}

/// Drives one requirement through the full role pipeline.
pub struct WorkflowScheduler {
    generator: Arc<dyn Generator>,
    auditor: Arc<dyn Auditor>,
    executor: Arc<dyn CommandExecutor>,
    post_mortem: Arc<dyn PostMortem>,
    config: CrewConfig,
    artifacts_dir: PathBuf,
    abort: AbortFlag,
}

impl WorkflowScheduler {
    /// Create a scheduler over the given collaborators.
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generator>,
        auditor: Arc<dyn Auditor>,
        executor: Arc<dyn CommandExecutor>,
        post_mortem: Arc<dyn PostMortem>,
        config: CrewConfig,
    ) -> Self {
        let artifacts_dir = config.artifacts_dir.clone();
        Self {
            generator,
            auditor,
            executor,
            post_mortem,
            config,
            artifacts_dir,
            abort: AbortFlag::new(),
        }
    }

    /// Use an externally-owned abort flag.
    #[must_use]
    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    /// Write stage artifacts under this directory instead of the configured
    /// default.
    #[must_use]
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    /// Run a requirement through every stage.
    ///
    /// Both terminals produce an `Ok` report; the post-mortem runs exactly
    /// once before either is returned. Exhausting the review loop-back cap
    /// is an ordinary failed run, not an error.
    ///
    /// # Errors
    ///
    /// - [`CrewError::Aborted`] when cancellation is observed between
    ///   stages; a cancelled run does not finalize and the post-mortem
    ///   does not fire.
    pub async fn run(&self, requirement: &str) -> Result<WorkflowReport> {
        let mut state = WorkflowState::new(requirement);
        info!(requirement, "workflow starting");

        self.drive(&mut state).await?;
        let post_mortem_stored = self.finalize(&state).await;

        Ok(WorkflowReport {
            requirement: state.requirement,
            final_stage: state.stage,
            stages_run: state.history,
            review_cycles: state.review_cycles,
            artifacts: state.artifacts,
            failure: state.failure,
            post_mortem_stored,
        })
    }

    /// Advance the stage machine until a terminal.
    async fn drive(&self, state: &mut WorkflowState) -> Result<()> {
        let mut stage = Stage::PmAnalysis;
        loop {
            if self.abort.is_aborted() {
                warn!(%stage, "workflow aborted");
                return Err(CrewError::aborted("workflow cancelled"));
            }
            state.enter(stage);
            info!(%stage, "entering stage");

            let next = match stage {
                Stage::PmAnalysis => self.run_analysis(state).await,
                Stage::ArchitectDesign => self.run_design(state).await,
                Stage::CoderImplementation => self.run_implementation(state).await,
                Stage::TechleadReview => self.run_review(state).await,
                Stage::RunnerExecution => self.run_execution(state).await,
                Stage::SysadminEnvironment => self.run_environment(state).await,
                Stage::QaTesting => self.run_qa(state).await,
                Stage::AuditorAcceptance => self.run_acceptance(state).await,
                Stage::EvolutionAnalysis => self.run_evolution(state),
                Stage::Completed | Stage::Failed => return Ok(()),
            };

            match next {
                Some(next_stage) => stage = next_stage,
                // The handler already moved the state to a terminal.
                None => return Ok(()),
            }
        }
    }

    async fn run_analysis(&self, state: &mut WorkflowState) -> Option<Stage> {
        let context = format!("{ANALYSIS_PROMPT}{}", state.requirement);
        match self.generator.analyze(&context).await {
            Ok(analysis) => {
                state.record_artifact(Stage::PmAnalysis, analysis);
                Stage::PmAnalysis.next()
            }
            Err(e) => {
                state.fail(format!("analysis failed: {e}"));
                None
            }
        }
    }

    async fn run_design(&self, state: &mut WorkflowState) -> Option<Stage> {
        let analysis = state.artifact(Stage::PmAnalysis).unwrap_or_default();
        let prompt = format!(
            "{DESIGN_PROMPT}Requirement:\n{}\n\nAnalysis:\n{analysis}",
            state.requirement
        );
        match self.generator.generate(&prompt).await {
            Ok(design) => {
                state.record_artifact(Stage::ArchitectDesign, design);
                Stage::ArchitectDesign.next()
            }
            Err(e) => {
                state.fail(format!("design failed: {e}"));
                None
            }
        }
    }

    async fn run_implementation(&self, state: &mut WorkflowState) -> Option<Stage> {
        let design = state.artifact(Stage::ArchitectDesign).unwrap_or_default();
        let mut prompt = format!(
            "{IMPLEMENT_PROMPT}Requirement:\n{}\n\nDesign:\n{design}",
            state.requirement
        );
        // Loop-back: the previous review verdict steers the rewrite.
        if let Some(review) = state.artifact(Stage::TechleadReview) {
            prompt.push_str("\n\nReview feedback to address:\n");
            prompt.push_str(review);
        }
        match self.generator.generate(&prompt).await {
            Ok(raw) => {
                let code = cleaning::strip_code_fences(&raw);
                state.record_artifact(Stage::CoderImplementation, code);
                Stage::CoderImplementation.next()
            }
            Err(e) => {
                state.fail(format!("implementation failed: {e}"));
                None
            }
        }
    }

    /// Review gate with a capped loop-back to implementation. Exhausting
    /// the cap fails the run through the ordinary terminal so finalization
    /// (post-mortem, artifact persistence) still happens.
    async fn run_review(&self, state: &mut WorkflowState) -> Option<Stage> {
        let code = state
            .artifact(Stage::CoderImplementation)
            .unwrap_or_default()
            .to_string();
        let verdict = self
            .auditor
            .audit("code review of the implementation", &code)
            .await;
        state.record_artifact(Stage::TechleadReview, verdict.feedback.clone());

        if verdict.status == AuditStatus::Pass {
            return Stage::TechleadReview.next();
        }

        let cap = self.config.engine.max_review_cycles;
        if state.review_cycles >= cap {
            warn!(cycles = state.review_cycles, "review loop-backs exhausted");
            state.fail(format!(
                "review cycles exhausted after {} loop-backs (cap: {cap}): {}",
                state.review_cycles, verdict.feedback
            ));
            return None;
        }
        state.review_cycles += 1;
        info!(cycle = state.review_cycles, "review failed, reworking");
        Some(Stage::CoderImplementation)
    }

    async fn run_execution(&self, state: &mut WorkflowState) -> Option<Stage> {
        let code = state
            .artifact(Stage::CoderImplementation)
            .unwrap_or_default()
            .to_string();
        let kind = PayloadKind::classify(&code);
        let result = self
            .executor
            .execute(&code, kind, self.config.engine.task_timeout())
            .await;
        state.record_artifact(Stage::RunnerExecution, result.output.clone());

        if result.success {
            Stage::RunnerExecution.next()
        } else {
            state.fail(format!("execution failed: {}", result.error));
            None
        }
    }

    /// Environment preparation is best-effort: a failed install is logged
    /// and recorded but never ends the run.
    async fn run_environment(&self, state: &mut WorkflowState) -> Option<Stage> {
        let code = state.artifact(Stage::CoderImplementation).unwrap_or_default();
        match detect_install_command(code) {
            Some(install) => {
                info!(command = %install, "preparing environment");
                let result = self
                    .executor
                    .execute(
                        &install,
                        PayloadKind::Command,
                        self.config.engine.install_timeout(),
                    )
                    .await;
                if !result.success {
                    warn!(command = %install, "environment preparation failed");
                }
                state.record_artifact(Stage::SysadminEnvironment, install);
            }
            None => {
                debug!("no environment preparation needed");
                state.record_artifact(Stage::SysadminEnvironment, "no installs required");
            }
        }
        Stage::SysadminEnvironment.next()
    }

    async fn run_qa(&self, state: &mut WorkflowState) -> Option<Stage> {
        let code = state.artifact(Stage::CoderImplementation).unwrap_or_default();
        let prompt = format!("{QA_PROMPT}Implementation:\n{code}");
        let raw = match self.generator.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                state.fail(format!("test generation failed: {e}"));
                return None;
            }
        };
        let tests = cleaning::strip_code_fences(&raw);
        let kind = PayloadKind::classify(&tests);
        let result = self
            .executor
            .execute(&tests, kind, self.config.engine.task_timeout())
            .await;
        state.record_artifact(Stage::QaTesting, result.output.clone());

        if result.success {
            Stage::QaTesting.next()
        } else {
            state.fail(format!("qa testing failed: {}", result.error));
            None
        }
    }

    async fn run_acceptance(&self, state: &mut WorkflowState) -> Option<Stage> {
        let summary = self.stage_summary(state);
        let verdict = self.auditor.audit(&state.requirement, &summary).await;
        state.record_artifact(Stage::AuditorAcceptance, verdict.feedback.clone());

        if verdict.status == AuditStatus::Pass {
            Stage::AuditorAcceptance.next()
        } else {
            state.fail(format!("acceptance rejected: {}", verdict.feedback));
            None
        }
    }

    /// Assemble the run summary artifact, then finish.
    fn run_evolution(&self, state: &mut WorkflowState) -> Option<Stage> {
        let summary = self.stage_summary(state);
        state.record_artifact(Stage::EvolutionAnalysis, summary);
        state.enter(Stage::Completed);
        None
    }

    /// Post-mortem plus artifact persistence. Runs once per run, after
    /// either terminal, and never fails the run.
    async fn finalize(&self, state: &WorkflowState) -> bool {
        let summary = self.stage_summary(state);
        let stored = self
            .post_mortem
            .analyze_and_store(&summary, &state.requirement)
            .await;
        if !stored {
            warn!("post-mortem analysis was not stored");
        }
        self.persist_artifacts(state);
        stored
    }

    fn persist_artifacts(&self, state: &WorkflowState) {
        if state.artifacts.is_empty() {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(&self.artifacts_dir) {
            warn!(dir = %self.artifacts_dir.display(), error = %e, "cannot create artifacts dir");
            return;
        }
        for (name, content) in &state.artifacts {
            let path = self.artifacts_dir.join(format!("{name}.md"));
            if let Err(e) = std::fs::write(&path, content) {
                warn!(path = %path.display(), error = %e, "artifact write failed");
            }
        }
    }

    fn stage_summary(&self, state: &WorkflowState) -> String {
        let mut summary = format!(
            "Requirement: {}\nFinal stage: {}\nReview cycles: {}\n\n",
            state.requirement, state.stage, state.review_cycles
        );
        for (name, content) in &state.artifacts {
            summary.push_str(&format!("## {name}\n{content}\n\n"));
        }
        if let Some(ref failure) = state.failure {
            summary.push_str(&format!("Failure: {failure}\n"));
        }
        summary
    }
}
