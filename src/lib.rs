//! CodeCrew - Multi-Role Coding Pipeline Orchestrator
//!
//! An orchestration core that turns a natural-language requirement into
//! executed, audited code by coordinating five collaborator roles: a
//! planner, a generator, an executor, an auditor and a post-mortem
//! analyst. Collaborators are trait objects, so the core runs the same
//! against an LLM CLI transport or against mocks.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`task`] - Task, plan and result data model
//! - [`collab`] - Collaborator contracts and their LLM/shell implementations
//! - [`worker`] - Generate/execute/diagnose retry state machine for one task
//! - [`controller`] - Priority-ordered task loop with audit-driven replanning
//! - [`workflow`] - Staged role pipeline with review loop-back
//! - [`sandbox`] - Isolated scratch directory for generated code
//! - [`config`] - Settings loading and validation
//! - [`error`] - Custom error types and handling
//! - [`testing`] - Testing infrastructure (mock collaborators)
//!
//! # Example
//!
//! ```rust,ignore
//! use codecrew::collab::{CliGenerator, LlmAuditor, LlmPlanner, ShellExecutor};
//! use codecrew::config::CrewConfig;
//! use codecrew::controller::TaskLoopController;
//! use codecrew::worker::Worker;
//! use std::sync::Arc;
//!
//! let config = CrewConfig::load(".")?;
//! let generator = Arc::new(CliGenerator::new(config.llm.clone(), "."));
//! let executor = Arc::new(ShellExecutor::new("."));
//!
//! let controller = TaskLoopController::new(
//!     Arc::new(LlmPlanner::new(generator.clone())),
//!     Worker::new(generator.clone(), executor, config.engine.clone()),
//!     Arc::new(LlmAuditor::new(generator)),
//!     config.engine.clone(),
//! );
//! let report = controller.run("build a CSV de-duplicator").await?;
//! ```

pub mod abort;
pub mod collab;
pub mod config;
pub mod controller;
pub mod error;
pub mod sandbox;
pub mod task;
pub mod testing;
pub mod worker;
pub mod workflow;

// Re-export commonly used types
pub use error::{CrewError, Result};

pub use abort::AbortFlag;

pub use config::{CrewConfig, EngineConfig, LlmCliConfig, SETTINGS_FILENAME};

pub use task::{
    AuditResult, AuditStatus, ExecutionResult, PlanStatus, Task, TaskPlan, TaskPriority,
    TaskStatus,
};

pub use collab::{
    Auditor, CliGenerator, CommandExecutor, Generator, LlmAuditor, LlmPlanner, LlmPostMortem,
    PayloadKind, PlannedTask, Planner, PostMortem, ShellExecutor,
};

pub use controller::{RunReport, RunStatus, TaskLoopController};

pub use worker::{Worker, WorkerOutcome};

pub use workflow::{Stage, WorkflowReport, WorkflowScheduler, WorkflowState};

pub use sandbox::SandboxManager;

// Re-export mock collaborators for downstream integration tests
pub use testing::{MockAuditor, MockExecutor, MockGenerator, MockPlanner, MockPostMortem};
