//! Custom error types for codecrew.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the pipeline.
//! Nothing in the orchestration core terminates the process outright;
//! every failure path produces a value the caller inspects.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for codecrew operations
#[derive(Error, Debug)]
pub enum CrewError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Planning Errors
    // =========================================================================
    /// Planner produced no tasks for the requirement
    #[error("Planning produced no tasks for requirement: {requirement}")]
    EmptyPlan { requirement: String },

    /// Replanning cap reached without the failing task being repaired
    #[error("Replanning exhausted after {replans} replans (cap: {cap})")]
    ReplanLimit { replans: u32, cap: u32 },

    // =========================================================================
    // Workflow Errors
    // =========================================================================
    /// A stage handler reported failure
    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// A collaborator has no configured transport
    #[error("Collaborator '{name}' unavailable: {detail}")]
    CollaboratorUnavailable { name: String, detail: String },

    /// Subprocess execution failed outside the worker's bounded retry
    #[error("Execution failed: {message}")]
    Execution { message: String },

    // =========================================================================
    // Sandbox Errors
    // =========================================================================
    /// Sandbox setup or deploy failed
    #[error("Sandbox error: {message}")]
    Sandbox { message: String },

    // =========================================================================
    // Run Control
    // =========================================================================
    /// The run was cancelled at a suspension point
    #[error("Run aborted: {reason}")]
    Aborted { reason: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrewError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a stage failure error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a collaborator-unavailable error
    pub fn collaborator(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            name: name.into(),
            detail: detail.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Create a sandbox error
    pub fn sandbox(message: impl Into<String>) -> Self {
        Self::Sandbox {
            message: message.into(),
        }
    }

    /// Create an abort error
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recoverable within the same run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Execution { .. } | Self::CollaboratorUnavailable { .. } | Self::Sandbox { .. }
        )
    }

    /// Check if this error is fatal (the run cannot continue)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ReplanLimit { .. }
                | Self::EmptyPlan { .. }
                | Self::Aborted { .. }
                | Self::Config { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::EmptyPlan { .. } => 2,
            Self::ReplanLimit { .. } => 3,
            Self::Stage { .. } => 5,
            Self::Aborted { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for codecrew results
pub type Result<T> = std::result::Result<T, CrewError>;
