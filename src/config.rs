//! Configuration loading and validation.
//!
//! All tunables live in an explicit [`CrewConfig`] injected into each
//! component at construction. There is no process-wide mutable state:
//! the controller, worker and scheduler each receive the configuration
//! (or the slice of it they need) when they are built.

use crate::error::{CrewError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings filename searched for in the project directory.
pub const SETTINGS_FILENAME: &str = "codecrew.json";

/// Engine tunables for the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry budget per task inside the worker state machine.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Subprocess timeout for task code, in seconds.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// Subprocess timeout for dependency installation, in seconds.
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,

    /// Hard cap on queue replans per run; exceeding it fails the run.
    #[serde(default = "default_max_replans")]
    pub max_replans: u32,

    /// Hard cap on review/implementation loop-backs per run.
    #[serde(default = "default_max_review_cycles")]
    pub max_review_cycles: u32,

    /// Advertised parallel task count. The sequential core does not use
    /// it; kept for settings-file compatibility.
    #[serde(default = "default_parallel_tasks")]
    pub parallel_tasks: u32,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_task_timeout() -> u64 {
    30
}

fn default_install_timeout() -> u64 {
    600
}

fn default_max_replans() -> u32 {
    5
}

fn default_max_review_cycles() -> u32 {
    3
}

fn default_parallel_tasks() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            task_timeout_secs: default_task_timeout(),
            install_timeout_secs: default_install_timeout(),
            max_replans: default_max_replans(),
            max_review_cycles: default_max_review_cycles(),
            parallel_tasks: default_parallel_tasks(),
        }
    }
}

impl EngineConfig {
    /// Task timeout as a [`Duration`].
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Install timeout as a [`Duration`].
    #[must_use]
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

/// Configuration for the LLM CLI the generation collaborator shells out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCliConfig {
    /// Executable to spawn; the prompt is piped to its stdin.
    #[serde(default = "default_llm_command")]
    pub command: String,

    /// Extra arguments passed before the prompt.
    #[serde(default)]
    pub args: Vec<String>,

    /// Human-readable model label used in logs.
    #[serde(default = "default_model_label")]
    pub model: String,
}

fn default_llm_command() -> String {
    "claude".to_string()
}

fn default_model_label() -> String {
    "claude".to_string()
}

impl Default for LlmCliConfig {
    fn default() -> Self {
        Self {
            command: default_llm_command(),
            args: vec!["-p".to_string(), "--output-format".to_string(), "text".to_string()],
            model: default_model_label(),
        }
    }
}

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub llm: LlmCliConfig,

    /// Directory stage handlers write artifacts (designs, code, tests) into.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Scratch directory exclusively owned by one run at a time.
    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: PathBuf,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("_artifacts")
}

fn default_sandbox_dir() -> PathBuf {
    PathBuf::from("_sandbox")
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            llm: LlmCliConfig::default(),
            artifacts_dir: default_artifacts_dir(),
            sandbox_dir: default_sandbox_dir(),
        }
    }
}

impl CrewConfig {
    /// Load configuration from `<project_dir>/codecrew.json`, falling back
    /// to defaults when the file does not exist.
    ///
    /// Environment overrides: `CODECREW_ARTIFACTS_DIR` and
    /// `CODECREW_SANDBOX_DIR` replace the corresponding paths when set.
    pub fn load(project_dir: impl AsRef<Path>) -> Result<Self> {
        let path = project_dir.as_ref().join(SETTINGS_FILENAME);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| CrewError::config_with_path(e.to_string(), path.clone()))?;
            serde_json::from_str(&contents)
                .map_err(|e| CrewError::config_with_path(e.to_string(), path.clone()))?
        } else {
            Self::default()
        };

        if let Ok(dir) = std::env::var("CODECREW_ARTIFACTS_DIR") {
            config.artifacts_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CODECREW_SANDBOX_DIR") {
            config.sandbox_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Cross-run lessons file in the per-user data directory. Falls back
    /// to the artifacts directory when no data directory exists.
    #[must_use]
    pub fn lessons_path(&self) -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("codecrew").join("lessons.md"))
            .unwrap_or_else(|| self.artifacts_dir.join("lessons.md"))
    }

    /// Validate budget fields. Zero retry or timeout budgets would make the
    /// worker terminate before its first attempt, so they are rejected here
    /// rather than at dispatch time.
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_attempts == 0 {
            return Err(CrewError::InvalidConfig {
                field: "engine.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine.task_timeout_secs == 0 {
            return Err(CrewError::InvalidConfig {
                field: "engine.task_timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine.max_replans == 0 {
            return Err(CrewError::InvalidConfig {
                field: "engine.max_replans".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine.max_review_cycles == 0 {
            return Err(CrewError::InvalidConfig {
                field: "engine.max_review_cycles".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.llm.command.trim().is_empty() {
            return Err(CrewError::InvalidConfig {
                field: "llm.command".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
