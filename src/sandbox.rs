//! Isolated execution sandbox.
//!
//! A scratch directory exclusively owned by one run. `init` rebuilds it
//! from scratch and seeds it with whitelisted project files, generated code
//! runs inside it through a [`CommandExecutor`], and `deploy` promotes
//! vetted files back into the project with a backup of anything it would
//! overwrite.

use crate::collab::{CommandExecutor, PayloadKind};
use crate::error::{CrewError, Result};
use crate::task::ExecutionResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Project files seeded into a fresh sandbox when present.
pub const DEFAULT_SEED_FILES: &[&str] = &["requirements.txt", "codecrew.json"];

/// Manages one run's scratch directory.
pub struct SandboxManager {
    project_dir: PathBuf,
    sandbox_dir: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl SandboxManager {
    /// Create a manager for the given project. A relative sandbox path is
    /// resolved against the project directory.
    #[must_use]
    pub fn new(
        project_dir: impl Into<PathBuf>,
        sandbox_dir: impl AsRef<Path>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let project_dir = project_dir.into();
        let sandbox_dir = if sandbox_dir.as_ref().is_absolute() {
            sandbox_dir.as_ref().to_path_buf()
        } else {
            project_dir.join(sandbox_dir.as_ref())
        };
        Self {
            project_dir,
            sandbox_dir,
            executor,
        }
    }

    /// The sandbox root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.sandbox_dir
    }

    /// Rebuild the sandbox from scratch and seed it with the named project
    /// files. Missing seeds are skipped.
    pub fn init(&self, seed_files: &[&str]) -> Result<()> {
        if self.sandbox_dir.exists() {
            std::fs::remove_dir_all(&self.sandbox_dir)
                .map_err(|e| CrewError::sandbox(format!("cannot clear sandbox: {e}")))?;
        }
        std::fs::create_dir_all(&self.sandbox_dir)
            .map_err(|e| CrewError::sandbox(format!("cannot create sandbox: {e}")))?;

        for name in seed_files {
            let source = self.project_dir.join(name);
            if !source.is_file() {
                debug!(file = name, "seed file absent, skipping");
                continue;
            }
            std::fs::copy(&source, self.sandbox_dir.join(name))
                .map_err(|e| CrewError::sandbox(format!("cannot seed {name}: {e}")))?;
        }
        info!(dir = %self.sandbox_dir.display(), "sandbox initialized");
        Ok(())
    }

    /// Write generated code into the sandbox.
    pub fn write_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.sandbox_dir.join(name);
        std::fs::write(&path, content)
            .map_err(|e| CrewError::sandbox(format!("cannot write {name}: {e}")))?;
        Ok(path)
    }

    /// Execute a payload inside the sandbox.
    pub async fn run(
        &self,
        payload: &str,
        kind: PayloadKind,
        timeout: Duration,
    ) -> ExecutionResult {
        self.executor.execute(payload, kind, timeout).await
    }

    /// Promote sandbox files into the project. An existing destination is
    /// first renamed to `<name>.bak`. Returns the deployed project paths;
    /// a named file missing from the sandbox is an error before anything
    /// is touched.
    pub fn deploy(&self, files: &[&str]) -> Result<Vec<PathBuf>> {
        for name in files {
            if !self.sandbox_dir.join(name).is_file() {
                return Err(CrewError::sandbox(format!(
                    "cannot deploy {name}: not present in sandbox"
                )));
            }
        }

        let mut deployed = Vec::with_capacity(files.len());
        for name in files {
            let source = self.sandbox_dir.join(name);
            let target = self.project_dir.join(name);
            if target.exists() {
                let backup = self.project_dir.join(format!("{name}.bak"));
                std::fs::rename(&target, &backup)
                    .map_err(|e| CrewError::sandbox(format!("cannot back up {name}: {e}")))?;
                warn!(file = name, "existing file backed up before deploy");
            }
            std::fs::copy(&source, &target)
                .map_err(|e| CrewError::sandbox(format!("cannot deploy {name}: {e}")))?;
            deployed.push(target);
        }
        info!(count = deployed.len(), "sandbox files deployed");
        Ok(deployed)
    }
}
