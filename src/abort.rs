//! Run cancellation flag.
//!
//! A cheap, cloneable flag the front-end sets (e.g. from a Ctrl-C handler)
//! and the orchestration core checks at every suspension point: before each
//! task dispatch and before each workflow stage. Aborting between
//! suspension points leaves `TaskPlan`/`WorkflowState` consistent; no
//! partially-written artifact is produced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag for one run.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag {
    flag: Arc<AtomicBool>,
}

impl AbortFlag {
    /// Create an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_flag_starts_unset() {
        let flag = AbortFlag::new();
        assert!(!flag.is_aborted());
    }

    #[test]
    fn test_abort_is_visible_through_clones() {
        let flag = AbortFlag::new();
        let clone = flag.clone();
        clone.abort();
        assert!(flag.is_aborted());
        // Idempotent.
        flag.abort();
        assert!(flag.is_aborted());
    }
}
