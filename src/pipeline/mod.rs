//! Pipeline orchestration for calendar generation.
//!
//! This module hosts the run-level machinery around the step catalog:
//!
//! - **Config**: process-level [`PipelineConfig`] and per-run `RunConfig`
//! - **PhaseRunner**: ordered (and selectively concurrent) step execution
//! - **Orchestrator**: the run state machine and artifact assembly
//! - **ErrorHandler**: phase-keyed recovery policy
//! - **ProgressTracker**: observer stream for the calling layer
//!
//! # Pipeline Flow
//!
//! 1. **Input capture**: the source registry resolves every data source
//!    into one immutable snapshot
//! 2. **Phase execution**: Foundation, Structure, Content, Optimization
//!    run in order; each step's validated output is appended to context
//! 3. **Quality gating**: every output is scored by its declared gates
//! 4. **Recovery**: failures are retried, degraded, skipped, or abort the
//!    run per the phase policy
//! 5. **Assembly**: step payloads merge into the composite calendar with
//!    an attached quality report

pub mod config;
pub mod orchestrator;
pub mod phase;
pub mod policy;
pub mod progress;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use config::{ConfigError, PipelineConfig, RunConfig};
pub use orchestrator::{Orchestrator, PipelineError, RunOutcome, RunState, RunStatus};
pub use phase::{PhaseReport, PhaseRunner};
pub use policy::{ErrorHandler, RecoveryAction};
pub use progress::{ProgressEvent, ProgressSnapshot, ProgressTracker};

/// Run-scoped cancellation signal.
///
/// Cancellation is cooperative: in-flight AI attempts finish, no further
/// attempt starts, and the run transitions to Aborted with partial context
/// retained.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());

        // Idempotent.
        token.cancel();
        assert!(token.is_cancelled());
    }
}
