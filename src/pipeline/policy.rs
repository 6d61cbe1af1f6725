//! Failure-recovery policy, keyed by phase.
//!
//! Consulted by the phase runner whenever a step reaches a Failed status.
//! The table is fixed by design: everything downstream depends on the
//! Foundation phase, so its failures abort the run; Structure and Content
//! steps get one whole-step retry and then continue on a flagged
//! placeholder; Optimization steps are additive and are skipped outright.

use serde::{Deserialize, Serialize};

use crate::steps::Phase;

/// What the runner does with a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Re-execute the whole step once (distinct from the executor's
    /// internal retries).
    RetryStep,
    /// Substitute a minimal placeholder payload and continue, flagged in
    /// the final report.
    Degrade,
    /// Continue without the step's output.
    Skip,
    /// Terminate the run; partial context is preserved for diagnostics.
    Abort,
}

/// Phase-keyed policy table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandler;

impl ErrorHandler {
    /// Create the standard policy.
    pub fn new() -> Self {
        Self
    }

    /// Decide how to proceed after a failure. `step_retried` is true once
    /// the whole step has already been re-executed by the runner.
    pub fn decide(&self, phase: Phase, step_retried: bool) -> RecoveryAction {
        match phase {
            Phase::Foundation => RecoveryAction::Abort,
            Phase::Structure | Phase::Content => {
                if step_retried {
                    RecoveryAction::Degrade
                } else {
                    RecoveryAction::RetryStep
                }
            }
            Phase::Optimization => RecoveryAction::Skip,
        }
    }

    /// Decide and log the decision for post-run diagnosis.
    pub fn decide_logged(
        &self,
        phase: Phase,
        step_id: &str,
        error: &str,
        step_retried: bool,
    ) -> RecoveryAction {
        let action = self.decide(phase, step_retried);
        tracing::warn!(
            step_id,
            %phase,
            error,
            action = ?action,
            step_retried,
            "Step failed; applying recovery policy"
        );
        action
    }
}
