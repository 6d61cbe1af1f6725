//! Objective-alignment gate: payload maps to business objectives.
//!
//! Every run is commissioned against caller-supplied objectives/KPIs. A
//! payload that references none of them is decoration, not strategy. Score
//! is the fraction of the payload's objective references that resolve to a
//! configured objective; a payload with no references at all scores zero.

use super::payload::{collect_objective_refs, normalize};
use super::{GateContext, GateName, QualityGate, QualityGateResult};

/// Checks explicit mapping to at least one configured objective.
pub struct AlignmentGate {
    threshold: f64,
}

impl AlignmentGate {
    /// Create the gate with its pass threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl QualityGate for AlignmentGate {
    fn name(&self) -> GateName {
        GateName::Alignment
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> QualityGateResult {
        let refs = collect_objective_refs(ctx.payload);

        if refs.is_empty() {
            return QualityGateResult::new(
                GateName::Alignment,
                0.0,
                self.threshold,
                vec!["payload maps to no business objective".to_string()],
            );
        }

        let known: Vec<String> = ctx
            .run
            .objectives
            .iter()
            .map(|o| normalize(&o.name))
            .collect();

        let mut findings = Vec::new();
        let mut resolved = 0usize;

        for reference in &refs {
            if known.contains(&normalize(reference)) {
                resolved += 1;
            } else {
                findings.push(format!("unknown objective '{reference}'"));
            }
        }

        QualityGateResult::new(
            GateName::Alignment,
            resolved as f64 / refs.len() as f64,
            self.threshold,
            findings,
        )
    }
}
