//! Structural-conformance gate: exact duration/count constraints.
//!
//! The calendar must cover exactly the requested number of weeks and
//! slots. Binary: any declared count that misses its requested value
//! zeroes the score.

use serde_json::Value;

use super::{GateContext, GateName, QualityGate, QualityGateResult};

/// Validates exact week/slot counts against the run config.
pub struct StructuralGate {
    threshold: f64,
}

impl StructuralGate {
    /// Create the gate with its pass threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl QualityGate for StructuralGate {
    fn name(&self) -> GateName {
        GateName::Structural
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> QualityGateResult {
        let expected_weeks = ctx.run.calendar_weeks as usize;
        let expected_slots = ctx.run.total_slots();
        let mut findings = Vec::new();
        let mut checked = false;

        if let Some(weeks) = ctx.payload.get("weeks").and_then(Value::as_array) {
            checked = true;
            if weeks.len() != expected_weeks {
                findings.push(format!(
                    "payload has {} weeks, run requested {expected_weeks}",
                    weeks.len()
                ));
            }
        }

        if let Some(count) = ctx.payload.get("weeks_count").and_then(Value::as_u64) {
            checked = true;
            if count as usize != expected_weeks {
                findings.push(format!(
                    "weeks_count is {count}, run requested {expected_weeks}"
                ));
            }
        }

        if let Some(entries) = ctx.payload.get("entries").and_then(Value::as_array) {
            checked = true;
            if entries.len() != expected_slots {
                findings.push(format!(
                    "payload has {} entries, run requested {expected_slots}",
                    entries.len()
                ));
            }
        }

        if !checked {
            findings.push("payload declares no week or entry counts to verify".to_string());
        }

        let score = if findings.is_empty() { 1.0 } else { 0.0 };
        QualityGateResult::new(GateName::Structural, score, self.threshold, findings)
    }
}
