//! Mix-balance gate: content-type distribution against target ratios.
//!
//! Compares the payload's declared content-type distribution with the
//! run's targets. Score = 1 − maximum deviation from any target; ceiling
//! violations are reported as findings.

use super::payload::{collect_type_counts, normalize};
use super::{GateContext, GateName, QualityGate, QualityGateResult};

/// Validates the payload's content-type distribution.
pub struct MixBalanceGate {
    threshold: f64,
}

impl MixBalanceGate {
    /// Create the gate with its pass threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl QualityGate for MixBalanceGate {
    fn name(&self) -> GateName {
        GateName::MixBalance
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> QualityGateResult {
        let counts = collect_type_counts(ctx.payload);
        let total: usize = counts.iter().map(|(_, n)| n).sum();

        if ctx.run.mix_targets.is_empty() || total == 0 {
            // Nothing to balance against: untyped payloads pass untouched.
            return QualityGateResult::new(GateName::MixBalance, 1.0, self.threshold, vec![]);
        }

        let mut findings = Vec::new();
        let mut max_deviation: f64 = 0.0;

        for target in &ctx.run.mix_targets {
            let key = normalize(&target.content_type);
            let actual = counts
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, n)| *n as f64 / total as f64)
                .unwrap_or(0.0);

            let deviation = (actual - target.target_ratio).abs();
            max_deviation = max_deviation.max(deviation);

            if actual > target.effective_ceiling() {
                findings.push(format!(
                    "'{}' holds {:.0}% of entries, above its {:.0}% ceiling",
                    target.content_type,
                    actual * 100.0,
                    target.effective_ceiling() * 100.0
                ));
            } else if deviation > 0.10 {
                findings.push(format!(
                    "'{}' at {:.0}% vs {:.0}% target",
                    target.content_type,
                    actual * 100.0,
                    target.target_ratio * 100.0
                ));
            }
        }

        QualityGateResult::new(
            GateName::MixBalance,
            1.0 - max_deviation,
            self.threshold,
            findings,
        )
    }
}
