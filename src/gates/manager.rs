//! Quality gate manager: the closed registry of gate implementations.
//!
//! Built once from the configured thresholds and shared read-only across
//! runs. `run_gates` evaluates a step's declared gates in order and
//! `overall_score` blends the results by declared weight.

use std::collections::HashMap;

use super::alignment::AlignmentGate;
use super::continuity::ContinuityGate;
use super::mix_balance::MixBalanceGate;
use super::standards::StandardsGate;
use super::structural::StructuralGate;
use super::uniqueness::UniquenessGate;
use super::{GateContext, GateName, GateSpec, GateThresholds, QualityGate, QualityGateResult};

/// Registry of the six gate categories.
pub struct QualityGateManager {
    gates: HashMap<GateName, Box<dyn QualityGate>>,
}

impl QualityGateManager {
    /// Build the full registry from per-gate thresholds.
    pub fn new(thresholds: &GateThresholds) -> Self {
        let mut gates: HashMap<GateName, Box<dyn QualityGate>> = HashMap::new();
        gates.insert(
            GateName::Uniqueness,
            Box::new(UniquenessGate::new(thresholds.uniqueness)),
        );
        gates.insert(
            GateName::MixBalance,
            Box::new(MixBalanceGate::new(thresholds.mix_balance)),
        );
        gates.insert(
            GateName::Continuity,
            Box::new(ContinuityGate::new(thresholds.continuity)),
        );
        gates.insert(
            GateName::Structural,
            Box::new(StructuralGate::new(thresholds.structural)),
        );
        gates.insert(
            GateName::Standards,
            Box::new(StandardsGate::new(thresholds.standards)),
        );
        gates.insert(
            GateName::Alignment,
            Box::new(AlignmentGate::new(thresholds.alignment)),
        );
        Self { gates }
    }

    /// Evaluate the step's declared gates in order.
    ///
    /// Gates are pure: identical payload and context yield identical
    /// results on every call.
    pub fn run_gates(
        &self,
        specs: &[GateSpec],
        ctx: &GateContext<'_>,
    ) -> Vec<QualityGateResult> {
        specs
            .iter()
            .map(|spec| {
                let gate = self
                    .gates
                    .get(&spec.name)
                    .expect("closed gate set covers every GateName");
                gate.evaluate(ctx)
            })
            .collect()
    }

    /// Weighted mean of gate scores per the step's declared weights.
    pub fn overall_score(specs: &[GateSpec], results: &[QualityGateResult]) -> f64 {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for (spec, result) in specs.iter().zip(results) {
            weighted += spec.weight * result.score;
            total_weight += spec.weight;
        }
        if total_weight == 0.0 {
            return 1.0;
        }
        weighted / total_weight
    }

    /// Names of required gates that did not pass.
    pub fn required_failures(
        specs: &[GateSpec],
        results: &[QualityGateResult],
    ) -> Vec<GateName> {
        specs
            .iter()
            .zip(results)
            .filter(|(spec, result)| spec.required && !result.passed)
            .map(|(spec, _)| spec.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::tests_support::{gate_ctx, run_config};
    use serde_json::json;

    #[test]
    fn test_run_gates_in_declared_order() {
        let manager = QualityGateManager::new(&GateThresholds::default());
        let payload = json!({"ideas": [{"title": "One"}]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("topic-ideas-front", &payload, "", &prior, &run);

        let specs = [
            GateSpec::required(GateName::Uniqueness),
            GateSpec::optional(GateName::Standards),
        ];
        let results = manager.run_gates(&specs, &ctx);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].gate, GateName::Uniqueness);
        assert_eq!(results[1].gate, GateName::Standards);
    }

    #[test]
    fn test_idempotent_scoring() {
        let manager = QualityGateManager::new(&GateThresholds::default());
        let payload = json!({"entries": [
            {"title": "A", "description": "Short.", "objective": "grow-newsletter"}
        ]});
        let run = run_config();
        let prior = vec![(
            "topic-ideas-front".to_string(),
            json!({"ideas": [{"title": "A"}]}),
        )];
        let ctx = gate_ctx("daily-entries", &payload, "pillars: a", &prior, &run);

        let specs = [
            GateSpec::required(GateName::Uniqueness),
            GateSpec::required(GateName::Standards),
            GateSpec::optional(GateName::Alignment),
        ];

        let first = manager.run_gates(&specs, &ctx);
        let second = manager.run_gates(&specs, &ctx);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.score, b.score);
            assert_eq!(a.passed, b.passed);
            assert_eq!(a.findings, b.findings);
        }
    }

    #[test]
    fn test_overall_score_equal_weights() {
        let specs = [
            GateSpec::required(GateName::Uniqueness),
            GateSpec::required(GateName::Standards),
        ];
        let results = vec![
            QualityGateResult::new(GateName::Uniqueness, 1.0, 0.7, vec![]),
            QualityGateResult::new(GateName::Standards, 0.5, 0.8, vec![]),
        ];
        let overall = QualityGateManager::overall_score(&specs, &results);
        assert!((overall - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overall_score_weighted() {
        let specs = [
            GateSpec::required(GateName::Structural).with_weight(2.0),
            GateSpec::optional(GateName::Standards),
        ];
        let results = vec![
            QualityGateResult::new(GateName::Structural, 1.0, 1.0, vec![]),
            QualityGateResult::new(GateName::Standards, 0.4, 0.8, vec![]),
        ];
        let overall = QualityGateManager::overall_score(&specs, &results);
        assert!((overall - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overall_score_no_gates() {
        assert_eq!(QualityGateManager::overall_score(&[], &[]), 1.0);
    }

    #[test]
    fn test_required_failures() {
        let specs = [
            GateSpec::required(GateName::Uniqueness),
            GateSpec::optional(GateName::Alignment),
        ];
        let results = vec![
            QualityGateResult::new(GateName::Uniqueness, 0.2, 0.7, vec![]),
            QualityGateResult::new(GateName::Alignment, 0.2, 0.7, vec![]),
        ];

        let failures = QualityGateManager::required_failures(&specs, &results);
        assert_eq!(failures, vec![GateName::Uniqueness]);
    }
}
