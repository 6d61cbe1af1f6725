//! Context-continuity gate: referenced entities must exist in context.
//!
//! A payload that names pillars, personas, or keywords that never appeared
//! in the context bundle it was given has drifted (or hallucinated). Score
//! is the fraction of referenced entities resolvable in the bundle text.

use super::payload::{collect_entity_refs, normalize};
use super::{GateContext, GateName, QualityGate, QualityGateResult};

/// Checks that payload entity references resolve in the context bundle.
pub struct ContinuityGate {
    threshold: f64,
}

impl ContinuityGate {
    /// Create the gate with its pass threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl QualityGate for ContinuityGate {
    fn name(&self) -> GateName {
        GateName::Continuity
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> QualityGateResult {
        let refs = collect_entity_refs(ctx.payload);

        if refs.is_empty() {
            // Nothing referenced, nothing to drift from.
            return QualityGateResult::new(GateName::Continuity, 1.0, self.threshold, vec![]);
        }

        let haystack = normalize(ctx.bundle_text);
        let mut findings = Vec::new();
        let mut resolved = 0usize;

        for entity in &refs {
            if haystack.contains(&normalize(entity)) {
                resolved += 1;
            } else {
                findings.push(format!("'{entity}' does not appear in the step's context"));
            }
        }

        QualityGateResult::new(
            GateName::Continuity,
            resolved as f64 / refs.len() as f64,
            self.threshold,
            findings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::tests_support::{gate_ctx, run_config};
    use serde_json::json;

    #[test]
    fn test_all_entities_resolve() {
        let payload = json!({"entries": [
            {"pillar": "Thought Leadership", "persona": "Staff Engineer"}
        ]});
        let bundle = "Pillars: Thought Leadership, Product.\nPersonas: Staff Engineer.";
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("daily-entries", &payload, bundle, &prior, &run);

        let result = ContinuityGate::new(0.70).evaluate(&ctx);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!(result.passed);
    }

    #[test]
    fn test_hallucinated_entity_lowers_score() {
        let payload = json!({"entries": [
            {"pillar": "Thought Leadership"},
            {"pillar": "Invented Pillar"}
        ]});
        let bundle = "Pillars: Thought Leadership.";
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("daily-entries", &payload, bundle, &prior, &run);

        let result = ContinuityGate::new(0.70).evaluate(&ctx);
        assert!((result.score - 0.5).abs() < f64::EPSILON);
        assert!(!result.passed);
        assert!(result.findings[0].contains("Invented Pillar"));
    }

    #[test]
    fn test_case_insensitive_resolution() {
        let payload = json!({"entries": [{"primary_keyword": "Rust Pipelines"}]});
        let bundle = "keywords: rust pipelines, llm orchestration";
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("keyword-mapping", &payload, bundle, &prior, &run);

        let result = ContinuityGate::new(0.70).evaluate(&ctx);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_no_references_passes() {
        let payload = json!({"framework": {"weeks_count": 4}});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("calendar-framework", &payload, "", &prior, &run);

        let result = ContinuityGate::new(0.70).evaluate(&ctx);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }
}
