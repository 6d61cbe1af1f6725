//! Professional-standards gate: depth, placeholders, required fields.
//!
//! Heuristic checks that the payload reads like finished work: no
//! placeholder text anywhere, description bodies carry minimum depth, and
//! titled entries are non-empty. Score = passed checks / total checks.

use serde_json::Value;

use super::payload::{collect_descriptions, collect_titles};
use super::{GateContext, GateName, QualityGate, QualityGateResult};

/// Minimum characters for a description to count as substantive.
const MIN_DESCRIPTION_CHARS: usize = 40;

/// Tokens that mark unfinished text.
const PLACEHOLDER_TOKENS: [&str; 5] = ["lorem ipsum", "tbd", "todo", "placeholder", "xxx"];

/// Heuristic finished-work checks.
pub struct StandardsGate {
    threshold: f64,
}

impl StandardsGate {
    /// Create the gate with its pass threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    fn contains_placeholder(text: &str) -> Option<&'static str> {
        let lowered = text.to_lowercase();
        PLACEHOLDER_TOKENS
            .iter()
            .find(|token| lowered.contains(*token))
            .copied()
    }

    /// Collect every string value in the payload.
    fn all_strings(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(text) => out.push(text.clone()),
            Value::Array(items) => items.iter().for_each(|v| Self::all_strings(v, out)),
            Value::Object(map) => map.values().for_each(|v| Self::all_strings(v, out)),
            _ => {}
        }
    }
}

impl QualityGate for StandardsGate {
    fn name(&self) -> GateName {
        GateName::Standards
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> QualityGateResult {
        let mut findings = Vec::new();
        let mut checks = 0usize;
        let mut passed = 0usize;

        // Check 1: no placeholder text anywhere in the payload.
        let mut strings = Vec::new();
        Self::all_strings(ctx.payload, &mut strings);
        checks += 1;
        let mut clean = true;
        for text in &strings {
            if let Some(token) = Self::contains_placeholder(text) {
                clean = false;
                findings.push(format!("placeholder text '{token}' in: '{text}'"));
            }
        }
        if clean {
            passed += 1;
        }

        // Check 2: each description carries minimum depth.
        for description in collect_descriptions(ctx.payload) {
            checks += 1;
            if description.trim().chars().count() >= MIN_DESCRIPTION_CHARS {
                passed += 1;
            } else {
                findings.push(format!(
                    "description under {MIN_DESCRIPTION_CHARS} chars: '{description}'"
                ));
            }
        }

        // Check 3: titles are non-empty.
        for title in collect_titles(ctx.payload) {
            checks += 1;
            if title.trim().is_empty() {
                findings.push("empty title".to_string());
            } else {
                passed += 1;
            }
        }

        QualityGateResult::new(
            GateName::Standards,
            passed as f64 / checks as f64,
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
    fn test_finished_payload_passes() {
        let payload = json!({"entries": [{
            "title": "Why content pipelines fail",
            "description": "A detailed walkthrough of the three most common pipeline failure modes and how to catch them early."
        }]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("daily-entries", &payload, "", &prior, &run);

        let result = StandardsGate::new(0.80).evaluate(&ctx);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!(result.passed);
    }

    #[test]
    fn test_placeholder_text_flagged() {
        let payload = json!({"entries": [{
            "title": "TBD",
            "description": "A detailed walkthrough of the three most common pipeline failure modes and how to catch them."
        }]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("daily-entries", &payload, "", &prior, &run);

        let result = StandardsGate::new(0.80).evaluate(&ctx);
        assert!(!result.passed);
        assert!(result.findings.iter().any(|f| f.contains("tbd")));
    }

    #[test]
    fn test_shallow_description_flagged() {
        let payload = json!({"entries": [{
            "title": "Good title",
            "description": "Short."
        }]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("daily-entries", &payload, "", &prior, &run);

        let result = StandardsGate::new(0.80).evaluate(&ctx);
        // 3 checks: placeholders pass, description fails, title passes.
        assert!((result.score - 2.0 / 3.0).abs() < 1e-9);
        assert!(!result.passed);
    }

    #[test]
    fn test_empty_title_flagged() {
        let payload = json!({"ideas": [{"title": "  "}]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("topic-ideas-front", &payload, "", &prior, &run);

        let result = StandardsGate::new(0.80).evaluate(&ctx);
        assert!(result.findings.iter().any(|f| f.contains("empty title")));
    }

    #[test]
    fn test_deterministic_scoring() {
        let payload = json!({"entries": [{"title": "A", "description": "Short."}]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("daily-entries", &payload, "", &prior, &run);

        let gate = StandardsGate::new(0.80);
        let first = gate.evaluate(&ctx);
        let second = gate.evaluate(&ctx);
        assert_eq!(first.score, second.score);
        assert_eq!(first.findings, second.findings);
    }
}
