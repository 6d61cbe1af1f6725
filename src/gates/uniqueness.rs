//! Uniqueness gate: duplicate titles/topics and keyword concentration.
//!
//! Scores a payload against every prior step output in the run. A title
//! counts as a duplicate if its normalized form already appeared earlier
//! in this payload or in any prior payload. Keyword over-concentration is
//! reported as findings so the final report can call it out.

use std::collections::{BTreeSet, HashSet};

use super::payload::{collect_keywords, collect_titles, normalize};
use super::{GateContext, GateName, QualityGate, QualityGateResult};

/// Share of all keyword mentions above which one keyword is flagged as
/// over-concentrated.
const KEYWORD_CONCENTRATION_CEILING: f64 = 0.40;

/// Minimum keyword mentions before concentration is worth measuring.
const KEYWORD_CONCENTRATION_FLOOR: usize = 5;

/// Flags duplicate titles/topics across the run and keyword
/// over-concentration. Score = 1 − duplicate_ratio.
pub struct UniquenessGate {
    threshold: f64,
}

impl UniquenessGate {
    /// Create the gate with its pass threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl QualityGate for UniquenessGate {
    fn name(&self) -> GateName {
        GateName::Uniqueness
    }

    fn evaluate(&self, ctx: &GateContext<'_>) -> QualityGateResult {
        let titles = collect_titles(ctx.payload);
        let mut findings = Vec::new();

        let score = if titles.is_empty() {
            1.0
        } else {
            let mut seen: HashSet<String> = ctx
                .prior_payloads
                .iter()
                .flat_map(|(_, payload)| collect_titles(payload))
                .map(|t| normalize(&t))
                .collect();

            let mut duplicates = 0usize;
            for title in &titles {
                if !seen.insert(normalize(title)) {
                    duplicates += 1;
                    findings.push(format!("duplicate title: '{title}'"));
                }
            }

            1.0 - duplicates as f64 / titles.len() as f64
        };

        // Keyword concentration is reported, not scored: the duplicate
        // ratio is the gate's single dimension.
        let keywords: Vec<String> = collect_keywords(ctx.payload)
            .iter()
            .map(|k| normalize(k))
            .collect();
        if keywords.len() >= KEYWORD_CONCENTRATION_FLOOR {
            // Ordered so findings are deterministic for identical inputs.
            let unique: BTreeSet<&String> = keywords.iter().collect();
            for keyword in unique {
                let share = keywords.iter().filter(|k| *k == keyword).count() as f64
                    / keywords.len() as f64;
                if share > KEYWORD_CONCENTRATION_CEILING {
                    findings.push(format!(
                        "keyword '{keyword}' carries {:.0}% of all keyword mentions",
                        share * 100.0
                    ));
                }
            }
        }

        QualityGateResult::new(GateName::Uniqueness, score, self.threshold, findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::tests_support::{gate_ctx, run_config};
    use serde_json::json;

    #[test]
    fn test_all_unique_scores_full() {
        let payload = json!({"ideas": [{"title": "A"}, {"title": "B"}, {"title": "C"}]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("topic-ideas-front", &payload, "", &prior, &run);

        let result = UniquenessGate::new(0.70).evaluate(&ctx);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!(result.passed);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_duplicates_against_prior_steps() {
        let prior = vec![(
            "topic-ideas-front".to_string(),
            json!({"ideas": [{"title": "Launch Week"}, {"title": "Deep Dive"}]}),
        )];
        let payload = json!({"ideas": [
            {"title": "launch  week"},
            {"title": "Fresh Angle"},
            {"title": "Deep Dive"},
            {"title": "Another"}
        ]});
        let run = run_config();
        let ctx = gate_ctx("topic-ideas-back", &payload, "", &prior, &run);

        let result = UniquenessGate::new(0.70).evaluate(&ctx);
        // 2 of 4 titles are duplicates of step 7 output.
        assert!((result.score - 0.5).abs() < f64::EPSILON);
        assert!(!result.passed);
        assert_eq!(result.findings.len(), 2);
    }

    #[test]
    fn test_internal_duplicates_counted() {
        let payload = json!({"ideas": [{"title": "Same"}, {"title": "same"}]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("topic-ideas-front", &payload, "", &prior, &run);

        let result = UniquenessGate::new(0.70).evaluate(&ctx);
        assert!((result.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_keyword_concentration_finding() {
        let payload = json!({"entries": [
            {"keywords": ["rust", "rust", "rust", "rust"]},
            {"keywords": ["tokio"]}
        ]});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("keyword-mapping", &payload, "", &prior, &run);

        let result = UniquenessGate::new(0.70).evaluate(&ctx);
        // No titles, so the score holds; concentration shows in findings.
        assert!(result.passed);
        assert!(result
            .findings
            .iter()
            .any(|f| f.contains("rust") && f.contains("80%")));
    }

    #[test]
    fn test_no_titles_scores_full() {
        let payload = json!({"schedule": {"monday": "09:00"}});
        let run = run_config();
        let prior = vec![];
        let ctx = gate_ctx("schedule-tuning", &payload, "", &prior, &run);

        let result = UniquenessGate::new(0.70).evaluate(&ctx);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
    }
}
