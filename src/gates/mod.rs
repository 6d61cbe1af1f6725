//! Quality gates for step outputs.
//!
//! Each gate scores one dimension of a step's payload against the run's
//! accumulated context and configuration. Gates are pure functions of
//! payload + context: evaluating the same inputs twice yields identical
//! scores. The closed set of six categories is dispatched through the
//! [`QualityGate`] trait — no runtime reflection.
//!
//! A step's `overall_score` is the weighted mean of its applicable gates.
//! A step whose required gates all pass but whose overall score falls
//! below the configured excellent threshold is Degraded rather than
//! Failed; it still contributes its payload to context.

pub mod alignment;
pub mod continuity;
pub mod manager;
pub mod mix_balance;
pub mod standards;
pub mod structural;
pub mod uniqueness;

mod payload;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::config::RunConfig;

pub use manager::QualityGateManager;

/// The closed set of gate categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateName {
    /// Duplicate titles/topics and keyword over-concentration.
    Uniqueness,
    /// Content-type distribution against target ratios.
    MixBalance,
    /// Referenced entities resolvable in the given context bundle.
    Continuity,
    /// Exact duration/count constraints.
    Structural,
    /// Content depth, placeholder text, required fields.
    Standards,
    /// Mapping to at least one business objective.
    Alignment,
}

impl GateName {
    /// Stable string form used in reports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            GateName::Uniqueness => "uniqueness",
            GateName::MixBalance => "mix_balance",
            GateName::Continuity => "continuity",
            GateName::Structural => "structural",
            GateName::Standards => "standards",
            GateName::Alignment => "alignment",
        }
    }
}

impl fmt::Display for GateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a step applies one gate: required gates decide pass/fail, optional
/// gates only affect the overall score. Weights default to equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSpec {
    /// Which gate to run.
    pub name: GateName,
    /// Whether a failing score fails the step.
    pub required: bool,
    /// Relative weight in the overall score.
    pub weight: f64,
}

impl GateSpec {
    /// A required gate with weight 1.0.
    pub const fn required(name: GateName) -> Self {
        Self {
            name,
            required: true,
            weight: 1.0,
        }
    }

    /// An optional gate with weight 1.0.
    pub const fn optional(name: GateName) -> Self {
        Self {
            name,
            required: false,
            weight: 1.0,
        }
    }

    /// Override the relative weight.
    pub const fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Per-gate pass thresholds, all configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    pub uniqueness: f64,
    pub mix_balance: f64,
    pub continuity: f64,
    pub structural: f64,
    pub standards: f64,
    pub alignment: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            uniqueness: 0.70,
            mix_balance: 0.70,
            continuity: 0.70,
            structural: 1.00,
            standards: 0.80,
            alignment: 0.70,
        }
    }
}

impl GateThresholds {
    /// Threshold for one gate by name.
    pub fn for_gate(&self, name: GateName) -> f64 {
        match name {
            GateName::Uniqueness => self.uniqueness,
            GateName::MixBalance => self.mix_balance,
            GateName::Continuity => self.continuity,
            GateName::Structural => self.structural,
            GateName::Standards => self.standards,
            GateName::Alignment => self.alignment,
        }
    }

    /// Check all thresholds are within [0, 1].
    pub fn validate(&self) -> Result<(), String> {
        for (label, value) in [
            ("uniqueness", self.uniqueness),
            ("mix_balance", self.mix_balance),
            ("continuity", self.continuity),
            ("structural", self.structural),
            ("standards", self.standards),
            ("alignment", self.alignment),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("gate threshold '{label}' must be between 0.0 and 1.0"));
            }
        }
        Ok(())
    }
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGateResult {
    /// Which gate produced this result.
    pub gate: GateName,
    /// Score in [0, 1].
    pub score: f64,
    /// Whether the score met the gate's threshold.
    pub passed: bool,
    /// Human-readable issues found (e.g. the duplicated titles).
    pub findings: Vec<String>,
}

impl QualityGateResult {
    /// Build a result, clamping the score and applying the threshold.
    pub fn new(gate: GateName, score: f64, threshold: f64, findings: Vec<String>) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            gate,
            score,
            passed: score >= threshold,
            findings,
        }
    }
}

/// Everything a gate may look at. Gates must not reach beyond this.
pub struct GateContext<'a> {
    /// Identifier of the step under evaluation.
    pub step_id: &'a str,
    /// The step's parsed payload.
    pub payload: &'a serde_json::Value,
    /// The rendered context bundle the step was given.
    pub bundle_text: &'a str,
    /// Payloads of all prior steps in execution order.
    pub prior_payloads: &'a [(String, serde_json::Value)],
    /// The run's objectives and mix targets.
    pub run: &'a RunConfig,
}

/// A pure validator scoring one quality dimension.
pub trait QualityGate: Send + Sync {
    /// The category this gate implements.
    fn name(&self) -> GateName;

    /// Score the payload. Must be deterministic for identical inputs.
    fn evaluate(&self, ctx: &GateContext<'_>) -> QualityGateResult;
}

#[cfg(test)]
pub(crate) mod tests_support {
    //! Shared fixtures for gate unit tests.

    use super::GateContext;
    use crate::pipeline::config::{MixTarget, Objective, RunConfig};
    use std::collections::BTreeMap;

    pub fn run_config() -> RunConfig {
        RunConfig {
            calendar_weeks: 4,
            posts_per_week: 5,
            objectives: vec![
                Objective {
                    name: "grow-newsletter".to_string(),
                    kpi: "subscribers".to_string(),
                },
                Objective {
                    name: "brand-awareness".to_string(),
                    kpi: "reach".to_string(),
                },
            ],
            mix_targets: vec![
                MixTarget {
                    content_type: "educational".to_string(),
                    target_ratio: 0.5,
                    ceiling: None,
                },
                MixTarget {
                    content_type: "promotional".to_string(),
                    target_ratio: 0.2,
                    ceiling: Some(0.3),
                },
            ],
            brand_voice: None,
            sources: BTreeMap::new(),
        }
    }

    pub fn gate_ctx<'a>(
        step_id: &'a str,
        payload: &'a serde_json::Value,
        bundle_text: &'a str,
        prior_payloads: &'a [(String, serde_json::Value)],
        run: &'a RunConfig,
    ) -> GateContext<'a> {
        GateContext {
            step_id,
            payload,
            bundle_text,
            prior_payloads,
            run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let thresholds = GateThresholds::default();
        assert!((thresholds.for_gate(GateName::Uniqueness) - 0.70).abs() < f64::EPSILON);
        assert!((thresholds.for_gate(GateName::Structural) - 1.00).abs() < f64::EPSILON);
        assert!((thresholds.for_gate(GateName::Standards) - 0.80).abs() < f64::EPSILON);
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_threshold_validation() {
        let thresholds = GateThresholds {
            continuity: 1.2,
            ..GateThresholds::default()
        };
        let err = thresholds.validate().unwrap_err();
        assert!(err.contains("continuity"));
    }

    #[test]
    fn test_gate_result_clamps_and_applies_threshold() {
        let result = QualityGateResult::new(GateName::Uniqueness, 1.4, 0.70, vec![]);
        assert!((result.score - 1.0).abs() < f64::EPSILON);
        assert!(result.passed);

        let result = QualityGateResult::new(GateName::Uniqueness, 0.69, 0.70, vec![]);
        assert!(!result.passed);
    }

    #[test]
    fn test_gate_spec_constructors() {
        let spec = GateSpec::required(GateName::Structural).with_weight(2.0);
        assert!(spec.required);
        assert!((spec.weight - 2.0).abs() < f64::EPSILON);

        let spec = GateSpec::optional(GateName::Alignment);
        assert!(!spec.required);
    }

    #[test]
    fn test_gate_name_display() {
        assert_eq!(GateName::MixBalance.to_string(), "mix_balance");
        assert_eq!(GateName::Uniqueness.to_string(), "uniqueness");
    }
}
