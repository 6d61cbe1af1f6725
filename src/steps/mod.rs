//! The pipeline step catalog and step result types.
//!
//! Twelve steps across four phases, defined once at process start and
//! shared read-only across runs. Each step declares its inputs (data
//! sources and prior steps), the quality gates applied to its output, its
//! output schema, and whether it may run concurrently with independent
//! siblings in the same phase.
//!
//! Steps default to strictly sequential execution; `audience-personas`
//! and `content-pillars` are the only declared-independent pair — both
//! consume only the strategy brief and no sibling data.

pub mod executor;
pub mod prompts;
pub mod schema;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::gates::{GateName, GateSpec};
use crate::sources::{
    SOURCE_AUDIENCE, SOURCE_CONTENT_GAPS, SOURCE_KEYWORDS, SOURCE_PERFORMANCE,
    SOURCE_PRIOR_ANALYSIS, SOURCE_STRATEGY,
};

use schema::{FieldKind, FieldSpec, OutputSchema};

pub use executor::StepExecutor;

/// Total number of steps in the catalog.
pub const TOTAL_STEPS: usize = 12;

/// The four ordered phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Strategy brief, personas, pillars.
    Foundation,
    /// Framework, themes, mix plan.
    Structure,
    /// Topic ideas, daily entries, keywords.
    Content,
    /// Schedule tuning and outlook.
    Optimization,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 4] = [
        Phase::Foundation,
        Phase::Structure,
        Phase::Content,
        Phase::Optimization,
    ];

    /// 1-based position in the run.
    pub fn index(&self) -> u8 {
        match self {
            Phase::Foundation => 1,
            Phase::Structure => 2,
            Phase::Content => 3,
            Phase::Optimization => 4,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Foundation => write!(f, "foundation"),
            Phase::Structure => write!(f, "structure"),
            Phase::Content => write!(f, "content"),
            Phase::Optimization => write!(f, "optimization"),
        }
    }
}

/// Static description of one pipeline step.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    /// Stable step identifier.
    pub id: &'static str,
    /// Global position, 1-12.
    pub sequence_number: u8,
    /// Phase this step belongs to.
    pub phase: Phase,
    /// Human-readable title for logs and progress messages.
    pub title: &'static str,
    /// Data sources that must be usable (non-placeholder) before the step
    /// runs. A zero-quality source fails the step without an AI call.
    pub required_sources: Vec<&'static str>,
    /// Data sources folded into context when usable, skipped otherwise.
    pub optional_sources: Vec<&'static str>,
    /// Prior steps whose outputs must be present in context.
    pub required_steps: Vec<&'static str>,
    /// Gates applied to the step's output, in order.
    pub gates: Vec<GateSpec>,
    /// Structural contract for the AI response.
    pub output_schema: OutputSchema,
    /// Whether this step may run concurrently with adjacent independent
    /// siblings in the same phase.
    pub independent_of_siblings: bool,
}

/// Terminal status of one step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// All required gates passed and the overall score is excellent.
    Succeeded,
    /// Required gates passed but the overall score is sub-excellent; the
    /// payload still feeds context and is flagged in the report.
    Degraded,
    /// Preconditions, retries, or a required gate failed.
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Degraded => write!(f, "degraded"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Immutable outcome of executing one step. Created once by the executor,
/// owned by the context store afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Step identifier.
    pub step_id: String,
    /// Global sequence number, 1-12.
    pub sequence_number: u8,
    /// Terminal status.
    pub status: StepStatus,
    /// Schema-validated payload; a minimal placeholder for tolerated
    /// failures.
    pub payload: serde_json::Value,
    /// Per-gate scores by gate name.
    pub quality_scores: BTreeMap<String, f64>,
    /// Weighted mean of gate scores.
    pub overall_score: f64,
    /// AI attempts spent, including the repair pass.
    pub attempt_count: u32,
    /// Wall-clock duration of the step.
    pub latency_ms: u64,
    /// Error text, present iff Failed or Degraded.
    pub error: Option<String>,
}

impl StepResult {
    /// A failed result produced without (or after exhausting) AI calls.
    pub fn failed(
        definition: &StepDefinition,
        error: impl Into<String>,
        attempt_count: u32,
        latency_ms: u64,
    ) -> Self {
        Self {
            step_id: definition.id.to_string(),
            sequence_number: definition.sequence_number,
            status: StepStatus::Failed,
            payload: serde_json::Value::Object(serde_json::Map::new()),
            quality_scores: BTreeMap::new(),
            overall_score: 0.0,
            attempt_count,
            latency_ms,
            error: Some(error.into()),
        }
    }

    /// The minimal placeholder substituted when policy tolerates a failure.
    pub fn tolerated_placeholder(definition: &StepDefinition, error: impl Into<String>) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert("placeholder".to_string(), serde_json::Value::Bool(true));
        Self {
            step_id: definition.id.to_string(),
            sequence_number: definition.sequence_number,
            status: StepStatus::Failed,
            payload: serde_json::Value::Object(payload),
            quality_scores: BTreeMap::new(),
            overall_score: 0.0,
            attempt_count: 0,
            latency_ms: 0,
            error: Some(error.into()),
        }
    }

    /// Whether the payload is a tolerated-failure placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.payload
            .get("placeholder")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// The full step catalog, in sequence order.
pub fn catalog() -> &'static [StepDefinition] {
    static CATALOG: OnceLock<Vec<StepDefinition>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

/// Steps belonging to one phase, in sequence order.
pub fn steps_for_phase(phase: Phase) -> Vec<&'static StepDefinition> {
    catalog().iter().filter(|def| def.phase == phase).collect()
}

/// Look up a step definition by id.
pub fn find(step_id: &str) -> Option<&'static StepDefinition> {
    catalog().iter().find(|def| def.id == step_id)
}

fn build_catalog() -> Vec<StepDefinition> {
    vec![
        StepDefinition {
            id: "strategy-brief",
            sequence_number: 1,
            phase: Phase::Foundation,
            title: "Synthesize strategy brief",
            required_sources: vec![SOURCE_STRATEGY],
            optional_sources: vec![
                SOURCE_CONTENT_GAPS,
                SOURCE_PERFORMANCE,
                SOURCE_PRIOR_ANALYSIS,
            ],
            required_steps: vec![],
            gates: vec![
                GateSpec::required(GateName::Standards),
                GateSpec::required(GateName::Alignment),
            ],
            output_schema: OutputSchema::new(
                "strategy-brief",
                vec![
                    FieldSpec::required("summary", FieldKind::String),
                    FieldSpec::required("positioning", FieldKind::String),
                    FieldSpec::required("objectives", FieldKind::Array { min_items: 1 }),
                    FieldSpec::optional("constraints", FieldKind::Array { min_items: 0 }),
                ],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "audience-personas",
            sequence_number: 2,
            phase: Phase::Foundation,
            title: "Derive audience personas",
            required_sources: vec![SOURCE_AUDIENCE],
            optional_sources: vec![],
            required_steps: vec!["strategy-brief"],
            gates: vec![
                GateSpec::required(GateName::Standards),
                GateSpec::optional(GateName::Continuity),
            ],
            output_schema: OutputSchema::new(
                "audience-personas",
                vec![FieldSpec::required(
                    "personas",
                    FieldKind::Array { min_items: 2 },
                )],
            ),
            independent_of_siblings: true,
        },
        StepDefinition {
            id: "content-pillars",
            sequence_number: 3,
            phase: Phase::Foundation,
            title: "Define content pillars",
            required_sources: vec![],
            optional_sources: vec![SOURCE_CONTENT_GAPS, SOURCE_KEYWORDS],
            required_steps: vec!["strategy-brief"],
            gates: vec![
                GateSpec::required(GateName::Standards),
                GateSpec::required(GateName::Alignment),
                GateSpec::optional(GateName::Uniqueness),
            ],
            output_schema: OutputSchema::new(
                "content-pillars",
                vec![FieldSpec::required(
                    "pillars",
                    FieldKind::Array { min_items: 3 },
                )],
            ),
            independent_of_siblings: true,
        },
        StepDefinition {
            id: "calendar-framework",
            sequence_number: 4,
            phase: Phase::Structure,
            title: "Lay out calendar framework",
            required_sources: vec![],
            optional_sources: vec![],
            required_steps: vec!["strategy-brief", "content-pillars"],
            gates: vec![
                GateSpec::required(GateName::Structural),
                GateSpec::optional(GateName::Standards),
            ],
            output_schema: OutputSchema::new(
                "calendar-framework",
                vec![
                    FieldSpec::required("weeks_count", FieldKind::Number),
                    FieldSpec::required("cadence", FieldKind::String),
                    FieldSpec::required("weeks", FieldKind::Array { min_items: 1 }),
                ],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "weekly-themes",
            sequence_number: 5,
            phase: Phase::Structure,
            title: "Assign weekly themes",
            required_sources: vec![],
            optional_sources: vec![],
            required_steps: vec!["calendar-framework", "content-pillars"],
            gates: vec![
                GateSpec::required(GateName::Structural),
                GateSpec::required(GateName::Continuity),
                GateSpec::required(GateName::Uniqueness),
            ],
            output_schema: OutputSchema::new(
                "weekly-themes",
                vec![FieldSpec::required(
                    "weeks",
                    FieldKind::Array { min_items: 1 },
                )],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "content-mix-plan",
            sequence_number: 6,
            phase: Phase::Structure,
            title: "Plan content mix",
            required_sources: vec![],
            optional_sources: vec![],
            required_steps: vec!["calendar-framework"],
            gates: vec![
                GateSpec::required(GateName::MixBalance),
                GateSpec::optional(GateName::Standards),
            ],
            output_schema: OutputSchema::new(
                "content-mix-plan",
                vec![FieldSpec::required(
                    "mix",
                    FieldKind::Array { min_items: 1 },
                )],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "topic-ideas-front",
            sequence_number: 7,
            phase: Phase::Content,
            title: "Ideate topics, first half",
            required_sources: vec![],
            optional_sources: vec![SOURCE_KEYWORDS, SOURCE_CONTENT_GAPS],
            required_steps: vec!["weekly-themes", "content-pillars"],
            gates: vec![
                GateSpec::required(GateName::Uniqueness),
                GateSpec::required(GateName::Continuity),
                GateSpec::required(GateName::Standards),
            ],
            output_schema: OutputSchema::new(
                "topic-ideas",
                vec![FieldSpec::required(
                    "ideas",
                    FieldKind::Array { min_items: 1 },
                )],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "topic-ideas-back",
            sequence_number: 8,
            phase: Phase::Content,
            title: "Ideate topics, second half",
            required_sources: vec![],
            optional_sources: vec![SOURCE_KEYWORDS, SOURCE_CONTENT_GAPS],
            required_steps: vec!["weekly-themes", "topic-ideas-front"],
            gates: vec![
                GateSpec::required(GateName::Uniqueness),
                GateSpec::required(GateName::Continuity),
                GateSpec::required(GateName::Standards),
            ],
            output_schema: OutputSchema::new(
                "topic-ideas",
                vec![FieldSpec::required(
                    "ideas",
                    FieldKind::Array { min_items: 1 },
                )],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "daily-entries",
            sequence_number: 9,
            phase: Phase::Content,
            title: "Write daily calendar entries",
            required_sources: vec![],
            optional_sources: vec![],
            required_steps: vec!["topic-ideas-front", "topic-ideas-back", "content-mix-plan"],
            gates: vec![
                // An exact slot count is the point of this step.
                GateSpec::required(GateName::Structural).with_weight(2.0),
                GateSpec::required(GateName::Standards),
                GateSpec::optional(GateName::MixBalance),
                GateSpec::optional(GateName::Continuity),
            ],
            output_schema: OutputSchema::new(
                "daily-entries",
                vec![FieldSpec::required(
                    "entries",
                    FieldKind::Array { min_items: 1 },
                )],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "keyword-mapping",
            sequence_number: 10,
            phase: Phase::Content,
            title: "Map keywords to entries",
            required_sources: vec![SOURCE_KEYWORDS],
            optional_sources: vec![],
            required_steps: vec!["daily-entries"],
            gates: vec![
                GateSpec::required(GateName::Continuity),
                GateSpec::optional(GateName::Uniqueness),
                GateSpec::optional(GateName::Standards),
            ],
            output_schema: OutputSchema::new(
                "keyword-mapping",
                vec![FieldSpec::required(
                    "mappings",
                    FieldKind::Array { min_items: 1 },
                )],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "schedule-tuning",
            sequence_number: 11,
            phase: Phase::Optimization,
            title: "Tune publish schedule",
            required_sources: vec![],
            optional_sources: vec![SOURCE_PERFORMANCE],
            required_steps: vec!["daily-entries"],
            gates: vec![
                GateSpec::optional(GateName::Standards),
                GateSpec::optional(GateName::Continuity),
            ],
            output_schema: OutputSchema::new(
                "schedule-tuning",
                vec![FieldSpec::required(
                    "adjustments",
                    FieldKind::Array { min_items: 1 },
                )],
            ),
            independent_of_siblings: false,
        },
        StepDefinition {
            id: "performance-outlook",
            sequence_number: 12,
            phase: Phase::Optimization,
            title: "Project performance outlook",
            required_sources: vec![],
            optional_sources: vec![SOURCE_PERFORMANCE],
            required_steps: vec!["daily-entries"],
            gates: vec![
                GateSpec::required(GateName::Alignment),
                GateSpec::optional(GateName::Standards),
            ],
            output_schema: OutputSchema::new(
                "performance-outlook",
                vec![
                    FieldSpec::required("projections", FieldKind::Array { min_items: 1 }),
                    FieldSpec::required("summary", FieldKind::String),
                ],
            ),
            independent_of_siblings: false,
        },
    ]
}
