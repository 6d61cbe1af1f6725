//! The composite calendar artifact and the run quality report.
//!
//! Assembly follows a fixed composition rule: each step contributes its
//! payload to one named section of the calendar. Steps that ended Failed
//! (tolerated or skipped) leave their section empty; the quality report
//! carries the full disposition trail so callers can see exactly what is
//! missing and why.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::context::CacheStats;
use crate::steps::{find, Phase, StepResult, StepStatus};

/// How a step ended up in the finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Succeeded with an excellent score.
    Completed,
    /// Usable but sub-excellent output.
    Degraded,
    /// Failed but tolerated with a placeholder payload.
    Tolerated,
    /// Failed and skipped without a payload.
    Skipped,
}

impl Disposition {
    /// Whether the step's payload feeds the artifact.
    pub fn contributes_payload(&self) -> bool {
        matches!(self, Disposition::Completed | Disposition::Degraded)
    }
}

/// One step's line in the quality report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReportEntry {
    /// Step identifier.
    pub step_id: String,
    /// Global sequence number.
    pub sequence_number: u8,
    /// Phase the step belongs to.
    pub phase: Phase,
    /// Terminal status from the executor.
    pub status: StepStatus,
    /// How the run treated the step.
    pub disposition: Disposition,
    /// Weighted overall score.
    pub overall_score: f64,
    /// Per-gate scores.
    pub quality_scores: BTreeMap<String, f64>,
    /// AI calls spent.
    pub attempt_count: u32,
    /// Step duration.
    pub latency_ms: u64,
    /// Error text for failed/degraded steps.
    pub error: Option<String>,
}

impl StepReportEntry {
    /// Build an entry from a result and the runner's disposition.
    pub fn from_result(result: &StepResult, disposition: Disposition) -> Self {
        let phase = find(&result.step_id).map(|def| def.phase).unwrap_or(Phase::Foundation);
        Self {
            step_id: result.step_id.clone(),
            sequence_number: result.sequence_number,
            phase,
            status: result.status,
            disposition,
            overall_score: result.overall_score,
            quality_scores: result.quality_scores.clone(),
            attempt_count: result.attempt_count,
            latency_ms: result.latency_ms,
            error: result.error.clone(),
        }
    }
}

/// Aggregate quality view attached to every run outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityReport {
    /// Running mean of all step overall scores.
    pub aggregate_quality: f64,
    /// Per-step entries in execution order.
    pub steps: Vec<StepReportEntry>,
    /// Provider pins issued during the run.
    pub cache_pins: u64,
    /// Requests that reused a live cache handle.
    pub cache_reuses: u64,
    /// Requests that fell back to raw context.
    pub cache_fallbacks: u64,
}

impl QualityReport {
    /// Build the report from the run's results and dispositions.
    pub fn new(
        aggregate_quality: f64,
        entries: Vec<StepReportEntry>,
        cache: CacheStats,
    ) -> Self {
        Self {
            aggregate_quality,
            steps: entries,
            cache_pins: cache.pins,
            cache_reuses: cache.reuses,
            cache_fallbacks: cache.fallbacks,
        }
    }

    /// Steps that did not complete cleanly.
    pub fn flagged(&self) -> Vec<&StepReportEntry> {
        self.steps
            .iter()
            .filter(|entry| entry.disposition != Disposition::Completed)
            .collect()
    }

    /// Report entry for one step.
    pub fn step(&self, step_id: &str) -> Option<&StepReportEntry> {
        self.steps.iter().find(|entry| entry.step_id == step_id)
    }
}

/// The finished content calendar, one section per pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentCalendar {
    /// Run that produced this calendar.
    pub run_id: Uuid,
    /// Assembly timestamp.
    pub generated_at: DateTime<Utc>,
    /// Step 1: strategy brief.
    pub strategy_brief: Option<Value>,
    /// Step 2: audience personas.
    pub personas: Option<Value>,
    /// Step 3: content pillars.
    pub pillars: Option<Value>,
    /// Step 4: calendar framework.
    pub framework: Option<Value>,
    /// Step 5: weekly themes.
    pub weekly_themes: Option<Value>,
    /// Step 6: content mix plan.
    pub content_mix: Option<Value>,
    /// Steps 7-8: topic ideas, front and back halves merged in order.
    pub topic_ideas: Vec<Value>,
    /// Step 9: daily entries.
    pub entries: Option<Value>,
    /// Step 10: keyword mappings.
    pub keyword_mappings: Option<Value>,
    /// Step 11: schedule adjustments.
    pub schedule: Option<Value>,
    /// Step 12: performance outlook.
    pub outlook: Option<Value>,
}

impl ContentCalendar {
    /// Assemble the artifact from step results per the fixed composition
    /// rule. Steps whose disposition contributes no payload leave their
    /// section empty.
    pub fn assemble(
        run_id: Uuid,
        results: &[StepResult],
        dispositions: &BTreeMap<String, Disposition>,
    ) -> Self {
        let mut calendar = Self {
            run_id,
            generated_at: Utc::now(),
            strategy_brief: None,
            personas: None,
            pillars: None,
            framework: None,
            weekly_themes: None,
            content_mix: None,
            topic_ideas: Vec::new(),
            entries: None,
            keyword_mappings: None,
            schedule: None,
            outlook: None,
        };

        for result in results {
            let contributes = dispositions
                .get(&result.step_id)
                .map(Disposition::contributes_payload)
                .unwrap_or(false);
            if !contributes {
                continue;
            }

            let payload = result.payload.clone();
            match result.step_id.as_str() {
                "strategy-brief" => calendar.strategy_brief = Some(payload),
                "audience-personas" => calendar.personas = Some(payload),
                "content-pillars" => calendar.pillars = Some(payload),
                "calendar-framework" => calendar.framework = Some(payload),
                "weekly-themes" => calendar.weekly_themes = Some(payload),
                "content-mix-plan" => calendar.content_mix = Some(payload),
                "topic-ideas-front" | "topic-ideas-back" => calendar.topic_ideas.push(payload),
                "daily-entries" => calendar.entries = Some(payload),
                "keyword-mapping" => calendar.keyword_mappings = Some(payload),
                "schedule-tuning" => calendar.schedule = Some(payload),
                "performance-outlook" => calendar.outlook = Some(payload),
                other => {
                    tracing::warn!(step_id = other, "No calendar section for step output");
                }
            }
        }

        calendar
    }

    /// Number of populated sections.
    pub fn populated_sections(&self) -> usize {
        [
            self.strategy_brief.is_some(),
            self.personas.is_some(),
            self.pillars.is_some(),
            self.framework.is_some(),
            self.weekly_themes.is_some(),
            self.content_mix.is_some(),
            !self.topic_ideas.is_empty(),
            self.entries.is_some(),
            self.keyword_mappings.is_some(),
            self.schedule.is_some(),
            self.outlook.is_some(),
        ]
        .iter()
        .filter(|&&populated| populated)
        .count()
    }
}
