//! Prompt builders for the twelve pipeline steps.
//!
//! Each step gets a role-setting system prompt and an instruction body
//! that states the task, folds in the run's shape, and ends with the
//! output-schema contract. Repair prompts quote the exact violation back
//! to the model.

use crate::pipeline::config::RunConfig;

use super::schema::SchemaViolation;
use super::StepDefinition;

/// Shared system-prompt preamble for every step.
const SYSTEM_PREAMBLE: &str = "You are a senior content strategist producing one stage of a \
multi-stage content calendar. Work strictly from the provided context; never invent pillars, \
personas, or keywords that the context does not contain. Output only valid JSON.";

/// System prompt for a step.
pub fn system_prompt(definition: &StepDefinition) -> String {
    format!(
        "{SYSTEM_PREAMBLE}\nCurrent stage: {} ({} phase).",
        definition.title, definition.phase
    )
}

/// Instruction body for a step: task text, run shape, schema contract.
pub fn instruction(definition: &StepDefinition, run: &RunConfig) -> String {
    let task = task_text(definition, run);
    format!("{task}\n\n{}", definition.output_schema.contract())
}

/// Repair instruction quoting a schema violation from the prior attempt.
pub fn repair_instruction(
    definition: &StepDefinition,
    run: &RunConfig,
    violation: &SchemaViolation,
) -> String {
    format!(
        "Your previous response did not conform to the required schema.\n\
         Violation: {violation}\n\
         Produce the response again, fixing every listed issue.\n\n{}",
        instruction(definition, run)
    )
}

fn task_text(definition: &StepDefinition, run: &RunConfig) -> String {
    let weeks = run.calendar_weeks;
    let slots = run.total_slots();
    let half_slots = slots.div_ceil(2);

    match definition.id {
        "strategy-brief" => format!(
            "Synthesize the strategy, gap, and performance context into a concise brief for a \
             {weeks}-week content calendar: overall summary, positioning statement, and the \
             objectives the calendar will serve (use the run's objective names verbatim)."
        ),
        "audience-personas" => "From the audience analysis and the strategy brief, derive the \
             audience personas this calendar targets. For each persona give a name, their core \
             need, and preferred channels."
            .to_string(),
        "content-pillars" => "From the strategy brief (and content gaps, if present), define \
             3-6 named content pillars. For each pillar give a description and the objective it \
             serves (use the run's objective names verbatim)."
            .to_string(),
        "calendar-framework" => format!(
            "Lay out the calendar framework: exactly {weeks} weeks ('weeks' array, one element \
             per week with its week number and slot days), 'weeks_count' set to {weeks}, and the \
             publishing cadence ({} slots per week).",
            run.posts_per_week
        ),
        "weekly-themes" => format!(
            "Assign one theme per week for all {weeks} weeks, tied to the defined pillars. The \
             'weeks' array must have exactly {weeks} elements, each with the week number, a \
             'theme', and the 'pillar' it draws from (pillar names verbatim from context)."
        ),
        "content-mix-plan" => format!(
            "Plan the content-type mix for {slots} total slots: a 'mix' array of \
             {{content_type, count}} entries honoring the run's target ratios and ceilings. \
             Counts must sum to {slots}."
        ),
        "topic-ideas-front" => format!(
            "Generate titled topic ideas covering the first half of the calendar \
             ({half_slots} ideas). Each idea needs a 'title', the 'pillar' it belongs to, and \
             the week theme it supports. Titles must be distinct from each other."
        ),
        "topic-ideas-back" => format!(
            "Generate titled topic ideas covering the second half of the calendar \
             ({} ideas). Each idea needs a 'title', the 'pillar' it belongs to, and the week \
             theme it supports. Titles must not repeat any earlier idea.",
            slots - half_slots
        ),
        "daily-entries" => format!(
            "Write the full calendar entries: an 'entries' array with exactly {slots} elements, \
             one per slot, each with 'title', 'description' (2-3 substantial sentences), \
             'content_type', 'pillar', 'persona', and a call to action. Draw titles from the \
             approved topic ideas."
        ),
        "keyword-mapping" => "Assign keywords to every calendar entry: a 'mappings' array with \
             one element per entry carrying the entry title, a 'primary_keyword' from the \
             keyword research context, and up to three 'secondary_keywords'."
            .to_string(),
        "schedule-tuning" => "Propose publish-timing adjustments: an 'adjustments' array where \
             each element names an entry, its recommended day and time, the channel, and a short \
             rationale grounded in the performance context if available."
            .to_string(),
        "performance-outlook" => "Project the calendar's expected impact: a 'projections' array \
             with one element per business objective (use the run's objective names verbatim in \
             an 'objective' field, with the KPI and expected direction), plus a 'summary' \
             paragraph."
            .to_string(),
        other => format!("Produce the output for pipeline stage '{other}'."),
    }
}
