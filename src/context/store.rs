//! The append-only context store for one pipeline run.
//!
//! Owns everything a step may read: the immutable input snapshot, the
//! ordered step outputs, the running aggregate quality, and the run's
//! cache-handle state. Appends are strictly ordered by global sequence
//! number even when independent siblings complete out of order — the
//! phase runner buffers and appends in order, and the store enforces the
//! invariant as a second line of defense.

use chrono::Utc;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::ai::{content_hash, AiBackend};
use crate::pipeline::config::{PipelineConfig, RunConfig};
use crate::sources::InputSnapshot;
use crate::steps::{StepDefinition, StepResult};

use super::bundle::{render_section, ContextBundle};
use super::cache::{CacheStats, ContextCache};

/// Errors raised by context store operations.
#[derive(Debug, Error)]
pub enum ContextError {
    /// An append would break the strictly-increasing sequence invariant.
    #[error("out-of-order append of step '{step_id}' (sequence {sequence}) after sequence {last}")]
    OutOfOrder {
        step_id: String,
        sequence: u8,
        last: u8,
    },
}

struct StoreState {
    outputs: Vec<StepResult>,
    aggregate_quality: f64,
    cache: ContextCache,
}

/// Accumulated run state, exclusively owned by one orchestrator run.
pub struct ContextStore {
    run_id: Uuid,
    run_config: Arc<RunConfig>,
    snapshot: InputSnapshot,
    backend: Arc<dyn AiBackend>,
    cache_threshold: usize,
    section_limit: usize,
    shared_prefix: String,
    prefix_hash: String,
    state: Mutex<StoreState>,
}

impl ContextStore {
    /// Seed a store for one run with the captured input snapshot.
    pub fn new(
        run_id: Uuid,
        run_config: Arc<RunConfig>,
        snapshot: InputSnapshot,
        backend: Arc<dyn AiBackend>,
        config: &PipelineConfig,
    ) -> Self {
        let section_limit = (config.max_bundle_bytes / 8).max(512);
        let shared_prefix = Self::render_prefix(&run_config, &snapshot, section_limit);
        let prefix_hash = content_hash(&shared_prefix);

        Self {
            run_id,
            run_config,
            snapshot,
            backend,
            cache_threshold: config.cache_threshold_bytes,
            section_limit,
            shared_prefix,
            prefix_hash,
            state: Mutex::new(StoreState {
                outputs: Vec::new(),
                aggregate_quality: 0.0,
                cache: ContextCache::new(),
            }),
        }
    }

    /// The run this store belongs to.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The immutable input snapshot captured at run start.
    pub fn snapshot(&self) -> &InputSnapshot {
        &self.snapshot
    }

    /// Append a step result, recomputing the aggregate quality mean.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::OutOfOrder`] if the result's sequence number
    /// is not strictly greater than the last appended one.
    pub fn append(&self, result: StepResult) -> Result<(), ContextError> {
        let mut state = self.state.lock().expect("context store lock poisoned");

        let last = state.outputs.last().map(|r| r.sequence_number).unwrap_or(0);
        if result.sequence_number <= last {
            return Err(ContextError::OutOfOrder {
                step_id: result.step_id.clone(),
                sequence: result.sequence_number,
                last,
            });
        }

        state.outputs.push(result);
        let total: f64 = state.outputs.iter().map(|r| r.overall_score).sum();
        state.aggregate_quality = total / state.outputs.len() as f64;

        Ok(())
    }

    /// Look up a step output by id.
    pub fn get(&self, step_id: &str) -> Option<StepResult> {
        let state = self.state.lock().expect("context store lock poisoned");
        state
            .outputs
            .iter()
            .find(|r| r.step_id == step_id)
            .cloned()
    }

    /// All step outputs appended so far, in execution order.
    pub fn all_results(&self) -> Vec<StepResult> {
        let state = self.state.lock().expect("context store lock poisoned");
        state.outputs.clone()
    }

    /// Payloads of all outputs so far, for cross-step gates.
    pub fn all_payloads(&self) -> Vec<(String, Value)> {
        let state = self.state.lock().expect("context store lock poisoned");
        state
            .outputs
            .iter()
            .map(|r| (r.step_id.clone(), r.payload.clone()))
            .collect()
    }

    /// Running mean of all appended overall scores.
    pub fn aggregate_quality(&self) -> f64 {
        let state = self.state.lock().expect("context store lock poisoned");
        state.aggregate_quality
    }

    /// Cache-handle usage counters for the run report.
    pub fn cache_stats(&self) -> CacheStats {
        let state = self.state.lock().expect("context store lock poisoned");
        state.cache.stats()
    }

    /// Drop the cache handle after a provider-side expiry error; the next
    /// bundle re-pins a fresh one.
    pub fn invalidate_cache(&self) {
        let mut state = self.state.lock().expect("context store lock poisoned");
        state.cache.invalidate();
    }

    /// Build the context bundle for one step: the shared prefix plus the
    /// step's declared prior outputs, with a cache handle attached when
    /// the rendering is large enough to be worth pinning.
    pub async fn snapshot_for_step(&self, definition: &StepDefinition) -> ContextBundle {
        let (suffix, missing_sources, missing_steps, prior_payloads) = {
            let state = self.state.lock().expect("context store lock poisoned");

            let missing_sources: Vec<String> = definition
                .required_sources
                .iter()
                .filter(|source| !self.snapshot.is_usable(source))
                .map(|source| source.to_string())
                .collect();

            let missing_steps: Vec<String> = definition
                .required_steps
                .iter()
                .filter(|step| !state.outputs.iter().any(|r| &r.step_id == *step))
                .map(|step| step.to_string())
                .collect();

            let prior_payloads: Vec<(String, Value)> = state
                .outputs
                .iter()
                .filter(|r| definition.required_steps.contains(&r.step_id.as_str()))
                .map(|r| (r.step_id.clone(), r.payload.clone()))
                .collect();

            let suffix: String = prior_payloads
                .iter()
                .map(|(step_id, payload)| {
                    render_section(
                        &format!("Step output: {step_id}"),
                        payload,
                        self.section_limit,
                    )
                })
                .collect();

            (suffix, missing_sources, missing_steps, prior_payloads)
        };

        let mut bundle = ContextBundle {
            step_id: definition.id.to_string(),
            shared_prefix: self.shared_prefix.clone(),
            step_suffix: suffix,
            cache: None,
            missing_sources,
            missing_steps,
            prior_payloads,
        };

        if bundle.len() > self.cache_threshold {
            bundle.cache = self.ensure_handle().await;
        }

        bundle
    }

    /// Reuse the live handle for the shared prefix, pinning a fresh one if
    /// none is live. Pin failures degrade to raw context.
    async fn ensure_handle(&self) -> Option<crate::ai::CacheHandle> {
        {
            let mut state = self.state.lock().expect("context store lock poisoned");
            if let Some(handle) = state.cache.live_handle(&self.prefix_hash, Utc::now()) {
                return Some(handle);
            }
        }

        match self.backend.pin_context(&self.shared_prefix).await {
            Ok(handle) => {
                let mut state = self.state.lock().expect("context store lock poisoned");
                state.cache.install(handle.clone());
                tracing::info!(run_id = %self.run_id, handle = %handle.id, "Pinned shared context");
                Some(handle)
            }
            Err(err) => {
                tracing::warn!(run_id = %self.run_id, error = %err, "Context pin failed; sending raw context");
                None
            }
        }
    }

    fn render_prefix(
        run_config: &RunConfig,
        snapshot: &InputSnapshot,
        section_limit: usize,
    ) -> String {
        let directives = serde_json::json!({
            "calendar_weeks": run_config.calendar_weeks,
            "posts_per_week": run_config.posts_per_week,
            "total_slots": run_config.total_slots(),
            "objectives": run_config.objectives,
            "mix_targets": run_config.mix_targets,
            "brand_voice": run_config.brand_voice,
        });

        let mut prefix = render_section("Run directives", &directives, section_limit);
        for entry in snapshot.iter().filter(|entry| !entry.is_placeholder()) {
            prefix.push_str(&render_section(
                &format!(
                    "Source: {} (quality {:.2})",
                    entry.source, entry.quality_score
                ),
                &entry.payload,
                section_limit,
            ));
        }
        prefix
    }
}
