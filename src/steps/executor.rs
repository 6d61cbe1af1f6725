//! Step execution: one AI-backed step from bundle to immutable result.
//!
//! The executor owns the per-call policy from the pipeline design:
//! fail-fast on missing required inputs (no AI call), bounded timeout,
//! bounded retries with exponential backoff on transient failure, one
//! free repair pass on a schema-violating response, and a transparent
//! raw-context fallback when the provider reports an expired cache
//! handle. Every path returns a terminal [`StepResult`]; nothing is
//! raised to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::ai::{extract_json, AiBackend, AiRequest, JsonExtractionError};
use crate::context::{ContextBundle, ContextStore};
use crate::error::AiError;
use crate::gates::{GateContext, QualityGateManager};
use crate::pipeline::config::{PipelineConfig, RunConfig};
use crate::pipeline::CancelToken;

use super::prompts;
use super::schema::SchemaViolation;
use super::{StepDefinition, StepResult, StepStatus};

/// Executes pipeline steps against the injected AI backend and gates.
pub struct StepExecutor {
    backend: Arc<dyn AiBackend>,
    gates: Arc<QualityGateManager>,
    config: Arc<PipelineConfig>,
    run_config: Arc<RunConfig>,
}

/// Outcome of one generation attempt, before gates.
enum AttemptOutcome {
    Payload(serde_json::Value),
    Violation(SchemaViolation),
    Retryable(String),
    Fatal(String),
    CacheExpired,
}

impl StepExecutor {
    /// Create an executor sharing the run's collaborators.
    pub fn new(
        backend: Arc<dyn AiBackend>,
        gates: Arc<QualityGateManager>,
        config: Arc<PipelineConfig>,
        run_config: Arc<RunConfig>,
    ) -> Self {
        Self {
            backend,
            gates,
            config,
            run_config,
        }
    }

    /// Execute one step to a terminal result.
    pub async fn execute(
        &self,
        definition: &StepDefinition,
        store: &ContextStore,
        cancel: &CancelToken,
    ) -> StepResult {
        let started = Instant::now();
        let mut bundle = store.snapshot_for_step(definition).await;

        // Fail fast on missing prerequisites: no AI call is made.
        if bundle.has_missing_requirements() {
            let error = format!("unmet preconditions: {}", bundle.missing_description());
            tracing::warn!(step_id = definition.id, %error, "Step failed before invocation");
            return StepResult::failed(definition, error, 0, elapsed_ms(started));
        }

        let max_attempts = 1 + self.config.max_retries;
        let mut attempt: u32 = 0;
        let mut ai_calls: u32 = 0;
        let mut repair: Option<SchemaViolation> = None;
        let mut repair_used = false;
        let mut cache_fallback_done = false;

        loop {
            if cancel.is_cancelled() {
                return StepResult::failed(
                    definition,
                    "run cancelled before attempt",
                    ai_calls,
                    elapsed_ms(started),
                );
            }

            // Repair passes re-prompt without consuming the retry budget.
            let is_repair = repair.is_some();
            if !is_repair {
                attempt += 1;
            }
            ai_calls += 1;

            let outcome = self
                .attempt(definition, &bundle, repair.take(), ai_calls)
                .await;

            match outcome {
                AttemptOutcome::Payload(payload) => {
                    return self.gate_and_classify(
                        definition,
                        store,
                        &bundle,
                        payload,
                        ai_calls,
                        started,
                    );
                }
                AttemptOutcome::CacheExpired if !cache_fallback_done => {
                    // Provider forgot the pin: resend raw and refresh the
                    // handle for subsequent steps.
                    tracing::info!(
                        step_id = definition.id,
                        "Cache handle expired; falling back to raw context"
                    );
                    store.invalidate_cache();
                    bundle = bundle.without_cache();
                    cache_fallback_done = true;
                    if !is_repair {
                        attempt -= 1;
                    }
                }
                AttemptOutcome::CacheExpired => {
                    return StepResult::failed(
                        definition,
                        "cache handle expired again after raw fallback",
                        ai_calls,
                        elapsed_ms(started),
                    );
                }
                AttemptOutcome::Violation(violation) if !repair_used => {
                    tracing::debug!(
                        step_id = definition.id,
                        %violation,
                        "Schema violation; issuing repair pass"
                    );
                    repair_used = true;
                    repair = Some(violation);
                }
                AttemptOutcome::Violation(violation) => {
                    if attempt >= max_attempts {
                        return StepResult::failed(
                            definition,
                            violation.to_string(),
                            ai_calls,
                            elapsed_ms(started),
                        );
                    }
                    self.backoff(attempt, cancel).await;
                }
                AttemptOutcome::Retryable(error) => {
                    if attempt >= max_attempts || cancel.is_cancelled() {
                        return StepResult::failed(
                            definition,
                            error,
                            ai_calls,
                            elapsed_ms(started),
                        );
                    }
                    tracing::debug!(
                        step_id = definition.id,
                        attempt,
                        %error,
                        "Transient failure; backing off"
                    );
                    self.backoff(attempt, cancel).await;
                }
                AttemptOutcome::Fatal(error) => {
                    return StepResult::failed(definition, error, ai_calls, elapsed_ms(started));
                }
            }
        }
    }

    /// One invocation: build the request, call with timeout, extract and
    /// schema-validate the payload.
    async fn attempt(
        &self,
        definition: &StepDefinition,
        bundle: &ContextBundle,
        repair: Option<SchemaViolation>,
        ai_call: u32,
    ) -> AttemptOutcome {
        let instruction = match &repair {
            Some(violation) => {
                prompts::repair_instruction(definition, &self.run_config, violation)
            }
            None => prompts::instruction(definition, &self.run_config),
        };

        let request = AiRequest::new(
            definition.id,
            prompts::system_prompt(definition),
            bundle.payload(),
            instruction,
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_output_tokens);

        tracing::debug!(
            step_id = definition.id,
            ai_call,
            cached = bundle.cache.is_some(),
            context_bytes = request.context.wire_len(),
            "Invoking AI backend"
        );

        let invocation = tokio::time::timeout(
            self.config.ai_call_timeout,
            self.backend.invoke(request),
        )
        .await;

        let response = match invocation {
            Err(_) => {
                return AttemptOutcome::Retryable(
                    AiError::Timeout(self.config.ai_call_timeout.as_secs()).to_string(),
                )
            }
            Ok(Err(AiError::CacheExpired(_))) => return AttemptOutcome::CacheExpired,
            Ok(Err(err)) if err.is_transient() => {
                return AttemptOutcome::Retryable(err.to_string())
            }
            Ok(Err(err)) => return AttemptOutcome::Fatal(err.to_string()),
            Ok(Ok(response)) => response,
        };

        let payload = match extract_json(&response.content) {
            Ok(payload) => payload,
            // Malformed or cut-off output is a transient generation
            // failure, not a schema violation.
            Err(err @ JsonExtractionError::Truncated { .. }) => {
                return AttemptOutcome::Retryable(err.to_string())
            }
            Err(err) => return AttemptOutcome::Retryable(err.to_string()),
        };

        match definition.output_schema.validate(&payload) {
            Ok(()) => AttemptOutcome::Payload(payload),
            Err(violation) => AttemptOutcome::Violation(violation),
        }
    }

    /// Run the step's gates and classify the final status.
    fn gate_and_classify(
        &self,
        definition: &StepDefinition,
        store: &ContextStore,
        bundle: &ContextBundle,
        payload: serde_json::Value,
        ai_calls: u32,
        started: Instant,
    ) -> StepResult {
        let prior_payloads = store.all_payloads();
        let bundle_text = bundle.rendered();
        let ctx = GateContext {
            step_id: definition.id,
            payload: &payload,
            bundle_text: &bundle_text,
            prior_payloads: &prior_payloads,
            run: &self.run_config,
        };

        let results = self.gates.run_gates(&definition.gates, &ctx);
        let overall = QualityGateManager::overall_score(&definition.gates, &results);
        let failures = QualityGateManager::required_failures(&definition.gates, &results);

        let quality_scores: BTreeMap<String, f64> = results
            .iter()
            .map(|r| (r.gate.as_str().to_string(), r.score))
            .collect();

        let findings: Vec<&str> = results
            .iter()
            .flat_map(|r| r.findings.iter().map(String::as_str))
            .collect();
        if !findings.is_empty() {
            tracing::debug!(step_id = definition.id, ?findings, "Gate findings");
        }

        let (status, error) = if !failures.is_empty() {
            let names: Vec<&str> = failures.iter().map(|g| g.as_str()).collect();
            (
                StepStatus::Failed,
                Some(format!("required gate(s) failed: {}", names.join(", "))),
            )
        } else if overall < self.config.excellent_threshold {
            (
                StepStatus::Degraded,
                Some(format!(
                    "overall score {overall:.2} below excellent threshold {:.2}",
                    self.config.excellent_threshold
                )),
            )
        } else {
            (StepStatus::Succeeded, None)
        };

        tracing::info!(
            step_id = definition.id,
            %status,
            overall = format!("{overall:.3}"),
            attempts = ai_calls,
            "Step finished"
        );

        StepResult {
            step_id: definition.id.to_string(),
            sequence_number: definition.sequence_number,
            status,
            payload,
            quality_scores,
            overall_score: overall,
            attempt_count: ai_calls,
            latency_ms: elapsed_ms(started),
            error,
        }
    }

    /// Exponential backoff before the next counted attempt. Returns early
    /// on cancellation.
    async fn backoff(&self, attempt: u32, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            return;
        }
        let delay = self.config.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1));
        tokio::time::sleep(delay).await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiResponse, CacheHandle};
    use crate::gates::GateThresholds;
    use crate::pipeline::config::{MixTarget, Objective};
    use crate::sources::{InputSnapshot, SourceSnapshot, SOURCE_STRATEGY};
    use crate::steps::find;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    /// Backend replaying a script of canned outcomes.
    struct ScriptedBackend {
        script: Mutex<Vec<Result<String, AiError>>>,
        invokes: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, AiError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                invokes: AtomicUsize::new(0),
            })
        }

        fn invoke_count(&self) -> usize {
            self.invokes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiBackend for ScriptedBackend {
        async fn invoke(&self, _request: AiRequest) -> Result<AiResponse, AiError> {
            self.invokes.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let next = if script.is_empty() {
                Ok("{}".to_string())
            } else {
                script.remove(0)
            };
            next.map(|content| AiResponse {
                content,
                prompt_tokens: 100,
                completion_tokens: 50,
            })
        }

        async fn pin_context(&self, content: &str) -> Result<CacheHandle, AiError> {
            Ok(CacheHandle {
                id: "pin-1".to_string(),
                expires_at: Utc::now() + chrono::Duration::seconds(300),
                content_hash: crate::ai::content_hash(content),
            })
        }
    }

    fn run_config() -> Arc<RunConfig> {
        Arc::new(RunConfig {
            calendar_weeks: 1,
            posts_per_week: 2,
            objectives: vec![Objective {
                name: "awareness".to_string(),
                kpi: "reach".to_string(),
            }],
            mix_targets: vec![MixTarget {
                content_type: "educational".to_string(),
                target_ratio: 1.0,
                ceiling: None,
            }],
            brand_voice: None,
            sources: BTreeMap::new(),
        })
    }

    fn fast_config() -> Arc<PipelineConfig> {
        Arc::new(
            PipelineConfig::default()
                .with_backoff_base(Duration::from_millis(1))
                .with_ai_call_timeout(Duration::from_secs(5)),
        )
    }

    fn executor_with(
        backend: Arc<ScriptedBackend>,
        config: Arc<PipelineConfig>,
    ) -> (StepExecutor, ContextStore) {
        let gates = Arc::new(QualityGateManager::new(&GateThresholds::default()));
        let snapshot = InputSnapshot::from_entries(vec![SourceSnapshot::new(
            SOURCE_STRATEGY,
            json!({"positioning": "dev-first"}),
            0.9,
        )]);
        let store = ContextStore::new(
            Uuid::new_v4(),
            run_config(),
            snapshot,
            backend.clone(),
            &config,
        );
        let executor = StepExecutor::new(backend, gates, config, run_config());
        (executor, store)
    }

    fn brief_payload() -> String {
        json!({
            "summary": "A focused one-week calendar that builds developer awareness through consistent, substantial posts.",
            "positioning": "The pragmatic developer-first voice in a noisy market.",
            "objectives": [{"name": "awareness"}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_missing_required_source_fails_without_ai_call() {
        let backend = ScriptedBackend::new(vec![]);
        let config = fast_config();
        let gates = Arc::new(QualityGateManager::new(&GateThresholds::default()));
        // Snapshot without the strategy source.
        let store = ContextStore::new(
            Uuid::new_v4(),
            run_config(),
            InputSnapshot::default(),
            backend.clone(),
            &config,
        );
        let executor = StepExecutor::new(backend.clone(), gates, config, run_config());

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("strategy"));
        assert_eq!(result.attempt_count, 0);
        assert_eq!(backend.invoke_count(), 0);
    }

    #[tokio::test]
    async fn test_clean_response_succeeds() {
        let backend = ScriptedBackend::new(vec![Ok(brief_payload())]);
        let (executor, store) = executor_with(backend.clone(), fast_config());

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Succeeded);
        assert_eq!(result.attempt_count, 1);
        assert!(result.error.is_none());
        assert!(result.overall_score >= 0.9);
        assert_eq!(backend.invoke_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried_with_backoff() {
        let backend = ScriptedBackend::new(vec![
            Err(AiError::RequestFailed("connection reset".into())),
            Err(AiError::ApiError {
                code: 503,
                message: "unavailable".into(),
            }),
            Ok(brief_payload()),
        ]);
        let (executor, store) = executor_with(backend.clone(), fast_config());

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Succeeded);
        assert_eq!(result.attempt_count, 3);
        assert_eq!(backend.invoke_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_failed() {
        let backend = ScriptedBackend::new(vec![
            Err(AiError::RequestFailed("reset".into())),
            Err(AiError::RequestFailed("reset".into())),
            Err(AiError::RequestFailed("reset".into())),
        ]);
        let (executor, store) = executor_with(backend.clone(), fast_config());

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Failed);
        // Default budget: 1 initial + 2 retries.
        assert_eq!(backend.invoke_count(), 3);
        assert!(result.error.as_ref().unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn test_schema_violation_gets_free_repair_pass() {
        let backend = ScriptedBackend::new(vec![
            Ok(json!({"positioning": "x"}).to_string()), // missing fields
            Ok(brief_payload()),
        ]);
        let (executor, store) = executor_with(backend.clone(), fast_config());

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Succeeded);
        // Two AI calls, but only one counted attempt.
        assert_eq!(result.attempt_count, 2);
        assert_eq!(backend.invoke_count(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_fatal() {
        let backend = ScriptedBackend::new(vec![Err(AiError::ApiError {
            code: 401,
            message: "bad key".into(),
        })]);
        let (executor, store) = executor_with(backend.clone(), fast_config());

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(backend.invoke_count(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_prevents_first_attempt() {
        let backend = ScriptedBackend::new(vec![Ok(brief_payload())]);
        let (executor, store) = executor_with(backend.clone(), fast_config());

        let cancel = CancelToken::new();
        cancel.cancel();

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &cancel).await;

        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("cancelled"));
        assert_eq!(backend.invoke_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_expiry_falls_back_to_raw_and_succeeds() {
        // Force pinning with a tiny threshold; first invoke reports the
        // handle expired, the fallback raw call succeeds.
        let backend = ScriptedBackend::new(vec![
            Err(AiError::CacheExpired("pin-1".into())),
            Ok(brief_payload()),
        ]);
        let config = Arc::new(
            PipelineConfig::default()
                .with_backoff_base(Duration::from_millis(1))
                .with_cache_threshold_bytes(64),
        );
        let (executor, store) = executor_with(backend.clone(), config);

        let def = find("strategy-brief").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Succeeded);
        assert_eq!(result.attempt_count, 2);
        assert_eq!(store.cache_stats().invalidations, 1);
    }

    #[tokio::test]
    async fn test_required_gate_failure_marks_failed() {
        // weekly-themes requires structural conformance; one week instead
        // of the requested one-week... give wrong count by claiming 3.
        let backend = ScriptedBackend::new(vec![Ok(json!({
            "weeks": [
                {"week": 1, "theme": "Launch", "pillar": "Product"},
                {"week": 2, "theme": "Deep dive", "pillar": "Product"},
                {"week": 3, "theme": "Wrap", "pillar": "Product"}
            ]
        })
        .to_string())]);
        let (executor, store) = executor_with(backend.clone(), fast_config());

        // Seed the declared prerequisites.
        for id in ["strategy-brief", "audience-personas", "content-pillars", "calendar-framework"] {
            let def = find(id).unwrap();
            store
                .append(StepResult {
                    step_id: def.id.to_string(),
                    sequence_number: def.sequence_number,
                    status: StepStatus::Succeeded,
                    payload: json!({"pillars": [{"name": "Product"}]}),
                    quality_scores: BTreeMap::new(),
                    overall_score: 0.95,
                    attempt_count: 1,
                    latency_ms: 5,
                    error: None,
                })
                .unwrap();
        }

        let def = find("weekly-themes").unwrap();
        let result = executor.execute(def, &store, &CancelToken::new()).await;

        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.as_ref().unwrap().contains("structural"));
        assert!(result.quality_scores.contains_key("structural"));
    }
}
