//! Phase execution: ordered steps with bounded sibling concurrency.
//!
//! Steps run strictly in sequence except for adjacent steps that declare
//! `independent_of_siblings`; those dispatch concurrently under a
//! semaphore. Completions are buffered and appended to the context store
//! in sequence-number order, so downstream steps and the ordering
//! invariant never observe out-of-order context. After every step the
//! runner consults the [`ErrorHandler`] and applies its decision: retry
//! the whole step once, substitute a tolerated placeholder, skip, or
//! abort the run.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::calendar::Disposition;
use crate::context::ContextStore;
use crate::steps::{Phase, StepDefinition, StepExecutor, StepResult, StepStatus};

use super::policy::{ErrorHandler, RecoveryAction};
use super::progress::ProgressTracker;
use super::CancelToken;

/// Outcome of running one phase.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    /// Phase this report covers.
    pub phase: Phase,
    /// Per-step dispositions in sequence order.
    pub dispositions: Vec<(String, Disposition)>,
    /// Abort reason if the phase terminated the run.
    pub aborted: Option<String>,
}

impl PhaseReport {
    /// Whether the phase signalled a run abort.
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

/// Runs the steps of one phase against the shared context store.
pub struct PhaseRunner {
    executor: Arc<StepExecutor>,
    handler: ErrorHandler,
    progress: Arc<ProgressTracker>,
    sibling_width: usize,
}

impl PhaseRunner {
    /// Create a runner sharing the run's executor and progress tracker.
    pub fn new(
        executor: Arc<StepExecutor>,
        handler: ErrorHandler,
        progress: Arc<ProgressTracker>,
        sibling_width: usize,
    ) -> Self {
        Self {
            executor,
            handler,
            progress,
            sibling_width: sibling_width.max(1),
        }
    }

    /// Run a phase to completion or abort.
    pub async fn run(
        &self,
        phase: Phase,
        steps: &[&'static StepDefinition],
        store: &ContextStore,
        cancel: &CancelToken,
    ) -> PhaseReport {
        let mut report = PhaseReport {
            phase,
            dispositions: Vec::new(),
            aborted: None,
        };

        let mut index = 0;
        while index < steps.len() {
            if cancel.is_cancelled() {
                report.aborted = Some("run cancelled".to_string());
                return report;
            }

            // Group adjacent declared-independent steps into one batch;
            // everything else runs alone.
            let mut batch_end = index + 1;
            if steps[index].independent_of_siblings {
                while batch_end < steps.len() && steps[batch_end].independent_of_siblings {
                    batch_end += 1;
                }
            }
            let batch = &steps[index..batch_end];
            index = batch_end;

            let mut results = self.execute_batch(batch, store, cancel).await;
            // Buffer out-of-order completions; append strictly in
            // sequence-number order.
            results.sort_by_key(|result| result.sequence_number);

            for result in results {
                let definition = batch
                    .iter()
                    .find(|def| def.id == result.step_id)
                    .copied()
                    .expect("result belongs to batch");

                match self.resolve(definition, result, store, cancel).await {
                    Ok((terminal, disposition)) => {
                        self.progress.on_step_end(
                            &terminal.step_id,
                            terminal.status,
                            terminal.overall_score,
                        );
                        if let Err(err) = store.append(terminal) {
                            report.aborted = Some(format!("context append failed: {err}"));
                            return report;
                        }
                        report
                            .dispositions
                            .push((definition.id.to_string(), disposition));
                    }
                    Err(reason) => {
                        self.progress
                            .on_step_end(definition.id, StepStatus::Failed, 0.0);
                        report.aborted = Some(reason);
                        return report;
                    }
                }
            }
        }

        tracing::info!(%phase, steps = report.dispositions.len(), "Phase complete");
        report
    }

    /// Execute a batch of steps, concurrently when it holds more than one.
    async fn execute_batch(
        &self,
        batch: &[&'static StepDefinition],
        store: &ContextStore,
        cancel: &CancelToken,
    ) -> Vec<StepResult> {
        if batch.len() == 1 {
            self.progress.on_step_start(batch[0].id);
            return vec![self.executor.execute(batch[0], store, cancel).await];
        }

        tracing::debug!(
            steps = ?batch.iter().map(|def| def.id).collect::<Vec<_>>(),
            width = self.sibling_width,
            "Dispatching independent siblings concurrently"
        );

        let limiter = Arc::new(Semaphore::new(self.sibling_width));
        let futures: Vec<_> = batch
            .iter()
            .map(|definition| {
                let limiter = Arc::clone(&limiter);
                async move {
                    let _permit = limiter.acquire().await.expect("semaphore closed");
                    self.progress.on_step_start(definition.id);
                    self.executor.execute(definition, store, cancel).await
                }
            })
            .collect();

        futures::future::join_all(futures).await
    }

    /// Apply the recovery policy to one result until it is terminal.
    async fn resolve(
        &self,
        definition: &'static StepDefinition,
        result: StepResult,
        store: &ContextStore,
        cancel: &CancelToken,
    ) -> Result<(StepResult, Disposition), String> {
        match result.status {
            StepStatus::Succeeded => return Ok((result, Disposition::Completed)),
            StepStatus::Degraded => return Ok((result, Disposition::Degraded)),
            StepStatus::Failed => {}
        }

        if cancel.is_cancelled() {
            return Err("run cancelled".to_string());
        }

        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());

        match self
            .handler
            .decide_logged(definition.phase, definition.id, &error, false)
        {
            RecoveryAction::Abort => Err(format!("step '{}' failed: {error}", definition.id)),
            RecoveryAction::Skip => Ok((
                StepResult::tolerated_placeholder(definition, error),
                Disposition::Skipped,
            )),
            RecoveryAction::Degrade => Ok((
                StepResult::tolerated_placeholder(definition, error),
                Disposition::Tolerated,
            )),
            RecoveryAction::RetryStep => {
                tracing::info!(step_id = definition.id, "Retrying whole step once");
                let retried = self.executor.execute(definition, store, cancel).await;
                match retried.status {
                    StepStatus::Succeeded => Ok((retried, Disposition::Completed)),
                    StepStatus::Degraded => Ok((retried, Disposition::Degraded)),
                    StepStatus::Failed => {
                        let error = retried
                            .error
                            .clone()
                            .unwrap_or_else(|| "unknown failure".to_string());
                        match self.handler.decide_logged(
                            definition.phase,
                            definition.id,
                            &error,
                            true,
                        ) {
                            RecoveryAction::Abort => {
                                Err(format!("step '{}' failed: {error}", definition.id))
                            }
                            RecoveryAction::Skip => Ok((
                                StepResult::tolerated_placeholder(definition, error),
                                Disposition::Skipped,
                            )),
                            _ => Ok((
                                StepResult::tolerated_placeholder(definition, error),
                                Disposition::Tolerated,
                            )),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiBackend, AiRequest, AiResponse, CacheHandle};
    use crate::error::AiError;
    use crate::gates::{GateThresholds, QualityGateManager};
    use crate::pipeline::config::{MixTarget, Objective, PipelineConfig, RunConfig};
    use crate::sources::{InputSnapshot, SourceSnapshot, SOURCE_AUDIENCE, SOURCE_STRATEGY};
    use crate::steps::steps_for_phase;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    /// Backend answering per-step scripts, with a per-step failure budget.
    struct StepScriptedBackend {
        responses: HashMap<&'static str, String>,
        fail_first: Mutex<HashMap<&'static str, usize>>,
        invokes: AtomicUsize,
    }

    impl StepScriptedBackend {
        fn new(responses: HashMap<&'static str, String>) -> Self {
            Self {
                responses,
                fail_first: Mutex::new(HashMap::new()),
                invokes: AtomicUsize::new(0),
            }
        }

        fn fail_first_n(self, step_id: &'static str, n: usize) -> Self {
            self.fail_first.lock().unwrap().insert(step_id, n);
            self
        }
    }

    #[async_trait]
    impl AiBackend for StepScriptedBackend {
        async fn invoke(&self, request: AiRequest) -> Result<AiResponse, AiError> {
            self.invokes.fetch_add(1, Ordering::SeqCst);

            {
                let mut failures = self.fail_first.lock().unwrap();
                if let Some(remaining) = failures.get_mut(request.step_id.as_str()) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(AiError::RequestFailed("injected failure".to_string()));
                    }
                }
            }

            let content = self
                .responses
                .get(request.step_id.as_str())
                .cloned()
                .unwrap_or_else(|| "{}".to_string());
            Ok(AiResponse {
                content,
                prompt_tokens: 100,
                completion_tokens: 50,
            })
        }

        async fn pin_context(&self, content: &str) -> Result<CacheHandle, AiError> {
            Ok(CacheHandle {
                id: "pin".to_string(),
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

    fn foundation_responses() -> HashMap<&'static str, String> {
        let mut responses = HashMap::new();
        responses.insert(
            "strategy-brief",
            json!({
                "summary": "A focused one-week calendar that builds developer awareness through consistent posting.",
                "positioning": "The pragmatic developer-first voice in a crowded market.",
                "objectives": [{"name": "awareness"}]
            })
            .to_string(),
        );
        responses.insert(
            "audience-personas",
            json!({
                "personas": [
                    {"name": "Staff Engineer", "description": "Senior builders who want depth over hype and pragmatic takeaways.", "channels": ["blog"]},
                    {"name": "Engineering Manager", "description": "Leads balancing delivery pressure with team growth and tooling budgets.", "channels": ["newsletter"]}
                ]
            })
            .to_string(),
        );
        responses.insert(
            "content-pillars",
            json!({
                "pillars": [
                    {"name": "Deep Dives", "description": "Long-form technical explorations of real production systems.", "objective": "awareness"},
                    {"name": "Field Notes", "description": "Short practical lessons pulled from recent engineering work.", "objective": "awareness"},
                    {"name": "Tooling", "description": "Reviews and comparisons of the tools developers actually run.", "objective": "awareness"}
                ]
            })
            .to_string(),
        );
        responses
    }

    fn harness(
        backend: Arc<StepScriptedBackend>,
    ) -> (PhaseRunner, ContextStore, Arc<ProgressTracker>) {
        let config = Arc::new(
            PipelineConfig::default().with_backoff_base(Duration::from_millis(1)),
        );
        let gates = Arc::new(QualityGateManager::new(&GateThresholds::default()));
        let snapshot = InputSnapshot::from_entries(vec![
            SourceSnapshot::new(SOURCE_STRATEGY, json!({"positioning": "dev-first"}), 0.9),
            SourceSnapshot::new(SOURCE_AUDIENCE, json!({"segments": ["builders"]}), 0.9),
        ]);
        let store = ContextStore::new(
            Uuid::new_v4(),
            run_config(),
            snapshot,
            backend.clone(),
            &config,
        );
        let executor = Arc::new(StepExecutor::new(
            backend,
            gates,
            config.clone(),
            run_config(),
        ));
        let progress = Arc::new(ProgressTracker::new());
        let runner = PhaseRunner::new(
            executor,
            ErrorHandler::new(),
            progress.clone(),
            config.sibling_width,
        );
        (runner, store, progress)
    }

    #[tokio::test]
    async fn test_foundation_phase_appends_in_sequence_order() {
        let backend = Arc::new(StepScriptedBackend::new(foundation_responses()));
        let (runner, store, _) = harness(backend);

        let steps = steps_for_phase(Phase::Foundation);
        let report = runner
            .run(Phase::Foundation, &steps, &store, &CancelToken::new())
            .await;

        assert!(!report.is_aborted());
        let sequences: Vec<u8> = store
            .all_results()
            .iter()
            .map(|r| r.sequence_number)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_foundation_failure_aborts() {
        let backend = Arc::new(
            StepScriptedBackend::new(foundation_responses())
                // Exhaust the executor's full retry budget.
                .fail_first_n("strategy-brief", 10),
        );
        let (runner, store, _) = harness(backend);

        let steps = steps_for_phase(Phase::Foundation);
        let report = runner
            .run(Phase::Foundation, &steps, &store, &CancelToken::new())
            .await;

        assert!(report.is_aborted());
        assert!(report.aborted.unwrap().contains("strategy-brief"));
        assert!(store.all_results().is_empty());
    }

    #[tokio::test]
    async fn test_content_failure_retries_then_tolerates() {
        let mut responses = foundation_responses();
        responses.insert(
            "topic-ideas-front",
            json!({"ideas": [{"title": "Why pipelines fail", "pillar": "Deep Dives"}]}).to_string(),
        );
        // 6 failures: initial 3 attempts + 3 attempts of the step-level
        // retry all fail, forcing the degrade path.
        let backend = Arc::new(
            StepScriptedBackend::new(responses).fail_first_n("topic-ideas-front", 6),
        );
        let (runner, store, _) = harness(backend);

        // Seed prerequisites for the content step.
        for id in [
            "strategy-brief",
            "audience-personas",
            "content-pillars",
            "calendar-framework",
            "weekly-themes",
            "content-mix-plan",
        ] {
            let def = crate::steps::find(id).unwrap();
            store
                .append(StepResult {
                    step_id: def.id.to_string(),
                    sequence_number: def.sequence_number,
                    status: StepStatus::Succeeded,
                    payload: json!({"seeded": true}),
                    quality_scores: BTreeMap::new(),
                    overall_score: 0.95,
                    attempt_count: 1,
                    latency_ms: 1,
                    error: None,
                })
                .unwrap();
        }

        let front = crate::steps::find("topic-ideas-front").unwrap();
        let report = runner
            .run(Phase::Content, &[front], &store, &CancelToken::new())
            .await;

        assert!(!report.is_aborted());
        assert_eq!(
            report.dispositions,
            vec![("topic-ideas-front".to_string(), Disposition::Tolerated)]
        );

        let result = store.get("topic-ideas-front").unwrap();
        assert!(result.is_placeholder());
        assert_eq!(result.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_optimization_failure_skips() {
        let backend = Arc::new(
            StepScriptedBackend::new(HashMap::new()).fail_first_n("schedule-tuning", 10),
        );
        let (runner, store, _) = harness(backend);

        let def = crate::steps::find("daily-entries").unwrap();
        store
            .append(StepResult {
                step_id: def.id.to_string(),
                sequence_number: def.sequence_number,
                status: StepStatus::Succeeded,
                payload: json!({"entries": [{"title": "a"}, {"title": "b"}]}),
                quality_scores: BTreeMap::new(),
                overall_score: 0.95,
                attempt_count: 1,
                latency_ms: 1,
                error: None,
            })
            .unwrap();

        let tuning = crate::steps::find("schedule-tuning").unwrap();
        let report = runner
            .run(Phase::Optimization, &[tuning], &store, &CancelToken::new())
            .await;

        assert!(!report.is_aborted());
        assert_eq!(
            report.dispositions,
            vec![("schedule-tuning".to_string(), Disposition::Skipped)]
        );
    }

    #[tokio::test]
    async fn test_cancelled_phase_aborts_without_dispatch() {
        let backend = Arc::new(StepScriptedBackend::new(foundation_responses()));
        let (runner, store, _) = harness(backend.clone());

        let cancel = CancelToken::new();
        cancel.cancel();

        let steps = steps_for_phase(Phase::Foundation);
        let report = runner.run(Phase::Foundation, &steps, &store, &cancel).await;

        assert!(report.is_aborted());
        assert_eq!(backend.invokes.load(Ordering::SeqCst), 0);
    }
}
