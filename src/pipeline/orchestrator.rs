//! Top-level orchestrator: the run state machine.
//!
//! One orchestrator instance drives exactly one run through
//! `Created → FetchingInputs → Running(k) → Assembling → Completed`
//! (or `Aborted` from any state). All collaborators — the source
//! registry, the AI backend, the gate manager — are injected at
//! construction and shared read-only afterwards; `run` consumes the
//! orchestrator, so a new run requires a new instance by construction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::ai::AiBackend;
use crate::calendar::{ContentCalendar, Disposition, QualityReport, StepReportEntry};
use crate::context::ContextStore;
use crate::gates::QualityGateManager;
use crate::sources::DataSourceRegistry;
use crate::steps::{steps_for_phase, Phase, StepExecutor, StepStatus};

use super::config::{ConfigError, PipelineConfig, RunConfig};
use super::phase::PhaseRunner;
use super::policy::ErrorHandler;
use super::progress::{ProgressEvent, ProgressTracker};
use super::CancelToken;

/// Errors that can occur before a run starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// States of the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Constructed, not yet started.
    Created,
    /// Capturing the input snapshot.
    FetchingInputs,
    /// Executing phase 1-4.
    Running(u8),
    /// Merging step payloads into the artifact.
    Assembling,
    /// Terminal: artifact produced.
    Completed,
    /// Terminal: run ended early; partial context retained.
    Aborted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Created => write!(f, "created"),
            RunState::FetchingInputs => write!(f, "fetching_inputs"),
            RunState::Running(phase) => write!(f, "running(phase={phase})"),
            RunState::Assembling => write!(f, "assembling"),
            RunState::Completed => write!(f, "completed"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Terminal status reported to the calling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Run finished; the artifact is attached.
    Completed,
    /// Run ended early; no artifact.
    Aborted,
}

/// Everything the calling layer receives from one run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Run identifier.
    pub run_id: Uuid,
    /// Terminal status.
    pub status: RunStatus,
    /// The assembled calendar; present iff the run completed.
    pub artifact: Option<ContentCalendar>,
    /// Per-step quality and disposition trail.
    pub quality_report: QualityReport,
    /// Recorded progress events.
    pub progress_log: Vec<ProgressEvent>,
}

/// Coordinates one pipeline run end to end.
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    registry: DataSourceRegistry,
    backend: Arc<dyn AiBackend>,
    gates: Arc<QualityGateManager>,
    progress: Arc<ProgressTracker>,
    state_tx: watch::Sender<RunState>,
}

impl Orchestrator {
    /// Create an orchestrator with injected collaborators.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if the pipeline config is invalid.
    pub fn new(
        config: PipelineConfig,
        registry: DataSourceRegistry,
        backend: Arc<dyn AiBackend>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let gates = Arc::new(QualityGateManager::new(&config.gate_thresholds));
        let (state_tx, _) = watch::channel(RunState::Created);

        Ok(Self {
            config: Arc::new(config),
            registry,
            backend,
            gates,
            progress: Arc::new(ProgressTracker::new()),
            state_tx,
        })
    }

    /// The run's progress tracker; subscribe before calling `run`.
    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Watch the run state; the receiver stays valid after `run` returns.
    pub fn state_stream(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, to: RunState) {
        let from = *self.state_tx.borrow();
        tracing::info!(%from, %to, "Run state transition");
        let _ = self.state_tx.send(to);
    }

    /// Execute the pipeline to a terminal outcome.
    ///
    /// Consumes the orchestrator: terminal states have no outgoing
    /// transitions, so a new run needs a new instance.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` only for an invalid run config;
    /// every runtime condition resolves into a `Completed` or `Aborted`
    /// outcome.
    pub async fn run(
        self,
        run_config: RunConfig,
        cancel: CancelToken,
    ) -> Result<RunOutcome, PipelineError> {
        run_config.validate()?;
        let run_config = Arc::new(run_config);
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, weeks = run_config.calendar_weeks, "Starting pipeline run");

        self.transition(RunState::FetchingInputs);
        let snapshot = self.registry.fetch(&run_config).await;
        tracing::info!(
            %run_id,
            sources = snapshot.len(),
            mean_quality = format!("{:.2}", snapshot.mean_quality()),
            "Input snapshot captured"
        );

        let store = ContextStore::new(
            run_id,
            Arc::clone(&run_config),
            snapshot,
            Arc::clone(&self.backend),
            &self.config,
        );
        let executor = Arc::new(StepExecutor::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.gates),
            Arc::clone(&self.config),
            Arc::clone(&run_config),
        ));
        let runner = PhaseRunner::new(
            executor,
            ErrorHandler::new(),
            Arc::clone(&self.progress),
            self.config.sibling_width,
        );

        let mut dispositions: BTreeMap<String, Disposition> = BTreeMap::new();

        for phase in Phase::ALL {
            if cancel.is_cancelled() {
                return Ok(self.abort(run_id, &store, dispositions, "run cancelled"));
            }

            self.transition(RunState::Running(phase.index()));
            self.progress.on_phase_start(phase);

            let steps = steps_for_phase(phase);
            let report = runner.run(phase, &steps, &store, &cancel).await;

            for (step_id, disposition) in &report.dispositions {
                dispositions.insert(step_id.clone(), *disposition);
            }

            if let Some(reason) = report.aborted {
                return Ok(self.abort(run_id, &store, dispositions, &reason));
            }
        }

        self.transition(RunState::Assembling);
        let results = store.all_results();
        let artifact = ContentCalendar::assemble(run_id, &results, &dispositions);
        let quality_report = self.build_report(&store, &dispositions);

        self.transition(RunState::Completed);
        self.progress.on_run_end(true);

        tracing::info!(
            %run_id,
            aggregate_quality = format!("{:.3}", quality_report.aggregate_quality),
            flagged = quality_report.flagged().len(),
            "Run completed"
        );

        Ok(RunOutcome {
            run_id,
            status: RunStatus::Completed,
            artifact: Some(artifact),
            quality_report,
            progress_log: self.progress.log(),
        })
    }

    fn abort(
        &self,
        run_id: Uuid,
        store: &ContextStore,
        dispositions: BTreeMap<String, Disposition>,
        reason: &str,
    ) -> RunOutcome {
        tracing::warn!(%run_id, reason, "Run aborted");
        self.transition(RunState::Aborted);
        self.progress.on_run_end(false);

        RunOutcome {
            run_id,
            status: RunStatus::Aborted,
            artifact: None,
            quality_report: self.build_report(store, &dispositions),
            progress_log: self.progress.log(),
        }
    }

    fn build_report(
        &self,
        store: &ContextStore,
        dispositions: &BTreeMap<String, Disposition>,
    ) -> QualityReport {
        let entries: Vec<StepReportEntry> = store
            .all_results()
            .iter()
            .map(|result| {
                let disposition = dispositions.get(&result.step_id).copied().unwrap_or(
                    match result.status {
                        StepStatus::Succeeded => Disposition::Completed,
                        StepStatus::Degraded => Disposition::Degraded,
                        StepStatus::Failed => Disposition::Tolerated,
                    },
                );
                StepReportEntry::from_result(result, disposition)
            })
            .collect();

        QualityReport::new(store.aggregate_quality(), entries, store.cache_stats())
    }
}
