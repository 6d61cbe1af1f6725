//! Progress tracking for a pipeline run.
//!
//! Purely an observer: failure to report never affects pipeline
//! correctness. Events go out on a bounded broadcast channel — producers
//! never block, and a slow consumer loses the oldest events rather than
//! stalling the run. The tracker also keeps an in-memory log that is
//! attached to the run outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::steps::{Phase, StepStatus, TOTAL_STEPS};

/// Capacity of the progress broadcast channel.
const CHANNEL_CAPACITY: usize = 64;

/// What a progress event reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEventKind {
    /// A step began executing.
    StepStarted,
    /// A step reached a terminal status.
    StepFinished { status: StepStatus, score: f64 },
    /// The run reached its terminal state.
    RunFinished,
}

/// One progress event pushed to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Step the event concerns; empty for run-level events.
    pub step_id: String,
    /// Event kind.
    pub kind: ProgressEventKind,
    /// Whole-run percentage at the time of the event.
    pub percent: u8,
    /// Human-readable status message.
    pub message: String,
    /// When the event was recorded.
    pub at: DateTime<Utc>,
}

/// Point-in-time view of run progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Steps with a terminal status.
    pub completed_steps: usize,
    /// Total steps in the run.
    pub total_steps: usize,
    /// Floored completion percentage.
    pub percent: u8,
    /// Phase currently executing, if any.
    pub current_phase: Option<Phase>,
    /// Most recent status message.
    pub last_message: String,
}

struct TrackerInner {
    current_phase: Option<Phase>,
    last_message: String,
    log: Vec<ProgressEvent>,
    forced_complete: bool,
}

/// Observer recording and streaming per-step progress.
pub struct ProgressTracker {
    total_steps: usize,
    completed: AtomicUsize,
    inner: Mutex<TrackerInner>,
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create a tracker for the standard twelve-step run.
    pub fn new() -> Self {
        Self::with_total_steps(TOTAL_STEPS)
    }

    /// Create a tracker for a custom step count (used by tests).
    pub fn with_total_steps(total_steps: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            total_steps: total_steps.max(1),
            completed: AtomicUsize::new(0),
            inner: Mutex::new(TrackerInner {
                current_phase: None,
                last_message: String::new(),
                log: Vec::new(),
                forced_complete: false,
            }),
            sender,
        }
    }

    /// Subscribe to the progress stream. Late subscribers see only events
    /// emitted after subscription; lagging ones lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Record that a phase began.
    pub fn on_phase_start(&self, phase: Phase) {
        let mut inner = self.inner.lock().expect("progress lock poisoned");
        inner.current_phase = Some(phase);
        inner.last_message = format!("entering {phase} phase");
    }

    /// Record that a step began executing.
    pub fn on_step_start(&self, step_id: &str) {
        self.emit(
            step_id,
            ProgressEventKind::StepStarted,
            format!("{step_id} started"),
        );
    }

    /// Record a step's terminal status.
    pub fn on_step_end(&self, step_id: &str, status: StepStatus, score: f64) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.emit(
            step_id,
            ProgressEventKind::StepFinished { status, score },
            format!("{step_id} {status} (score {score:.2})"),
        );
    }

    /// Record the run's terminal state. Only a completed run forces the
    /// percentage to 100.
    pub fn on_run_end(&self, completed: bool) {
        {
            let mut inner = self.inner.lock().expect("progress lock poisoned");
            inner.forced_complete = completed;
            inner.current_phase = None;
        }
        self.emit(
            "",
            ProgressEventKind::RunFinished,
            if completed {
                "run completed".to_string()
            } else {
                "run aborted".to_string()
            },
        );
    }

    /// Current progress view.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed_steps = self.completed.load(Ordering::SeqCst);
        let inner = self.inner.lock().expect("progress lock poisoned");
        ProgressSnapshot {
            completed_steps,
            total_steps: self.total_steps,
            percent: self.percent_locked(completed_steps, inner.forced_complete),
            current_phase: inner.current_phase,
            last_message: inner.last_message.clone(),
        }
    }

    /// The full event log, for the run outcome.
    pub fn log(&self) -> Vec<ProgressEvent> {
        let inner = self.inner.lock().expect("progress lock poisoned");
        inner.log.clone()
    }

    fn percent_locked(&self, completed: usize, forced: bool) -> u8 {
        if forced {
            return 100;
        }
        // Floored; the forced jump to 100 happens only at Completed.
        ((completed * 100 / self.total_steps) as u8).min(99)
    }

    fn emit(&self, step_id: &str, kind: ProgressEventKind, message: String) {
        let completed = self.completed.load(Ordering::SeqCst);
        let mut inner = self.inner.lock().expect("progress lock poisoned");
        let event = ProgressEvent {
            step_id: step_id.to_string(),
            kind,
            percent: self.percent_locked(completed, inner.forced_complete),
            message: message.clone(),
            at: Utc::now(),
        };
        inner.last_message = message;
        inner.log.push(event.clone());
        drop(inner);

        // No receivers is fine; reporting never affects the pipeline.
        let _ = self.sender.send(event);
    }
}
