//! Context bundles: the size-bounded projection handed to each step.
//!
//! A bundle splits into a shared prefix (run directives + input snapshot,
//! identical for every step in the run and therefore pinnable) and a
//! per-step suffix carrying the declared prior-step outputs. The executor
//! sends `Cached { handle, suffix }` when a live pin covers the prefix and
//! falls back to the raw rendering otherwise.

use serde_json::Value;

use crate::ai::{CacheHandle, ContextPayload};

/// The projection of accumulated run state for one step.
#[derive(Debug, Clone)]
pub struct ContextBundle {
    /// Step this bundle was built for.
    pub step_id: String,
    /// Shared, pinnable prefix: run directives + input snapshot.
    pub shared_prefix: String,
    /// Per-step suffix: declared prior-step outputs.
    pub step_suffix: String,
    /// Live cache handle covering the prefix, if one exists.
    pub cache: Option<CacheHandle>,
    /// Required sources that are missing or zero-quality placeholders.
    pub missing_sources: Vec<String>,
    /// Required prior steps with no output in context.
    pub missing_steps: Vec<String>,
    /// Declared prior-step payloads, for gate evaluation.
    pub prior_payloads: Vec<(String, Value)>,
}

impl ContextBundle {
    /// The full rendering, prefix plus suffix.
    pub fn rendered(&self) -> String {
        if self.step_suffix.is_empty() {
            self.shared_prefix.clone()
        } else {
            format!("{}\n{}", self.shared_prefix, self.step_suffix)
        }
    }

    /// Total rendered size in bytes.
    pub fn len(&self) -> usize {
        self.shared_prefix.len() + self.step_suffix.len()
    }

    /// Whether the bundle renders to nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any required input is missing; the executor fails fast on
    /// this without an AI call.
    pub fn has_missing_requirements(&self) -> bool {
        !self.missing_sources.is_empty() || !self.missing_steps.is_empty()
    }

    /// Human-readable list of the missing requirements.
    pub fn missing_description(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing_sources.is_empty() {
            parts.push(format!(
                "required sources unavailable: {}",
                self.missing_sources.join(", ")
            ));
        }
        if !self.missing_steps.is_empty() {
            parts.push(format!(
                "required step outputs absent: {}",
                self.missing_steps.join(", ")
            ));
        }
        parts.join("; ")
    }

    /// The wire payload: cached prefix + suffix when a pin is live, the
    /// full raw rendering otherwise.
    pub fn payload(&self) -> ContextPayload {
        match &self.cache {
            Some(handle) => ContextPayload::Cached {
                handle: handle.clone(),
                suffix: self.step_suffix.clone(),
            },
            None => ContextPayload::Raw {
                content: self.rendered(),
            },
        }
    }

    /// The same bundle with the cache handle stripped, for raw fallback.
    pub fn without_cache(&self) -> Self {
        Self {
            cache: None,
            ..self.clone()
        }
    }
}

/// Serialize a JSON payload for a bundle section, truncating at `limit`
/// bytes on a char boundary.
pub fn render_section(title: &str, payload: &Value, limit: usize) -> String {
    let body = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    let body = if body.len() > limit {
        let mut end = limit;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…(truncated)", &body[..end])
    } else {
        body
    };
    format!("## {title}\n{body}\n")
}
