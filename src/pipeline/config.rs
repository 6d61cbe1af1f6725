//! Pipeline and run configuration.
//!
//! Two layers of configuration feed a run:
//!
//! - [`PipelineConfig`] — process-level knobs shared by every run: AI call
//!   timeout and retry policy, concurrency widths, context-cache sizing,
//!   and quality thresholds. Built once, injected into the orchestrator.
//! - [`RunConfig`] — per-run inputs: the requested calendar shape, business
//!   objectives, target content mix, and where each data source's payload
//!   comes from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::gates::GateThresholds;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Run config file could not be parsed.
    #[error("Failed to parse run config: {0}")]
    ParseFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-level configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // AI call settings
    /// Timeout for a single AI backend invocation.
    pub ai_call_timeout: Duration,
    /// Additional attempts after the first on transient failure.
    pub max_retries: u32,
    /// Base delay for exponential retry backoff.
    pub backoff_base: Duration,
    /// Sampling temperature for generation requests.
    pub temperature: f64,
    /// Maximum tokens per generated step output.
    pub max_output_tokens: u32,

    // Concurrency settings
    /// Concurrent AI calls for independent sibling steps within a phase.
    pub sibling_width: usize,
    /// Concurrent data source fetches at run start.
    pub source_fetch_width: usize,

    // Context caching settings
    /// Bundle size above which the shared context prefix is pinned.
    pub cache_threshold_bytes: usize,
    /// Local time-to-live assumed for provider cache handles.
    pub cache_ttl: Duration,
    /// Hard cap on a serialized context bundle.
    pub max_bundle_bytes: usize,

    // Quality settings
    /// Overall score at or above which a step counts as excellent.
    pub excellent_threshold: f64,
    /// Per-gate pass thresholds.
    pub gate_thresholds: GateThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // AI call defaults
            ai_call_timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff_base: Duration::from_secs(2),
            temperature: 0.7,
            max_output_tokens: 4000,

            // Concurrency defaults
            sibling_width: 3,
            source_fetch_width: 6,

            // Caching defaults
            cache_threshold_bytes: 24_000,
            cache_ttl: Duration::from_secs(300),
            max_bundle_bytes: 96_000,

            // Quality defaults
            excellent_threshold: 0.90,
            gate_thresholds: GateThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CALFORGE_AI_TIMEOUT_SECS`: AI call timeout in seconds (default: 60)
    /// - `CALFORGE_MAX_RETRIES`: retries after the first attempt (default: 2)
    /// - `CALFORGE_BACKOFF_BASE_SECS`: backoff base in seconds (default: 2)
    /// - `CALFORGE_TEMPERATURE`: sampling temperature (default: 0.7)
    /// - `CALFORGE_MAX_OUTPUT_TOKENS`: max tokens per step (default: 4000)
    /// - `CALFORGE_SIBLING_WIDTH`: concurrent sibling steps (default: 3)
    /// - `CALFORGE_SOURCE_FETCH_WIDTH`: concurrent source fetches (default: 6)
    /// - `CALFORGE_CACHE_THRESHOLD_BYTES`: pin threshold (default: 24000)
    /// - `CALFORGE_CACHE_TTL_SECS`: local handle TTL (default: 300)
    /// - `CALFORGE_MAX_BUNDLE_BYTES`: bundle cap (default: 96000)
    /// - `CALFORGE_EXCELLENT_THRESHOLD`: excellent cutoff (default: 0.90)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CALFORGE_AI_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "CALFORGE_AI_TIMEOUT_SECS")?;
            config.ai_call_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CALFORGE_MAX_RETRIES") {
            config.max_retries = parse_env_value(&val, "CALFORGE_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("CALFORGE_BACKOFF_BASE_SECS") {
            let secs: u64 = parse_env_value(&val, "CALFORGE_BACKOFF_BASE_SECS")?;
            config.backoff_base = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CALFORGE_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "CALFORGE_TEMPERATURE")?;
        }

        if let Ok(val) = std::env::var("CALFORGE_MAX_OUTPUT_TOKENS") {
            config.max_output_tokens = parse_env_value(&val, "CALFORGE_MAX_OUTPUT_TOKENS")?;
        }

        if let Ok(val) = std::env::var("CALFORGE_SIBLING_WIDTH") {
            config.sibling_width = parse_env_value(&val, "CALFORGE_SIBLING_WIDTH")?;
        }

        if let Ok(val) = std::env::var("CALFORGE_SOURCE_FETCH_WIDTH") {
            config.source_fetch_width = parse_env_value(&val, "CALFORGE_SOURCE_FETCH_WIDTH")?;
        }

        if let Ok(val) = std::env::var("CALFORGE_CACHE_THRESHOLD_BYTES") {
            config.cache_threshold_bytes = parse_env_value(&val, "CALFORGE_CACHE_THRESHOLD_BYTES")?;
        }

        if let Ok(val) = std::env::var("CALFORGE_CACHE_TTL_SECS") {
            let secs: u64 = parse_env_value(&val, "CALFORGE_CACHE_TTL_SECS")?;
            config.cache_ttl = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CALFORGE_MAX_BUNDLE_BYTES") {
            config.max_bundle_bytes = parse_env_value(&val, "CALFORGE_MAX_BUNDLE_BYTES")?;
        }

        if let Ok(val) = std::env::var("CALFORGE_EXCELLENT_THRESHOLD") {
            config.excellent_threshold = parse_env_value(&val, "CALFORGE_EXCELLENT_THRESHOLD")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ai_call_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "ai_call_timeout must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.sibling_width == 0 {
            return Err(ConfigError::ValidationFailed(
                "sibling_width must be greater than 0".to_string(),
            ));
        }

        if self.source_fetch_width == 0 {
            return Err(ConfigError::ValidationFailed(
                "source_fetch_width must be greater than 0".to_string(),
            ));
        }

        if self.cache_threshold_bytes >= self.max_bundle_bytes {
            return Err(ConfigError::ValidationFailed(
                "cache_threshold_bytes must be below max_bundle_bytes".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.excellent_threshold) {
            return Err(ConfigError::ValidationFailed(
                "excellent_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        self.gate_thresholds
            .validate()
            .map_err(ConfigError::ValidationFailed)?;

        Ok(())
    }

    /// Builder method to set the AI call timeout.
    pub fn with_ai_call_timeout(mut self, timeout: Duration) -> Self {
        self.ai_call_timeout = timeout;
        self
    }

    /// Builder method to set the retry count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Builder method to set the backoff base.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Builder method to set the sibling concurrency width.
    pub fn with_sibling_width(mut self, width: usize) -> Self {
        self.sibling_width = width;
        self
    }

    /// Builder method to set the source fetch width.
    pub fn with_source_fetch_width(mut self, width: usize) -> Self {
        self.source_fetch_width = width;
        self
    }

    /// Builder method to set the cache pin threshold.
    pub fn with_cache_threshold_bytes(mut self, bytes: usize) -> Self {
        self.cache_threshold_bytes = bytes;
        self
    }

    /// Builder method to set the local cache handle TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Builder method to set the excellent threshold.
    pub fn with_excellent_threshold(mut self, threshold: f64) -> Self {
        self.excellent_threshold = threshold;
        self
    }

    /// Builder method to set per-gate thresholds.
    pub fn with_gate_thresholds(mut self, thresholds: GateThresholds) -> Self {
        self.gate_thresholds = thresholds;
        self
    }
}

/// A business objective the calendar must serve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Objective {
    /// Short objective name (e.g. "grow-newsletter").
    pub name: String,
    /// The KPI the objective is measured by.
    pub kpi: String,
}

/// Target share for one content type in the final calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixTarget {
    /// Content type or category name (e.g. "educational").
    pub content_type: String,
    /// Desired share of all entries, 0.0-1.0.
    pub target_ratio: f64,
    /// Hard ceiling on the share; defaults to target + 0.15.
    #[serde(default)]
    pub ceiling: Option<f64>,
}

impl MixTarget {
    /// Effective ceiling for this content type.
    pub fn effective_ceiling(&self) -> f64 {
        self.ceiling.unwrap_or(self.target_ratio + 0.15).min(1.0)
    }
}

/// Where a data source's payload comes from for this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceInput {
    /// Payload embedded directly in the run config.
    Inline { payload: serde_json::Value },
    /// Payload read from a JSON file exported by an upstream system.
    File { path: PathBuf },
}

/// Per-run inputs: the requested calendar shape and data source wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of weeks the calendar must cover.
    pub calendar_weeks: u32,
    /// Content slots per week.
    pub posts_per_week: u32,
    /// Business objectives the calendar must map to.
    pub objectives: Vec<Objective>,
    /// Target content-type distribution.
    pub mix_targets: Vec<MixTarget>,
    /// Optional brand-voice notes carried into prompts.
    #[serde(default)]
    pub brand_voice: Option<String>,
    /// Source-name to payload-location wiring.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceInput>,
}

impl RunConfig {
    /// Total content slots the calendar must fill.
    pub fn total_slots(&self) -> usize {
        (self.calendar_weeks * self.posts_per_week) as usize
    }

    /// Load a run config from a JSON or YAML file, by extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` on IO or parse failure, or if validation fails.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)
                .map_err(|e| ConfigError::ParseFailed(e.to_string()))?,
            _ => serde_json::from_str(&raw)
                .map_err(|e| ConfigError::ParseFailed(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the run config values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calendar_weeks == 0 {
            return Err(ConfigError::ValidationFailed(
                "calendar_weeks must be greater than 0".to_string(),
            ));
        }

        if self.posts_per_week == 0 {
            return Err(ConfigError::ValidationFailed(
                "posts_per_week must be greater than 0".to_string(),
            ));
        }

        if self.objectives.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one objective is required".to_string(),
            ));
        }

        for target in &self.mix_targets {
            if !(0.0..=1.0).contains(&target.target_ratio) {
                return Err(ConfigError::ValidationFailed(format!(
                    "mix target for '{}' must be between 0.0 and 1.0",
                    target.content_type
                )));
            }
        }

        Ok(())
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
