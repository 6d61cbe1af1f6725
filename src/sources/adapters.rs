//! Built-in source adapters.
//!
//! Production deployments wire provider-specific adapters into the
//! registry. The crate ships two generic ones driven by the run config's
//! `sources` table: an inline adapter for payloads embedded in the config
//! and a file adapter for JSON exports dropped by upstream systems.

use async_trait::async_trait;
use std::path::Path;

use crate::error::SourceError;
use crate::pipeline::config::{RunConfig, SourceInput};

use super::registry::SourceAdapter;
use super::types::SourceSnapshot;

/// Quality score assigned to inline payloads (assumed current).
const INLINE_QUALITY: f64 = 1.0;

/// Resolves a source from the run config's `sources` table.
///
/// Handles both `inline` and `file` inputs; a missing table entry, missing
/// file, or malformed payload becomes a placeholder.
pub struct ConfiguredSourceAdapter {
    source: String,
}

impl ConfiguredSourceAdapter {
    /// Create an adapter for the named source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    fn read_file(path: &Path) -> Result<(serde_json::Value, f64), SourceError> {
        if !path.exists() {
            return Err(SourceError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let envelope: serde_json::Value = serde_json::from_str(&raw)?;

        // Exports may wrap the payload with their own quality estimate.
        match (envelope.get("payload"), envelope.get("quality_score")) {
            (Some(payload), Some(score)) => {
                let score = score
                    .as_f64()
                    .ok_or_else(|| SourceError::ParseError("quality_score is not a number".into()))?;
                Ok((payload.clone(), score))
            }
            _ => Ok((envelope, INLINE_QUALITY)),
        }
    }
}

#[async_trait]
impl SourceAdapter for ConfiguredSourceAdapter {
    fn name(&self) -> &str {
        &self.source
    }

    async fn fetch_one(&self, run_config: &RunConfig) -> SourceSnapshot {
        let outcome = match run_config.sources.get(&self.source) {
            Some(SourceInput::Inline { payload }) => Ok((payload.clone(), INLINE_QUALITY)),
            Some(SourceInput::File { path }) => Self::read_file(path),
            None => Err(SourceError::ParseError(format!(
                "source '{}' not wired in run config",
                self.source
            ))),
        };

        match outcome {
            Ok((payload, quality)) => SourceSnapshot::new(&self.source, payload, quality),
            Err(err) => {
                tracing::warn!(source = %self.source, error = %err, "Source fetch failed");
                SourceSnapshot::placeholder(&self.source)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{MixTarget, Objective};
    use crate::sources::types::SOURCE_STRATEGY;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn run_config_with(sources: BTreeMap<String, SourceInput>) -> RunConfig {
        RunConfig {
            calendar_weeks: 4,
            posts_per_week: 5,
            objectives: vec![Objective {
                name: "awareness".to_string(),
                kpi: "reach".to_string(),
            }],
            mix_targets: vec![MixTarget {
                content_type: "educational".to_string(),
                target_ratio: 0.5,
                ceiling: None,
            }],
            brand_voice: None,
            sources,
        }
    }

    #[tokio::test]
    async fn test_inline_source() {
        let mut sources = BTreeMap::new();
        sources.insert(
            SOURCE_STRATEGY.to_string(),
            SourceInput::Inline {
                payload: json!({"positioning": "developer-first"}),
            },
        );

        let adapter = ConfiguredSourceAdapter::new(SOURCE_STRATEGY);
        let entry = adapter.fetch_one(&run_config_with(sources)).await;

        assert!(!entry.is_placeholder());
        assert_eq!(entry.payload["positioning"], "developer-first");
    }

    #[tokio::test]
    async fn test_missing_wiring_is_placeholder() {
        let adapter = ConfiguredSourceAdapter::new(SOURCE_STRATEGY);
        let entry = adapter.fetch_one(&run_config_with(BTreeMap::new())).await;
        assert!(entry.is_placeholder());
    }

    #[tokio::test]
    async fn test_file_source_with_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.json");
        std::fs::write(
            &path,
            r#"{"payload": {"terms": ["rust", "pipeline"]}, "quality_score": 0.8}"#,
        )
        .unwrap();

        let mut sources = BTreeMap::new();
        sources.insert(
            "keywords".to_string(),
            SourceInput::File { path: path.clone() },
        );

        let adapter = ConfiguredSourceAdapter::new("keywords");
        let entry = adapter.fetch_one(&run_config_with(sources)).await;

        assert!((entry.quality_score - 0.8).abs() < f64::EPSILON);
        assert_eq!(entry.payload["terms"][0], "rust");
    }

    #[tokio::test]
    async fn test_file_source_bare_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audience.json");
        std::fs::write(&path, r#"{"segments": ["builders"]}"#).unwrap();

        let mut sources = BTreeMap::new();
        sources.insert("audience".to_string(), SourceInput::File { path });

        let adapter = ConfiguredSourceAdapter::new("audience");
        let entry = adapter.fetch_one(&run_config_with(sources)).await;

        assert!((entry.quality_score - 1.0).abs() < f64::EPSILON);
        assert_eq!(entry.payload["segments"][0], "builders");
    }

    #[tokio::test]
    async fn test_missing_file_is_placeholder() {
        let mut sources = BTreeMap::new();
        sources.insert(
            "audience".to_string(),
            SourceInput::File {
                path: "/nonexistent/audience.json".into(),
            },
        );

        let adapter = ConfiguredSourceAdapter::new("audience");
        let entry = adapter.fetch_one(&run_config_with(sources)).await;
        assert!(entry.is_placeholder());
    }

    #[tokio::test]
    async fn test_malformed_file_is_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json at all").unwrap();

        let mut sources = BTreeMap::new();
        sources.insert("strategy".to_string(), SourceInput::File { path });

        let adapter = ConfiguredSourceAdapter::new("strategy");
        let entry = adapter.fetch_one(&run_config_with(sources)).await;
        assert!(entry.is_placeholder());
    }
}
