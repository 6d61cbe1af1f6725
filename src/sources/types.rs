//! Common types used across data source adapters.
//!
//! A pipeline run starts by resolving a set of named sources (strategy,
//! content gaps, keywords, audience, performance data, prior analysis) into
//! one immutable snapshot. Each entry carries a freshness/quality score;
//! a score of zero marks a placeholder for a source that could not be
//! fetched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Strategy data for the brand/channel being planned.
pub const SOURCE_STRATEGY: &str = "strategy";
/// Gaps identified against competitors' content.
pub const SOURCE_CONTENT_GAPS: &str = "content-gaps";
/// Keyword research data.
pub const SOURCE_KEYWORDS: &str = "keywords";
/// Audience/segment analysis.
pub const SOURCE_AUDIENCE: &str = "audience";
/// Historical content performance metrics.
pub const SOURCE_PERFORMANCE: &str = "performance-data";
/// Output of a prior AI analysis run, if any.
pub const SOURCE_PRIOR_ANALYSIS: &str = "prior-analysis";

/// All source names known to the shipped step catalog.
pub const KNOWN_SOURCES: [&str; 6] = [
    SOURCE_STRATEGY,
    SOURCE_CONTENT_GAPS,
    SOURCE_KEYWORDS,
    SOURCE_AUDIENCE,
    SOURCE_PERFORMANCE,
    SOURCE_PRIOR_ANALYSIS,
];

/// One fetched data source, captured once at run start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSnapshot {
    /// Name of the source.
    pub source: String,

    /// Normalized payload; empty object for placeholders.
    pub payload: serde_json::Value,

    /// Completeness/freshness estimate, 0.0-1.0. Zero marks a placeholder.
    pub quality_score: f64,

    /// When the payload was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl SourceSnapshot {
    /// Create a snapshot with a fetched payload.
    pub fn new(source: impl Into<String>, payload: serde_json::Value, quality_score: f64) -> Self {
        Self {
            source: source.into(),
            payload,
            quality_score: quality_score.clamp(0.0, 1.0),
            fetched_at: Utc::now(),
        }
    }

    /// Create a zero-quality placeholder for a source that failed to fetch.
    pub fn placeholder(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
            quality_score: 0.0,
            fetched_at: Utc::now(),
        }
    }

    /// Whether this entry is a placeholder for a failed fetch.
    pub fn is_placeholder(&self) -> bool {
        self.quality_score == 0.0
    }
}

impl fmt::Display for SourceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (quality {:.2}{})",
            self.source,
            self.quality_score,
            if self.is_placeholder() {
                ", placeholder"
            } else {
                ""
            }
        )
    }
}

/// The immutable per-run mapping of source name to snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSnapshot {
    entries: BTreeMap<String, SourceSnapshot>,
}

impl InputSnapshot {
    /// Build a snapshot from fetched entries.
    pub fn from_entries(entries: impl IntoIterator<Item = SourceSnapshot>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.source.clone(), entry))
                .collect(),
        }
    }

    /// Look up a source by name.
    pub fn get(&self, source: &str) -> Option<&SourceSnapshot> {
        self.entries.get(source)
    }

    /// Whether a source is present with a non-zero quality score.
    pub fn is_usable(&self, source: &str) -> bool {
        self.get(source).is_some_and(|entry| !entry.is_placeholder())
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceSnapshot> {
        self.entries.values()
    }

    /// Number of captured sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no sources were captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean quality across all captured sources.
    pub fn mean_quality(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: f64 = self.entries.values().map(|e| e.quality_score).sum();
        total / self.entries.len() as f64
    }
}
