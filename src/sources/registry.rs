//! Data source registry: resolves named sources into one run snapshot.
//!
//! Adapters are registered by name and fetched concurrently under a bounded
//! pool at run start. An adapter must not fail the run: any internal error
//! becomes a zero-quality placeholder, and steps that declared the source
//! as required will fail their own precondition check later with a clear
//! error instead of silently consuming an empty payload.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::pipeline::config::RunConfig;

use super::types::{InputSnapshot, SourceSnapshot};

/// Adapter for one named data source.
///
/// Implementations are external collaborators; retries and source-local
/// timeouts belong inside `fetch_one`. The contract is infallible: on
/// internal failure return [`SourceSnapshot::placeholder`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name of the source this adapter resolves.
    fn name(&self) -> &str;

    /// Fetch and normalize the source payload for one run.
    async fn fetch_one(&self, run_config: &RunConfig) -> SourceSnapshot;
}

/// Registry of source adapters for a pipeline.
pub struct DataSourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    fetch_width: usize,
}

impl DataSourceRegistry {
    /// Create an empty registry with the given fetch concurrency width.
    pub fn new(fetch_width: usize) -> Self {
        Self {
            adapters: Vec::new(),
            fetch_width: fetch_width.max(1),
        }
    }

    /// Register an adapter. Later registrations win on name collisions.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters
            .retain(|existing| existing.name() != adapter.name());
        self.adapters.push(adapter);
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapters are registered.
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Fetch all registered sources concurrently into one snapshot.
    ///
    /// Sources are mutually independent, so fetches run under a bounded
    /// pool. A panicking adapter is downgraded to a placeholder entry.
    pub async fn fetch(&self, run_config: &RunConfig) -> InputSnapshot {
        let limiter = Arc::new(Semaphore::new(self.fetch_width));

        let futures: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let limiter = Arc::clone(&limiter);
                let run_config = run_config.clone();
                async move {
                    let name = adapter.name().to_string();
                    let _permit = limiter.acquire().await.expect("semaphore closed");
                    let handle =
                        tokio::spawn(async move { adapter.fetch_one(&run_config).await });
                    match handle.await {
                        Ok(entry) => entry,
                        Err(join_err) => {
                            tracing::warn!(source = %name, error = %join_err, "Source adapter panicked; recording placeholder");
                            SourceSnapshot::placeholder(name)
                        }
                    }
                }
            })
            .collect();

        let entries = futures::future::join_all(futures).await;

        for entry in &entries {
            if entry.is_placeholder() {
                tracing::warn!(source = %entry.source, "Source captured as zero-quality placeholder");
            } else {
                tracing::debug!(source = %entry.source, quality = entry.quality_score, "Source captured");
            }
        }

        InputSnapshot::from_entries(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::{MixTarget, Objective};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run_config() -> RunConfig {
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
            sources: BTreeMap::new(),
        }
    }

    struct FixedAdapter {
        name: &'static str,
        quality: f64,
    }

    #[async_trait]
    impl SourceAdapter for FixedAdapter {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_one(&self, _run_config: &RunConfig) -> SourceSnapshot {
            SourceSnapshot::new(self.name, json!({"fixture": self.name}), self.quality)
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl SourceAdapter for PanickingAdapter {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch_one(&self, _run_config: &RunConfig) -> SourceSnapshot {
            panic!("adapter bug")
        }
    }

    struct CountingAdapter {
        name: String,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SourceAdapter for CountingAdapter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch_one(&self, _run_config: &RunConfig) -> SourceSnapshot {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            SourceSnapshot::new(self.name.clone(), json!({}), 0.9)
        }
    }

    #[tokio::test]
    async fn test_fetch_collects_all_sources() {
        let mut registry = DataSourceRegistry::new(6);
        registry.register(Arc::new(FixedAdapter {
            name: "strategy",
            quality: 0.9,
        }));
        registry.register(Arc::new(FixedAdapter {
            name: "keywords",
            quality: 0.7,
        }));

        let snapshot = registry.fetch(&run_config()).await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.is_usable("strategy"));
        assert!(snapshot.is_usable("keywords"));
    }

    #[tokio::test]
    async fn test_panicking_adapter_becomes_placeholder() {
        let mut registry = DataSourceRegistry::new(6);
        registry.register(Arc::new(PanickingAdapter));
        registry.register(Arc::new(FixedAdapter {
            name: "strategy",
            quality: 0.9,
        }));

        let snapshot = registry.fetch(&run_config()).await;
        assert_eq!(snapshot.len(), 2);
        assert!(!snapshot.is_usable("broken"));
        assert!(snapshot.is_usable("strategy"));
    }

    #[tokio::test]
    async fn test_fetch_width_bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut registry = DataSourceRegistry::new(2);
        for i in 0..6 {
            registry.register(Arc::new(CountingAdapter {
                name: format!("source-{i}"),
                in_flight: Arc::clone(&in_flight),
                peak: Arc::clone(&peak),
            }));
        }

        let snapshot = registry.fetch(&run_config()).await;
        assert_eq!(snapshot.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = DataSourceRegistry::new(6);
        registry.register(Arc::new(FixedAdapter {
            name: "strategy",
            quality: 0.5,
        }));
        registry.register(Arc::new(FixedAdapter {
            name: "strategy",
            quality: 0.9,
        }));
        assert_eq!(registry.len(), 1);
    }
}
