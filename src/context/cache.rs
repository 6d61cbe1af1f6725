//! Run-scoped cache-handle state.
//!
//! At most one provider-side pin is live per run: the rendered shared
//! prefix (run directives + input snapshot). The state tracks the handle,
//! detects local TTL expiry and content drift, and counts pins, reuses,
//! and fallbacks for the run report. Handles are never shared across runs.

use chrono::{DateTime, Utc};

use crate::ai::CacheHandle;

/// Statistics about cache-handle usage during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Pin calls issued to the provider.
    pub pins: u64,
    /// Requests that reused a live handle.
    pub reuses: u64,
    /// Requests that fell back to raw context after expiry.
    pub fallbacks: u64,
    /// Handles dropped on provider-side expiry errors.
    pub invalidations: u64,
}

/// Holder for the run's current cache handle.
#[derive(Debug, Default)]
pub struct ContextCache {
    handle: Option<CacheHandle>,
    stats: CacheStats,
}

impl ContextCache {
    /// Create empty cache state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The live handle covering `content_hash`, if any.
    ///
    /// A handle that has expired locally or covers different content is
    /// dropped and counted as a fallback.
    pub fn live_handle(&mut self, content_hash: &str, now: DateTime<Utc>) -> Option<CacheHandle> {
        match &self.handle {
            Some(handle) if handle.is_expired(now) => {
                tracing::debug!(handle = %handle.id, "Cache handle expired locally");
                self.handle = None;
                self.stats.fallbacks += 1;
                None
            }
            Some(handle) if handle.content_hash != content_hash => {
                tracing::debug!(handle = %handle.id, "Shared prefix changed; dropping handle");
                self.handle = None;
                None
            }
            Some(handle) => {
                self.stats.reuses += 1;
                Some(handle.clone())
            }
            None => None,
        }
    }

    /// Install a freshly pinned handle.
    pub fn install(&mut self, handle: CacheHandle) {
        self.stats.pins += 1;
        self.handle = Some(handle);
    }

    /// Drop the handle after a provider-side expiry error.
    pub fn invalidate(&mut self) {
        if self.handle.take().is_some() {
            self.stats.invalidations += 1;
            self.stats.fallbacks += 1;
        }
    }

    /// Whether a handle is currently installed (expired or not).
    pub fn is_installed(&self) -> bool {
        self.handle.is_some()
    }

    /// Usage counters for the run report.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
