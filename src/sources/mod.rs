//! Data source collection for calforge.
//!
//! Named sources (strategy, gaps, keywords, audience, performance, prior
//! analysis) are resolved once per run into an immutable
//! [`InputSnapshot`]. Adapters are infallible by contract: failures become
//! zero-quality placeholders, and steps declaring the source as required
//! fail fast later with a descriptive error.

pub mod adapters;
pub mod registry;
pub mod types;

pub use adapters::ConfiguredSourceAdapter;
pub use registry::{DataSourceRegistry, SourceAdapter};
pub use types::{
    InputSnapshot, SourceSnapshot, KNOWN_SOURCES, SOURCE_AUDIENCE, SOURCE_CONTENT_GAPS,
    SOURCE_KEYWORDS, SOURCE_PERFORMANCE, SOURCE_PRIOR_ANALYSIS, SOURCE_STRATEGY,
};
