//! Run context: the accumulating state of one pipeline execution.
//!
//! The [`ContextStore`] owns the input snapshot, the append-only step
//! outputs, the running aggregate quality, and the run's provider-side
//! cache handle. [`ContextBundle`] is the size-bounded projection handed
//! to each step's AI request.

pub mod bundle;
pub mod cache;
pub mod store;

pub use bundle::ContextBundle;
pub use cache::CacheStats;
pub use store::{ContextError, ContextStore};
