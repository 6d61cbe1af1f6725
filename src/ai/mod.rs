//! AI backend integration for calforge.
//!
//! The pipeline talks to the generative model through the [`AiBackend`]
//! trait: one `invoke` per step attempt, plus `pin_context` so a phase's
//! shared context can be referenced by handle instead of resent on every
//! call. A concrete OpenAI-compatible HTTP adapter is provided; tests use
//! scripted backends.

pub mod backend;
pub mod http;
pub mod json;

pub use backend::{
    content_hash, AiBackend, AiRequest, AiResponse, CacheHandle, ContextPayload,
};
pub use http::HttpAiBackend;
pub use json::{extract_json, JsonExtractionError};
