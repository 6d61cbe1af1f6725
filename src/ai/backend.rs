//! AI backend abstraction consumed by the pipeline core.
//!
//! The backend is an opaque request/response service. Two operations are
//! required: [`AiBackend::invoke`] for one generation call, and
//! [`AiBackend::pin_context`] to register a block of context provider-side
//! so later calls can reference it by handle instead of resending it.
//!
//! Transport, auth, and raw network retries of pure connection failures
//! belong to the adapter. The executor's own retry/backoff applies to
//! schema and logical failures and is orthogonal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AiError;

/// Opaque reference to a block of context pinned on the provider side.
///
/// Carries a local expiry timestamp so the store can detect staleness
/// without a round trip, and a content hash so a refreshed pin of the same
/// bytes can be recognized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHandle {
    /// Provider-assigned handle identifier.
    pub id: String,
    /// When the provider will forget the pinned context.
    pub expires_at: DateTime<Utc>,
    /// Hex SHA-256 of the pinned content.
    pub content_hash: String,
}

impl CacheHandle {
    /// Whether the handle has passed its local expiry timestamp.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Compute the hex SHA-256 hash of a context block.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Context carried by a generation request: either the full raw bundle, or
/// a provider-side handle plus the step-specific suffix that is not covered
/// by the pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextPayload {
    /// The full serialized context bundle.
    Raw { content: String },
    /// A pinned prefix referenced by handle, plus the uncovered suffix.
    Cached { handle: CacheHandle, suffix: String },
}

impl ContextPayload {
    /// Approximate byte size of what actually travels over the wire.
    pub fn wire_len(&self) -> usize {
        match self {
            ContextPayload::Raw { content } => content.len(),
            ContextPayload::Cached { handle, suffix } => handle.id.len() + suffix.len(),
        }
    }
}

/// One generation request built by the step executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRequest {
    /// Identifier of the step this request belongs to.
    pub step_id: String,
    /// System prompt establishing the step's role.
    pub system_prompt: String,
    /// Accumulated run context, raw or pinned.
    pub context: ContextPayload,
    /// Instruction body for this step, including the output schema contract.
    pub instruction: String,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl AiRequest {
    /// Create a request with default sampling parameters.
    pub fn new(
        step_id: impl Into<String>,
        system_prompt: impl Into<String>,
        context: ContextPayload,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            system_prompt: system_prompt.into(),
            context,
            instruction: instruction.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    /// Raw text content of the completion.
    pub content: String,
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens generated.
    pub completion_tokens: u32,
}

impl AiResponse {
    /// Total tokens used by the call.
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Trait for AI backends that can generate step outputs and pin context.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Generate a response for the given request.
    async fn invoke(&self, request: AiRequest) -> Result<AiResponse, AiError>;

    /// Pin a block of context provider-side and return an opaque handle.
    async fn pin_context(&self, content: &str) -> Result<CacheHandle, AiError>;
}
