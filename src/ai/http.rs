//! OpenAI-compatible HTTP adapter for the AI backend.
//!
//! Talks to a chat-completions endpoint and, for context pinning, to a
//! provider `/context/pin` extension. Transport-level concerns (auth
//! headers, error-body decoding, rate-limit classification) live here;
//! the pipeline's own retry/backoff is layered on top by the executor.

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

use super::backend::{content_hash, AiBackend, AiRequest, AiResponse, CacheHandle, ContextPayload};
use crate::error::AiError;

/// Default pin lifetime assumed when the provider omits an expiry.
const DEFAULT_PIN_TTL_SECS: i64 = 300;

/// Client for OpenAI-compatible chat-completions APIs.
pub struct HttpAiBackend {
    /// Base URL for the API.
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// Model identifier sent with every request.
    model: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl HttpAiBackend {
    /// Create a new backend with explicit configuration.
    pub fn new(api_base: String, api_key: Option<String>, model: String) -> Self {
        Self {
            api_base,
            api_key,
            model,
            http_client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Create a new backend from environment variables.
    ///
    /// Reads:
    /// - `CALFORGE_API_BASE`: Base URL for the API (required)
    /// - `CALFORGE_API_KEY`: API key for authentication (optional)
    /// - `CALFORGE_MODEL`: Model id (defaults to "anthropic/claude-sonnet-4.5")
    ///
    /// # Errors
    ///
    /// Returns `AiError::MissingApiBase` if `CALFORGE_API_BASE` is not set.
    pub fn from_env() -> Result<Self, AiError> {
        let api_base = env::var("CALFORGE_API_BASE").map_err(|_| AiError::MissingApiBase)?;
        let api_key = env::var("CALFORGE_API_KEY").ok();
        let model = env::var("CALFORGE_MODEL")
            .unwrap_or_else(|_| "anthropic/claude-sonnet-4.5".to_string());

        Ok(Self::new(api_base, api_key, model))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    /// Decode a non-success response body into an `AiError`.
    async fn decode_error(response: reqwest::Response) -> AiError {
        let code = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&body) {
            if code == 429 {
                return AiError::RateLimited(parsed.error.message);
            }
            // Providers signal a forgotten pin with a dedicated error code.
            if parsed.error.code.as_deref() == Some("context_expired") {
                return AiError::CacheExpired(parsed.error.message);
            }
            return AiError::ApiError {
                code,
                message: parsed.error.message,
            };
        }

        AiError::ApiError {
            code,
            message: body,
        }
    }
}

/// Internal message structure for the chat-completions API.
#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

/// Internal request structure for the chat-completions API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_handle: Option<String>,
}

/// Internal response structure from the chat-completions API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Response from the context-pin endpoint.
#[derive(Debug, Deserialize)]
struct PinResponse {
    id: String,
    #[serde(default)]
    expires_at: Option<chrono::DateTime<Utc>>,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    code: Option<String>,
}

#[async_trait::async_trait]
impl AiBackend for HttpAiBackend {
    async fn invoke(&self, request: AiRequest) -> Result<AiResponse, AiError> {
        let (context_handle, context_text) = match &request.context {
            ContextPayload::Raw { content } => (None, content.clone()),
            ContextPayload::Cached { handle, suffix } => (Some(handle.id.clone()), suffix.clone()),
        };

        let user_content = if context_text.is_empty() {
            request.instruction.clone()
        } else {
            format!("{context_text}\n\n{}", request.instruction)
        };

        let api_request = ApiRequest {
            model: self.model.clone(),
            messages: vec![
                ApiMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ApiMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            context_handle,
        };

        let url = format!("{}/chat/completions", self.api_base);
        let response = self
            .authorized(self.http_client.post(&url))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| AiError::ParseError(format!("Failed to parse API response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AiError::ParseError("No choices in API response".to_string()))?;

        tracing::debug!(
            step_id = %request.step_id,
            prompt_tokens = api_response.usage.prompt_tokens,
            completion_tokens = api_response.usage.completion_tokens,
            "AI call completed"
        );

        Ok(AiResponse {
            content,
            prompt_tokens: api_response.usage.prompt_tokens,
            completion_tokens: api_response.usage.completion_tokens,
        })
    }

    async fn pin_context(&self, content: &str) -> Result<CacheHandle, AiError> {
        let url = format!("{}/context/pin", self.api_base);
        let response = self
            .authorized(self.http_client.post(&url))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }

        let pin: PinResponse = response
            .json()
            .await
            .map_err(|e| AiError::ParseError(format!("Failed to parse pin response: {e}")))?;

        let expires_at = pin
            .expires_at
            .unwrap_or_else(|| Utc::now() + Duration::seconds(DEFAULT_PIN_TTL_SECS));

        tracing::debug!(handle = %pin.id, %expires_at, bytes = content.len(), "Context pinned");

        Ok(CacheHandle {
            id: pin.id,
            expires_at,
            content_hash: content_hash(content),
        })
    }
}
