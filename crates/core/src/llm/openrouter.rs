// crates/core/src/llm/openrouter.rs
//! OpenRouter extractor: bulk extraction over the chat-completions API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::Extractor;
use super::schema::{build_extraction_prompt, handoff_json_schema, parse_response};
use super::types::{ExtractError, ExtractedHandoff, ExtractionRequest};

pub const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Economical extractor used by batch imports.
pub struct OpenRouterExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterExtractor {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExtractError::NotAvailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: OPENROUTER_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "handoff",
                    "schema": handoff_json_schema()
                }
            }
        })
    }
}

/// Pull the assistant message text out of a chat-completions response body.
fn message_content(body: &str) -> Result<String, ExtractError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ExtractError::ProviderError(format!("invalid completion body: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ExtractError::ProviderError("completion had no content".into()))
}

#[async_trait]
impl Extractor for OpenRouterExtractor {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractedHandoff, ExtractError> {
        let t0 = std::time::Instant::now();
        let prompt = build_extraction_prompt(&request.transcript, request.project_hint.as_deref());

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&self.request_body(&prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractError::Timeout(REQUEST_TIMEOUT.as_secs())
                } else {
                    ExtractError::ProviderError(format!("network error: {e}"))
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ExtractError::ProviderError(format!("failed to read body: {e}")))?;
        let elapsed_ms = t0.elapsed().as_millis() as u64;

        if !status.is_success() {
            let snippet: String = body.chars().take(300).collect();
            tracing::warn!(session_id = %request.session_id, %status, elapsed_ms, "openrouter: request failed");
            return Err(ExtractError::ProviderError(format!("API error {status}: {snippet}")));
        }

        tracing::debug!(session_id = %request.session_id, elapsed_ms, body_len = body.len(), "openrouter: response received");
        parse_response(&message_content(&body)?)
    }

    fn name(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
