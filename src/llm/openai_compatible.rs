// ABOUTME: Generic OpenAI-compatible LLM provider for local and cloud endpoints
// ABOUTME: Supports DeepSeek, Ollama, vLLM, and any OpenAI-compatible API
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 TableChat Contributors

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use super::{ChatMessage, ChatRequest, ChatResponse, ChatStream, LlmProvider, StreamChunk, TokenUsage};
use crate::config::LlmConfig;
use crate::errors::{AppError, ErrorCode};

/// Connection timeout (lenient enough for local servers)
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Request timeout (local inference can be slow)
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// OpenAI-compatible API request structure
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Message structure for OpenAI-compatible API
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

impl From<&ChatMessage> for OpenAiMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role.as_str().to_owned(),
            content: msg.content.clone(),
        }
    }
}

/// OpenAI-compatible API response structure
#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    #[serde(rename = "prompt_tokens")]
    prompt: u32,
    #[serde(rename = "completion_tokens")]
    completion: u32,
    #[serde(rename = "total_tokens")]
    total: u32,
}

/// Streaming chunk structure
#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Error response structure
#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Configuration for the `OpenAI`-compatible provider
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// Base URL for the API (e.g., <https://api.deepseek.com/v1>)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    /// Default model to use
    pub default_model: String,
}

impl From<&LlmConfig> for OpenAiCompatibleConfig {
    fn from(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            default_model: config.model.clone(),
        }
    }
}

/// Generic `OpenAI`-compatible LLM provider
///
/// Works with any endpoint that implements the `OpenAI` chat completions API,
/// including DeepSeek, Ollama, vLLM, and other cloud services.
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        info!(
            "Initializing LLM provider: base_url={}, model={}",
            config.base_url, config.default_model
        );

        Ok(Self { client, config })
    }

    /// Create a provider from the server's LLM configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &LlmConfig) -> Result<Self, AppError> {
        Self::new(OpenAiCompatibleConfig::from(config))
    }

    /// Build the API URL for a given endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAiMessage> {
        messages.iter().map(OpenAiMessage::from).collect()
    }

    /// Parse error response from API
    fn parse_error_response(status: reqwest::StatusCode, body: &str) -> AppError {
        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            let error_type = error_response
                .error
                .error_type
                .unwrap_or_else(|| "unknown".to_owned());

            match status.as_u16() {
                429 => AppError::new(
                    ErrorCode::RateLimitExceeded,
                    "Model rate limit reached. Please wait a moment and try again.",
                ),
                400 => AppError::invalid_input(format!(
                    "API validation error: {}",
                    error_response.error.message
                )),
                404 => AppError::not_found(format!(
                    "Model or endpoint ({})",
                    error_response.error.message
                )),
                503 => AppError::new(
                    ErrorCode::ExternalServiceUnavailable,
                    format!("Model service unavailable: {}", error_response.error.message),
                ),
                _ => AppError::external_service(
                    "llm",
                    format!("{} - {}", error_type, error_response.error.message),
                ),
            }
        } else {
            // Local servers often return non-JSON errors
            match status.as_u16() {
                502..=504 => AppError::new(
                    ErrorCode::ExternalServiceUnavailable,
                    "Model server is not responding",
                ),
                _ => AppError::external_service(
                    "llm",
                    format!(
                        "API error ({}): {}",
                        status,
                        body.chars().take(200).collect::<String>()
                    ),
                ),
            }
        }
    }

    fn connect_error(&self, e: &reqwest::Error) -> AppError {
        if e.is_connect() {
            AppError::external_service(
                "llm",
                format!(
                    "Cannot connect to model endpoint. Is the server running at {}?",
                    self.config.base_url
                ),
            )
        } else {
            AppError::external_service("llm", format!("Failed to connect: {e}"))
        }
    }

    /// Add authorization header if API key is configured
    fn add_auth_header(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref api_key) = self.config.api_key {
            request.header("Authorization", format!("Bearer {api_key}"))
        } else {
            request
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        "openai_compatible"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);

        let openai_request = OpenAiRequest {
            model: model.to_owned(),
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(false),
        };

        let http_request = self
            .client
            .post(self.api_url("chat/completions"))
            .header("Content-Type", "application/json")
            .json(&openai_request);

        let response = self
            .add_auth_header(http_request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send completion request: {}", e);
                self.connect_error(&e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read API response: {}", e);
            AppError::external_service("llm", format!("Failed to read response: {e}"))
        })?;

        if !status.is_success() {
            return Err(Self::parse_error_response(status, &body));
        }

        let openai_response: OpenAiResponse = serde_json::from_str(&body).map_err(|e| {
            error!(
                "Failed to parse API response: {} - body: {}",
                e,
                &body[..body.len().min(500)]
            );
            AppError::external_service("llm", format!("Failed to parse response: {e}"))
        })?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::external_service("llm", "API returned no choices"))?;

        let content = choice.message.content.unwrap_or_default();

        debug!(
            "Received completion: {} chars, finish_reason: {:?}",
            content.len(),
            choice.finish_reason
        );

        Ok(ChatResponse {
            content,
            model: openai_response.model,
            usage: openai_response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt,
                completion_tokens: u.completion,
                total_tokens: u.total,
            }),
            finish_reason: choice.finish_reason,
        })
    }

    #[instrument(skip(self, request), fields(model = %request.model.as_deref().unwrap_or(&self.config.default_model)))]
    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);

        debug!("Sending streaming chat completion request");

        let openai_request = OpenAiRequest {
            model: model.to_owned(),
            messages: Self::convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: Some(true),
        };

        let http_request = self
            .client
            .post(self.api_url("chat/completions"))
            .header("Content-Type", "application/json")
            .json(&openai_request);

        let response = self
            .add_auth_header(http_request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send streaming request: {}", e);
                self.connect_error(&e)
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::parse_error_response(status, &body));
        }

        let byte_stream = response.bytes_stream();

        // Several "data: {...}" events can share one network chunk, and one
        // event can span two chunks, so complete lines are drained through a
        // carry-over buffer and every parsed chunk is forwarded.
        let stream = byte_stream
            .scan(String::new(), |buffer, chunk_result| {
                let parsed: Vec<Result<StreamChunk, AppError>> = match chunk_result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_events(buffer).into_iter().map(Ok).collect()
                    }
                    Err(e) => {
                        error!("Error reading stream: {}", e);
                        vec![Err(AppError::external_service(
                            "llm",
                            format!("Stream read error: {e}"),
                        ))]
                    }
                };
                future::ready(Some(stream::iter(parsed)))
            })
            .flatten()
            .filter(|result| {
                // Drop empty deltas unless it's the final chunk
                future::ready(
                    result
                        .as_ref()
                        .map_or(true, |chunk| !chunk.delta.is_empty() || chunk.is_final),
                )
            });

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, AppError> {
        debug!("Performing LLM health check at {}", self.config.base_url);

        // The models endpoint is a lightweight liveness probe
        let http_request = self.client.get(self.api_url("models"));

        let response = self
            .add_auth_header(http_request)
            .send()
            .await
            .map_err(|e| {
                error!("LLM health check failed: {}", e);
                self.connect_error(&e)
            })?;

        let healthy = response.status().is_success();

        if !healthy {
            warn!("LLM health check failed with status: {}", response.status());
        }

        Ok(healthy)
    }
}

/// Parse every complete SSE line in `buffer`, leaving a trailing partial
/// line in place for the next network chunk.
fn drain_sse_events(buffer: &mut String) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while let Some(newline) = buffer.find('\n') {
        let line: String = buffer.drain(..=newline).collect();
        if let Some(chunk) = parse_sse_line(line.trim()) {
            chunks.push(chunk);
        }
    }
    chunks
}

/// Parse one `data:` line; blank lines, comments, and bad JSON yield `None`
fn parse_sse_line(line: &str) -> Option<StreamChunk> {
    if line.is_empty() {
        return None;
    }
    if line == "data: [DONE]" {
        return Some(StreamChunk {
            delta: String::new(),
            is_final: true,
            finish_reason: Some("stop".to_owned()),
        });
    }

    let json_str = line.strip_prefix("data: ")?;
    match serde_json::from_str::<OpenAiStreamChunk>(json_str) {
        Ok(chunk) => chunk.choices.into_iter().next().map(|choice| {
            let delta = choice.delta.content.unwrap_or_default();
            let is_final = choice.finish_reason.is_some();
            StreamChunk {
                delta,
                is_final,
                finish_reason: choice.finish_reason,
            }
        }),
        Err(e) => {
            warn!("Failed to parse stream chunk: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(text: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{text}\"}},\"finish_reason\":null}}]}}\n\n"
        )
    }

    #[test]
    fn several_events_in_one_segment_all_parse() {
        let mut buffer = format!("{}{}", delta_line("hello "), delta_line("world"));
        let chunks = drain_sse_events(&mut buffer);

        let text: String = chunks.iter().map(|c| c.delta.as_str()).collect();
        assert_eq!(text, "hello world");
        assert!(buffer.is_empty());
    }

    #[test]
    fn event_split_across_segments_is_buffered() {
        let line = delta_line("abc");
        let (head, tail) = line.split_at(20);

        let mut buffer = head.to_owned();
        assert!(drain_sse_events(&mut buffer).is_empty());

        buffer.push_str(tail);
        let chunks = drain_sse_events(&mut buffer);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].delta, "abc");
    }

    #[test]
    fn done_marker_closes_the_stream() {
        let chunk = parse_sse_line("data: [DONE]").expect("chunk");
        assert!(chunk.is_final);
        assert!(chunk.delta.is_empty());
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn comments_and_garbage_are_skipped() {
        assert!(parse_sse_line("").is_none());
        assert!(parse_sse_line(": keep-alive").is_none());
        assert!(parse_sse_line("data: not-json").is_none());
    }
}
