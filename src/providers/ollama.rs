//! Ollama provider implementation for Parley
//!
//! This module implements the Provider trait for Ollama, connecting to a local
//! or remote Ollama server through its `/api/chat` endpoint. Streamed replies
//! arrive as newline-delimited JSON objects; the object with `done: true`
//! ends the stream.

use crate::config::OllamaConfig;
use crate::error::{ParleyError, Result};
use crate::providers::stream::{spawn_fragment_pump, FrameDecoder, LineDecoder};
use crate::providers::{
    classify_http_status, classify_transport_error, CompletionRequest, CompletionResponse,
    FragmentStream, Provider, ProviderCapabilities, StreamEvent, TokenUsage,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama API provider
///
/// # Examples
///
/// ```no_run
/// use parley::config::OllamaConfig;
/// use parley::providers::{CompletionRequest, OllamaProvider, Provider, Role, Turn};
///
/// # async fn example() -> parley::error::Result<()> {
/// let provider = OllamaProvider::new(OllamaConfig::default())?;
/// let request = CompletionRequest::new("Be brief.", vec![Turn::new(Role::User, "Hello!")]);
/// let response = provider.complete(&request).await?;
/// println!("{}", response.content);
/// # Ok(())
/// # }
/// ```
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

/// Message structure for Ollama API
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

/// Response structure from Ollama API
///
/// Streamed replies send one of these per line; only the last has `done` set.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::config::OllamaConfig;
    /// use parley::providers::OllamaProvider;
    ///
    /// let config = OllamaConfig {
    ///     host: "http://localhost:11434".to_string(),
    ///     model: "llama3.2:latest".to_string(),
    ///     ..Default::default()
    /// };
    /// let provider = OllamaProvider::new(config);
    /// assert!(provider.is_ok());
    /// ```
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self { client, config })
    }

    /// Get the configured Ollama host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Convert a completion request to Ollama format
    fn convert_request(&self, request: &CompletionRequest, stream: bool) -> OllamaRequest {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(OllamaMessage {
            role: "system".to_string(),
            content: request.system_instructions.clone(),
        });
        messages.extend(request.turns.iter().map(|turn| OllamaMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }));

        OllamaRequest {
            model: self.config.model.clone(),
            messages,
            stream,
        }
    }

    /// Send a request and fail on non-success status codes
    async fn send(&self, body: &OllamaRequest) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(body);
        if !body.stream {
            builder = builder.timeout(Duration::from_secs(self.config.timeout_seconds));
        }

        tracing::debug!(
            "Sending Ollama request: {} messages, stream={}",
            body.messages.len(),
            body.stream
        );

        // Streaming requests carry no client timeout, so waiting for headers is bounded here.
        let timeout_seconds = self.config.timeout_seconds;
        let response = tokio::time::timeout(Duration::from_secs(timeout_seconds), builder.send())
            .await
            .map_err(|_| {
                tracing::error!("Ollama request timed out after {}s", timeout_seconds);
                ParleyError::Timeout {
                    seconds: timeout_seconds,
                }
            })?
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                classify_transport_error("Ollama", e, timeout_seconds)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(classify_http_status("Ollama", status, &error_text).into());
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = self.convert_request(request, false);
        let response = self.send(&body).await?;

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            ParleyError::Provider(format!("Failed to parse Ollama response: {}", e))
        })?;

        if let Some(error) = ollama_response.error {
            return Err(ParleyError::Provider(format!("Ollama error: {}", error)).into());
        }

        tracing::debug!(
            "Ollama response: done={}, prompt_tokens={}, completion_tokens={}",
            ollama_response.done,
            ollama_response.prompt_eval_count,
            ollama_response.eval_count
        );

        let content = ollama_response
            .message
            .map(|m| m.content)
            .unwrap_or_default();

        let response = if ollama_response.prompt_eval_count > 0 || ollama_response.eval_count > 0 {
            let usage = TokenUsage::new(
                ollama_response.prompt_eval_count,
                ollama_response.eval_count,
            );
            CompletionResponse::with_usage(content, usage)
        } else {
            CompletionResponse::new(content)
        };

        Ok(response)
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let body = self.convert_request(request, true);
        let response = self.send(&body).await?;

        Ok(spawn_fragment_pump(
            "Ollama",
            response.bytes_stream(),
            OllamaStreamDecoder::default(),
            self.config.timeout_seconds,
        ))
    }

    fn get_current_model(&self) -> Result<String> {
        Ok(self.config.model.clone())
    }

    fn get_provider_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_token_counts: true,
        }
    }
}

/// Maps Ollama's newline-delimited JSON onto stream events
#[derive(Debug, Default)]
pub(crate) struct OllamaStreamDecoder {
    lines: LineDecoder,
}

impl OllamaStreamDecoder {
    fn convert_line(line: &str, out: &mut Vec<StreamEvent>) -> Result<()> {
        let chunk: OllamaResponse = serde_json::from_str(line).map_err(|e| {
            ParleyError::Provider(format!("Failed to parse Ollama stream chunk: {}", e))
        })?;

        if let Some(error) = chunk.error {
            return Err(ParleyError::Provider(format!("Ollama stream error: {}", error)).into());
        }

        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                out.push(StreamEvent::Fragment(message.content));
            }
        }
        if chunk.done {
            out.push(StreamEvent::Done);
        }
        Ok(())
    }
}

impl FrameDecoder for OllamaStreamDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        let mut out = Vec::new();
        for line in self.lines.push(chunk) {
            Self::convert_line(&line, &mut out)?;
        }
        Ok(out)
    }

    fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        let mut out = Vec::new();
        if let Some(line) = self.lines.finish() {
            Self::convert_line(&line, &mut out)?;
        }
        Ok(out)
    }
}
