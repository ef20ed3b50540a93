//! Groq provider implementation for Parley
//!
//! Groq serves an OpenAI-compatible chat completions API. Replies are either
//! returned whole or streamed as Server-Sent Events whose `data:` payloads are
//! JSON chunks, ending with a literal `data: [DONE]`.

use crate::config::GroqConfig;
use crate::error::{ParleyError, Result};
use crate::providers::stream::{spawn_fragment_pump, FrameDecoder, SseDecoder, SseEvent};
use crate::providers::{
    classify_http_status, classify_transport_error, CompletionRequest, CompletionResponse,
    FragmentStream, Provider, ProviderCapabilities, StreamEvent, TokenUsage,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Groq API base URL
pub const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Terminal payload of an OpenAI-style event stream
const DONE_SENTINEL: &str = "[DONE]";

/// Groq API provider
///
/// # Examples
///
/// ```no_run
/// use parley::config::{Credential, GroqConfig};
/// use parley::providers::{CompletionRequest, GroqProvider, Provider, Role, Turn};
///
/// # async fn example() -> parley::error::Result<()> {
/// let config = GroqConfig {
///     api_key: Some(Credential::new("gsk_example")),
///     ..Default::default()
/// };
/// let provider = GroqProvider::new(config)?;
/// let request = CompletionRequest::new("Be brief.", vec![Turn::new(Role::User, "Hello!")]);
/// let response = provider.complete(&request).await?;
/// println!("{}", response.content);
/// # Ok(())
/// # }
/// ```
pub struct GroqProvider {
    client: Client,
    config: GroqConfig,
}

/// Request structure for the chat completions endpoint
#[derive(Debug, Serialize)]
struct GroqRequest {
    model: String,
    messages: Vec<GroqMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Message structure for the chat completions endpoint
#[derive(Debug, Serialize, Deserialize)]
struct GroqMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

/// Non-streamed response
#[derive(Debug, Deserialize)]
struct GroqResponse {
    #[serde(default)]
    choices: Vec<GroqChoice>,
    #[serde(default)]
    usage: Option<GroqUsage>,
}

/// Choice in a non-streamed response
#[derive(Debug, Deserialize)]
struct GroqChoice {
    message: GroqMessage,
}

/// Token usage reported by Groq
#[derive(Debug, Deserialize)]
struct GroqUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

/// One streamed chunk
#[derive(Debug, Deserialize)]
struct GroqChunk {
    #[serde(default)]
    choices: Vec<GroqChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Choice in a streamed chunk
#[derive(Debug, Deserialize)]
struct GroqChunkChoice {
    #[serde(default)]
    delta: GroqDelta,
}

/// Incremental content of a streamed chunk
#[derive(Debug, Default, Deserialize)]
struct GroqDelta {
    #[serde(default)]
    content: Option<String>,
}

impl GroqProvider {
    /// Create a new Groq provider instance
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials` if no API key is configured, or a provider
    /// error if the HTTP client cannot be built
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::config::{Credential, GroqConfig};
    /// use parley::providers::GroqProvider;
    ///
    /// let config = GroqConfig {
    ///     api_key: Some(Credential::new("gsk_example")),
    ///     ..Default::default()
    /// };
    /// assert!(GroqProvider::new(config).is_ok());
    /// assert!(GroqProvider::new(GroqConfig::default()).is_err());
    /// ```
    pub fn new(config: GroqConfig) -> Result<Self> {
        if config.api_key.as_ref().map_or(true, |key| key.is_empty()) {
            return Err(ParleyError::MissingCredentials(
                "groq (set PARLEY_GROQ_API_KEY or provider.groq.api_key)".to_string(),
            )
            .into());
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Groq provider: base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self { client, config })
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Build an API endpoint URL from the configured base
    fn api_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Convert a completion request to Groq format
    fn convert_request(&self, request: &CompletionRequest, stream: bool) -> GroqRequest {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(GroqMessage {
            role: "system".to_string(),
            content: Some(request.system_instructions.clone()),
        });
        messages.extend(request.turns.iter().map(|turn| GroqMessage {
            role: turn.role.as_str().to_string(),
            content: Some(turn.content.clone()),
        }));

        GroqRequest {
            model: self.config.model.clone(),
            messages,
            stream,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    /// Send a request and fail on non-success status codes
    async fn send(&self, body: &GroqRequest) -> Result<reqwest::Response> {
        let token = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| ParleyError::MissingCredentials("groq".to_string()))?;

        let mut builder = self
            .client
            .post(self.api_endpoint("chat/completions"))
            .bearer_auth(token.expose())
            .json(body);
        if !body.stream {
            builder = builder.timeout(Duration::from_secs(self.config.timeout_seconds));
        }

        tracing::debug!(
            "Sending Groq request: {} messages, stream={}",
            body.messages.len(),
            body.stream
        );

        // Streaming requests carry no client timeout, so waiting for headers is bounded here.
        let timeout_seconds = self.config.timeout_seconds;
        let response = tokio::time::timeout(Duration::from_secs(timeout_seconds), builder.send())
            .await
            .map_err(|_| {
                tracing::error!("Groq request timed out after {}s", timeout_seconds);
                ParleyError::Timeout {
                    seconds: timeout_seconds,
                }
            })?
            .map_err(|e| {
                tracing::error!("Groq request failed: {}", e);
                classify_transport_error("Groq", e, timeout_seconds)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Groq returned error {}: {}", status, error_text);
            return Err(classify_http_status("Groq", status, &error_text).into());
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for GroqProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = self.convert_request(request, false);
        let response = self.send(&body).await?;

        let groq_response: GroqResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Groq response: {}", e);
            ParleyError::Provider(format!("Failed to parse Groq response: {}", e))
        })?;

        let content = groq_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ParleyError::Provider("Groq response contained no choices".to_string()))?;

        Ok(match groq_response.usage {
            Some(usage) => CompletionResponse::with_usage(
                content,
                TokenUsage::new(usage.prompt_tokens, usage.completion_tokens),
            ),
            None => CompletionResponse::new(content),
        })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let body = self.convert_request(request, true);
        let response = self.send(&body).await?;

        Ok(spawn_fragment_pump(
            "Groq",
            response.bytes_stream(),
            GroqStreamDecoder::default(),
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

/// Maps Groq's Server-Sent Events onto stream events
#[derive(Debug, Default)]
pub(crate) struct GroqStreamDecoder {
    sse: SseDecoder,
}

impl GroqStreamDecoder {
    fn convert_event(event: &SseEvent, out: &mut Vec<StreamEvent>) -> Result<()> {
        let data = event.data.trim();
        if data == DONE_SENTINEL {
            out.push(StreamEvent::Done);
            return Ok(());
        }

        let chunk: GroqChunk = serde_json::from_str(data).map_err(|e| {
            ParleyError::Provider(format!("Failed to parse Groq stream chunk: {}", e))
        })?;

        if let Some(error) = chunk.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ParleyError::Provider(format!("Groq stream error: {}", message)).into());
        }

        out.extend(
            chunk
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .filter(|content| !content.is_empty())
                .map(StreamEvent::Fragment),
        );
        Ok(())
    }
}

impl FrameDecoder for GroqStreamDecoder {
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        let mut out = Vec::new();
        for event in self.sse.push(chunk) {
            Self::convert_event(&event, &mut out)?;
        }
        Ok(out)
    }

    fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        let mut out = Vec::new();
        if let Some(event) = self.sse.finish() {
            Self::convert_event(&event, &mut out)?;
        }
        Ok(out)
    }
}
