//! Base provider trait and common types for Parley
//!
//! This module defines the Provider trait that every completion client must
//! implement, along with the request, response and streaming types that cross
//! the boundary between the session store and a provider.

use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Role of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the person using the chat
    User,
    /// Text produced by the completion client
    Assistant,
}

impl Role {
    /// Wire name of the role ("user" or "assistant")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One `{role, content}` entry of a completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the text
    pub role: Role,
    /// The text itself
    pub content: String,
}

impl Turn {
    /// Creates a new turn
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::providers::{Role, Turn};
    ///
    /// let turn = Turn::new(Role::User, "Hello");
    /// assert_eq!(turn.role, Role::User);
    /// assert_eq!(turn.content, "Hello");
    /// ```
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Prompt handed to a completion client
///
/// Always ordered as: system instructions, prior turns oldest first, and the
/// new user turn last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Fixed persona and safety rules
    pub system_instructions: String,
    /// Bounded history followed by the new user turn
    pub turns: Vec<Turn>,
}

impl CompletionRequest {
    /// Creates a new request
    pub fn new(system_instructions: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            system_instructions: system_instructions.into(),
            turns,
        }
    }

    /// The newest turn in the request (the user turn being answered)
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::providers::{CompletionRequest, Role, Turn};
    ///
    /// let request = CompletionRequest::new(
    ///     "Be brief.",
    ///     vec![Turn::new(Role::User, "a"), Turn::new(Role::Assistant, "b"), Turn::new(Role::User, "c")],
    /// );
    /// assert_eq!(request.last_turn().unwrap().content, "c");
    /// ```
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Token usage information from a completion
///
/// Tracks the number of tokens used in prompts and completions,
/// as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// A complete, non-streamed reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// The reply text
    pub content: String,
    /// Optional token usage information
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Create a new CompletionResponse
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }

    /// Create a new CompletionResponse with token usage
    pub fn with_usage(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage: Some(usage),
        }
    }
}

/// Item of an incremental reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next piece of reply text, in arrival order
    Fragment(String),
    /// Explicit end-of-stream signal; nothing follows it
    Done,
}

/// Lazy, finite, non-restartable sequence of reply fragments
///
/// A well-formed stream yields zero or more `Fragment`s followed by `Done`.
/// Failures arrive as `Err` items. A stream that ends without `Done` was
/// interrupted.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Wraps a complete reply in a well-formed single-fragment stream
///
/// # Examples
///
/// ```
/// use futures::StreamExt;
/// use parley::providers::{single_fragment_stream, StreamEvent};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// let events: Vec<_> = rt.block_on(single_fragment_stream("hi").collect::<Vec<_>>());
/// assert_eq!(events.len(), 2);
/// assert!(matches!(events[1], Ok(StreamEvent::Done)));
/// ```
pub fn single_fragment_stream(content: impl Into<String>) -> FragmentStream {
    let content = content.into();
    let mut events = Vec::with_capacity(2);
    if !content.is_empty() {
        events.push(Ok(StreamEvent::Fragment(content)));
    }
    events.push(Ok(StreamEvent::Done));
    Box::pin(futures::stream::iter(events))
}

/// Provider-level capabilities and features
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderCapabilities {
    /// Provider streams replies natively
    pub supports_streaming: bool,
    /// Provider returns token usage information in responses
    pub supports_token_counts: bool,
}

/// Provider trait for completion clients
///
/// A provider is stateless with respect to the conversation: it receives the
/// full prompt on every call and never stores history.
///
/// # Examples
///
/// ```no_run
/// use parley::providers::{CompletionRequest, CompletionResponse, Provider};
/// use parley::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
///         let last = request.last_turn().map(|t| t.content.clone()).unwrap_or_default();
///         Ok(CompletionResponse::new(last))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Produces a complete reply for the request
    ///
    /// # Errors
    ///
    /// Returns a completion-failure `ParleyError` (authentication, rate
    /// limit, timeout, provider) if no reply could be produced
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Produces the reply as a stream of fragments
    ///
    /// The default implementation calls [`Provider::complete`] and wraps the
    /// result in a single-fragment stream.
    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let response = self.complete(request).await?;
        Ok(single_fragment_stream(response.content))
    }

    /// Get the name of the currently active model
    fn get_current_model(&self) -> Result<String> {
        Err(ParleyError::Provider(
            "Current model information is not available from this provider".to_string(),
        )
        .into())
    }

    /// Get the capabilities of this provider
    fn get_provider_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }
}

/// Maps a non-success HTTP status to the matching completion failure
///
/// # Examples
///
/// ```
/// use parley::error::ParleyError;
/// use parley::providers::classify_http_status;
///
/// let err = classify_http_status("Groq", reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
/// assert!(matches!(err, ParleyError::RateLimited(_)));
/// ```
pub fn classify_http_status(provider: &str, status: reqwest::StatusCode, body: &str) -> ParleyError {
    let detail = extract_error_message(body);
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            ParleyError::Authentication(format!(
                "{} returned error {}: {}. Check the configured API key",
                provider, status, detail
            ))
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => {
            ParleyError::RateLimited(format!("{} returned error {}: {}", provider, status, detail))
        }
        _ => ParleyError::Provider(format!("{} returned error {}: {}", provider, status, detail)),
    }
}

/// Maps a transport-level reqwest failure to a completion failure
pub fn classify_transport_error(
    provider: &str,
    err: reqwest::Error,
    timeout_seconds: u64,
) -> ParleyError {
    if err.is_timeout() {
        ParleyError::Timeout {
            seconds: timeout_seconds,
        }
    } else {
        ParleyError::Provider(format!("{} request failed: {}", provider, err))
    }
}

/// Pulls `error.message` out of an OpenAI-style or Ollama-style error body
fn extract_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
