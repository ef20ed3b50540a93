//! Error types for Parley
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// User-facing text shown in place of an assistant reply when a completion fails
///
/// The notice is rendered by the presentation layer and is never stored in
/// the conversation history.
pub const COMPLETION_FAILURE_NOTICE: &str = "Sorry, something went wrong while generating a reply. \
Please check your API key and your internet connection. If the problem persists, \
the service may be experiencing difficulties.";

/// Main error type for Parley operations
///
/// This enum encompasses all possible errors that can occur during
/// configuration loading, provider interactions and session state transitions.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A user turn was empty or otherwise unusable
    #[error("Input rejected: {0}")]
    InputRejected(String),

    /// Provider-related errors (unexpected status, malformed body, etc.)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Authentication errors (e.g., 401 Unauthorized)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Provider rejected the request because of rate limits or quota
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider did not answer in time
    #[error("Request timed out after {seconds}s")]
    Timeout {
        /// The configured request timeout
        seconds: u64,
    },

    /// A fragment stream ended without its end-of-stream signal
    #[error("Stream interrupted after {fragments} fragments")]
    StreamInterrupted {
        /// Number of fragments received before the stream ended
        fragments: usize,
    },

    /// Streaming not supported by provider
    #[error("Streaming is not supported by this provider")]
    StreamingNotSupported,

    /// Missing credentials for provider
    #[error("Missing credentials for provider: {0}")]
    MissingCredentials(String),

    /// An operation was issued while a completion is still pending
    #[error("A reply is still being generated for this conversation")]
    TurnInFlight,

    /// Completion delivered to a store that is not awaiting one
    #[error("No reply is pending for this conversation")]
    NoTurnInFlight,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ParleyError {
    /// Returns true if this error means the completion client produced no reply
    ///
    /// Interrupted streams count as completion failures.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::error::ParleyError;
    ///
    /// assert!(ParleyError::RateLimited("slow down".to_string()).is_completion_failure());
    /// assert!(!ParleyError::TurnInFlight.is_completion_failure());
    /// ```
    pub fn is_completion_failure(&self) -> bool {
        matches!(
            self,
            Self::Provider(_)
                | Self::Authentication(_)
                | Self::RateLimited(_)
                | Self::Timeout { .. }
                | Self::StreamInterrupted { .. }
                | Self::StreamingNotSupported
                | Self::MissingCredentials(_)
                | Self::Http(_)
        )
    }

    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InputRejected(_) => "input_rejected",
            Self::Provider(_) => "provider",
            Self::Authentication(_) => "authentication",
            Self::RateLimited(_) => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::StreamInterrupted { .. } => "stream_interrupted",
            Self::StreamingNotSupported => "streaming_not_supported",
            Self::MissingCredentials(_) => "missing_credentials",
            Self::TurnInFlight => "turn_in_flight",
            Self::NoTurnInFlight => "no_turn_in_flight",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Yaml(_) => "yaml",
            Self::Http(_) => "http",
        }
    }

    /// User-facing notice for this error
    ///
    /// Completion failures map to [`COMPLETION_FAILURE_NOTICE`]; other errors
    /// use their display text.
    pub fn notice(&self) -> String {
        if self.is_completion_failure() {
            COMPLETION_FAILURE_NOTICE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// Finds the [`ParleyError`] carried by an `anyhow::Error`, if any
pub fn classify(err: &anyhow::Error) -> Option<&ParleyError> {
    err.downcast_ref::<ParleyError>()
}

/// Result type alias for Parley operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation. Callers that
/// need to distinguish failures use [`classify`].
pub type Result<T> = anyhow::Result<T>;
