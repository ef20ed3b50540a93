//! Provider module for Parley
//!
//! This module contains the completion-client abstraction and the
//! implementations for Groq and Ollama.

pub mod base;
pub mod groq;
pub mod ollama;
pub mod stream;

pub use base::{
    classify_http_status, classify_transport_error, single_fragment_stream, CompletionRequest,
    CompletionResponse, FragmentStream, Provider, ProviderCapabilities, Role, StreamEvent,
    TokenUsage, Turn,
};
pub use groq::GroqProvider;
pub use ollama::OllamaProvider;

use crate::config::ProviderConfig;
use crate::error::{ParleyError, Result};

/// Provider types accepted by [`create_provider`]
pub const PROVIDER_TYPES: &[&str] = &["groq", "ollama"];

/// Create a provider instance based on configuration
///
/// # Arguments
///
/// * `provider_type` - Type of provider ("groq" or "ollama")
/// * `config` - Provider configuration
///
/// # Errors
///
/// Returns error if provider type is invalid or initialization fails
pub fn create_provider(provider_type: &str, config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    create_provider_with_override(config, Some(provider_type), None)
}

/// Create a provider instance with optional provider and model overrides
///
/// # Arguments
///
/// * `config` - Full provider configuration containing all provider settings
/// * `provider_override` - Optional provider type override ("groq" or "ollama")
/// * `model_override` - Optional model name override
///
/// # Errors
///
/// Returns error if the provider type is invalid or the provider cannot be
/// initialized (for example a missing Groq API key)
///
/// # Examples
///
/// ```
/// use parley::config::ProviderConfig;
/// use parley::providers::create_provider_with_override;
///
/// let config = ProviderConfig::default();
/// let provider = create_provider_with_override(&config, Some("ollama"), Some("gemma2:2b")).unwrap();
/// assert_eq!(provider.get_current_model().unwrap(), "gemma2:2b");
/// ```
pub fn create_provider_with_override(
    config: &ProviderConfig,
    provider_override: Option<&str>,
    model_override: Option<&str>,
) -> Result<Box<dyn Provider>> {
    let provider_type = provider_override.unwrap_or(&config.provider_type);

    match provider_type {
        "groq" => {
            let mut groq_config = config.groq.clone();
            if let Some(model) = model_override {
                groq_config.model = model.to_string();
            }
            Ok(Box::new(GroqProvider::new(groq_config)?))
        }
        "ollama" => {
            let mut ollama_config = config.ollama.clone();
            if let Some(model) = model_override {
                ollama_config.model = model.to_string();
            }
            Ok(Box::new(OllamaProvider::new(ollama_config)?))
        }
        _ => Err(ParleyError::Provider(format!(
            "Unknown provider type: {}. Must be one of: {}",
            provider_type,
            PROVIDER_TYPES.join(", ")
        ))
        .into()),
    }
}
