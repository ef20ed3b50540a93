//! Configuration management for Parley
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::cli::Cli;
use crate::error::{ParleyError, Result};
use crate::prompts::{default_suggestions, DEFAULT_SYSTEM_INSTRUCTIONS};
use crate::providers::groq::GROQ_API_BASE;
use crate::providers::PROVIDER_TYPES;
use crate::session::ContextPolicy;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PARLEY_CONFIG";

/// Upper bound for request timeouts, in seconds
const MAX_TIMEOUT_SECONDS: u64 = 600;

/// Prefix every Groq API key carries
const GROQ_KEY_PREFIX: &str = "gsk_";

/// Secret credential for a completion endpoint
///
/// The value never appears in `Debug` output or logs; call
/// [`Credential::expose`] at the point it goes on the wire.
///
/// # Examples
///
/// ```
/// use parley::config::Credential;
///
/// let key = Credential::new("gsk_secret");
/// assert_eq!(key.expose(), "gsk_secret");
/// assert!(!format!("{:?}", key).contains("secret"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Read the secret value
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the credential is blank
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Main configuration structure for Parley
///
/// Holds the provider selection, the persona the assistant speaks as, and
/// how each session manages its history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider configuration (Groq, Ollama)
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Persona and greeting
    #[serde(default)]
    pub persona: PersonaConfig,
    /// Session behavior
    #[serde(default)]
    pub session: SessionConfig,
}

/// Provider configuration
///
/// Specifies which completion provider to use and its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,
    /// Groq-specific configuration
    #[serde(default)]
    pub groq: GroqConfig,
    /// Ollama-specific configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_provider_type() -> String {
    "groq".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            groq: GroqConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Model configured for the selected provider
    pub fn model(&self) -> &str {
        match self.provider_type.as_str() {
            "ollama" => &self.ollama.model,
            _ => &self.groq.model,
        }
    }

    /// Set the model of the selected provider
    pub fn set_model(&mut self, model: impl Into<String>) {
        match self.provider_type.as_str() {
            "ollama" => self.ollama.model = model.into(),
            _ => self.groq.model = model.into(),
        }
    }

    /// Credential the selected provider sends, if it needs one
    pub fn credential(&self) -> Option<&Credential> {
        match self.provider_type.as_str() {
            "groq" => self.groq.api_key.as_ref(),
            _ => None,
        }
    }
}

/// Groq provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroqConfig {
    /// Model to use
    #[serde(default = "default_groq_model")]
    pub model: String,
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_groq_api_base")]
    pub api_base: String,
    /// API key; usually supplied through the environment
    #[serde(default)]
    pub api_key: Option<Credential>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens per reply
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_groq_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_groq_api_base() -> String {
    GROQ_API_BASE.to_string()
}

fn default_timeout_seconds() -> u64 {
    60
}

impl Default for GroqConfig {
    fn default() -> Self {
        Self {
            model: default_groq_model(),
            api_base: default_groq_api_base(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,
    /// Model to use
    #[serde(default = "default_ollama_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Persona configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// System instructions prefixed to every completion request
    #[serde(default = "default_system_instructions")]
    pub system_instructions: String,
    /// Optional assistant greeting seeded into each new conversation
    #[serde(default)]
    pub greeting: Option<String>,
    /// Starter suggestions offered while a conversation is empty
    #[serde(default = "default_suggestions")]
    pub suggestions: Vec<String>,
}

fn default_system_instructions() -> String {
    DEFAULT_SYSTEM_INSTRUCTIONS.to_string()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_instructions: default_system_instructions(),
            greeting: None,
            suggestions: default_suggestions(),
        }
    }
}

/// Session behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Stream replies fragment by fragment
    #[serde(default = "default_streaming")]
    pub streaming: bool,
    /// Limits on how much history is resent with each turn
    #[serde(default)]
    pub context: ContextPolicy,
}

fn default_streaming() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            streaming: default_streaming(),
            context: ContextPolicy::default(),
        }
    }
}

/// The settings a chat session is constructed from
///
/// Persona text, model identifier and credential, validated once when
/// the session is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    /// System instructions prefixed to every request
    pub system_instructions: String,
    /// Model identifier sent to the provider
    pub model_id: String,
    /// Credential for the completion endpoint, when one is required
    pub credential: Option<Credential>,
}

impl ChatSettings {
    /// Validate the settings
    ///
    /// # Errors
    ///
    /// Returns a configuration error for blank instructions, a blank
    /// model identifier, or a blank credential
    pub fn validate(&self) -> Result<()> {
        if self.system_instructions.trim().is_empty() {
            return Err(
                ParleyError::Config("system_instructions cannot be empty".to_string()).into(),
            );
        }
        if self.model_id.trim().is_empty() {
            return Err(ParleyError::Config("model cannot be empty".to_string()).into());
        }
        if self.credential.as_ref().is_some_and(Credential::is_empty) {
            return Err(ParleyError::Config("credential cannot be empty".to_string()).into());
        }
        Ok(())
    }
}

impl Config {
    /// Resolve which config file to read
    ///
    /// An explicit path wins, then `$PARLEY_CONFIG`, then `config.yaml` in
    /// the platform configuration directory.
    pub fn resolve_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        ProjectDirs::from("", "", "parley").map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration; a missing file yields
    /// defaults
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path, cli: &Cli) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse a YAML config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid YAML
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ParleyError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ParleyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider_type) = std::env::var("PARLEY_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            self.provider.set_model(model);
        }

        if let Some(key) = std::env::var("PARLEY_GROQ_API_KEY")
            .or_else(|_| std::env::var("GROQ_API_KEY"))
            .ok()
        {
            self.provider.groq.api_key = Some(Credential::new(key));
        }

        if let Ok(api_base) = std::env::var("PARLEY_GROQ_API_BASE") {
            self.provider.groq.api_base = api_base;
        }

        if let Ok(host) = std::env::var("PARLEY_OLLAMA_HOST") {
            self.provider.ollama.host = host;
        }

        if let Ok(max_turns) = std::env::var("PARLEY_MAX_TURNS") {
            if let Ok(value) = max_turns.parse() {
                self.session.context.max_turns = Some(value);
            } else {
                tracing::warn!("Invalid PARLEY_MAX_TURNS: {}", max_turns);
            }
        }

        if let Ok(max_tokens) = std::env::var("PARLEY_MAX_TOKENS") {
            if let Ok(value) = max_tokens.parse() {
                self.session.context.max_tokens = Some(value);
            } else {
                tracing::warn!("Invalid PARLEY_MAX_TOKENS: {}", max_tokens);
            }
        }

        if let Ok(prompt) = std::env::var("PARLEY_SYSTEM_PROMPT") {
            self.persona.system_instructions = prompt;
        }

        if let Ok(stream) = std::env::var("PARLEY_STREAM") {
            match stream.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.session.streaming = true,
                "0" | "false" | "no" | "off" => self.session.streaming = false,
                _ => tracing::warn!("Invalid PARLEY_STREAM: {}", stream),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        let overrides = cli.command.overrides();
        if let Some(provider) = overrides.provider {
            self.provider.provider_type = provider.to_string();
        }
        if let Some(model) = overrides.model {
            self.provider.set_model(model);
        }
        if overrides.no_stream {
            self.session.streaming = false;
        }
    }

    /// Settings for the session this configuration describes
    ///
    /// # Errors
    ///
    /// Returns error if the settings fail [`ChatSettings::validate`]
    pub fn chat_settings(&self) -> Result<ChatSettings> {
        let settings = ChatSettings {
            system_instructions: self.persona.system_instructions.clone(),
            model_id: self.provider.model().to_string(),
            credential: self.provider.credential().cloned(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.provider.provider_type.is_empty() {
            return Err(ParleyError::Config("Provider type cannot be empty".to_string()).into());
        }

        if !PROVIDER_TYPES.contains(&self.provider.provider_type.as_str()) {
            return Err(ParleyError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                PROVIDER_TYPES.join(", ")
            ))
            .into());
        }

        match self.provider.provider_type.as_str() {
            "groq" => {
                let groq = &self.provider.groq;
                validate_url("provider.groq.api_base", &groq.api_base)?;
                validate_timeout("provider.groq.timeout_seconds", groq.timeout_seconds)?;
                match &groq.api_key {
                    None => {
                        return Err(ParleyError::MissingCredentials(
                            "groq (set PARLEY_GROQ_API_KEY or provider.groq.api_key)".to_string(),
                        )
                        .into())
                    }
                    Some(key) if key.is_empty() => {
                        return Err(ParleyError::MissingCredentials(
                            "groq API key is empty".to_string(),
                        )
                        .into())
                    }
                    Some(key) if !key.expose().starts_with(GROQ_KEY_PREFIX) => {
                        return Err(ParleyError::Config(format!(
                            "Groq API keys start with '{}'",
                            GROQ_KEY_PREFIX
                        ))
                        .into())
                    }
                    Some(_) => {}
                }
                if let Some(temperature) = groq.temperature {
                    if !(0.0..=2.0).contains(&temperature) {
                        return Err(ParleyError::Config(
                            "provider.groq.temperature must be between 0.0 and 2.0".to_string(),
                        )
                        .into());
                    }
                }
                if groq.max_tokens == Some(0) {
                    return Err(ParleyError::Config(
                        "provider.groq.max_tokens must be greater than 0".to_string(),
                    )
                    .into());
                }
            }
            _ => {
                let ollama = &self.provider.ollama;
                validate_url("provider.ollama.host", &ollama.host)?;
                validate_timeout("provider.ollama.timeout_seconds", ollama.timeout_seconds)?;
            }
        }

        self.chat_settings()?;

        if self.session.context.max_turns == Some(0) {
            return Err(ParleyError::Config(
                "session.context.max_turns must be greater than 0".to_string(),
            )
            .into());
        }

        if self.session.context.max_tokens == Some(0) {
            return Err(ParleyError::Config(
                "session.context.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self
            .persona
            .suggestions
            .iter()
            .any(|suggestion| suggestion.trim().is_empty())
        {
            return Err(
                ParleyError::Config("persona.suggestions cannot contain blanks".to_string()).into(),
            );
        }

        if self
            .persona
            .greeting
            .as_ref()
            .is_some_and(|greeting| greeting.trim().is_empty())
        {
            return Err(ParleyError::Config(
                "persona.greeting cannot be blank; omit it instead".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| ParleyError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ParleyError::Config(format!(
            "{} must use http or https, got {}",
            field, scheme
        ))
        .into()),
    }
}

fn validate_timeout(field: &str, seconds: u64) -> Result<()> {
    if seconds == 0 || seconds > MAX_TIMEOUT_SECONDS {
        return Err(ParleyError::Config(format!(
            "{} must be between 1 and {}",
            field, MAX_TIMEOUT_SECONDS
        ))
        .into());
    }
    Ok(())
}
