//! Test utilities for Parley
//!
//! This module provides a scripted completion client, temporary file helpers
//! and assertion helpers shared by unit tests.

use crate::config::Config;
use crate::error::{ParleyError, Result};
use crate::providers::{
    single_fragment_stream, CompletionRequest, CompletionResponse, FragmentStream, Provider,
    ProviderCapabilities, StreamEvent,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// One scripted answer
enum Script {
    Reply(String),
    Fail(ParleyError),
    Stream(Vec<String>),
    Interrupted(Vec<String>),
    Events(Vec<Result<StreamEvent>>),
    Slow(Duration, String),
}

/// Completion client that answers from a queue of scripted outcomes
///
/// Every request is recorded and can be inspected through [`ScriptedProvider::calls`].
/// When the script runs out, requests fail with a provider error.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Script>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    /// Creates a provider with an empty script
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn push(self, item: Script) -> Self {
        self.script.lock().expect("script lock poisoned").push_back(item);
        self
    }

    /// Queues a complete reply
    pub fn reply(self, text: &str) -> Self {
        self.push(Script::Reply(text.to_string()))
    }

    /// Queues a failure
    pub fn fail(self, error: ParleyError) -> Self {
        self.push(Script::Fail(error))
    }

    /// Queues a well-formed fragment stream
    pub fn stream(self, fragments: Vec<&str>) -> Self {
        self.push(Script::Stream(
            fragments.into_iter().map(str::to_string).collect(),
        ))
    }

    /// Queues a fragment stream that ends without end-of-stream
    pub fn interrupted(self, fragments: Vec<&str>) -> Self {
        self.push(Script::Interrupted(
            fragments.into_iter().map(str::to_string).collect(),
        ))
    }

    /// Queues a reply that only arrives after `delay`
    pub fn slow_reply(self, text: &str, delay: Duration) -> Self {
        self.push(Script::Slow(delay, text.to_string()))
    }

    /// Queues raw stream events
    pub fn stream_events(self, events: Vec<Result<StreamEvent>>) -> Self {
        self.push(Script::Events(events))
    }

    /// Shared handle to every request received so far
    pub fn calls(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.calls)
    }

    fn next(&self, request: &CompletionRequest) -> Result<Script> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(request.clone());
        self.script
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .ok_or_else(|| ParleyError::Provider("script exhausted".to_string()).into())
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        match self.next(request)? {
            Script::Reply(text) => Ok(CompletionResponse::new(text)),
            Script::Fail(error) => Err(error.into()),
            Script::Stream(fragments) => Ok(CompletionResponse::new(fragments.concat())),
            Script::Interrupted(fragments) => Err(ParleyError::StreamInterrupted {
                fragments: fragments.len(),
            }
            .into()),
            Script::Events(events) => {
                let mut text = String::new();
                for event in events {
                    if let StreamEvent::Fragment(fragment) = event? {
                        text.push_str(&fragment);
                    }
                }
                Ok(CompletionResponse::new(text))
            }
            Script::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(CompletionResponse::new(text))
            }
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let events: Vec<Result<StreamEvent>> = match self.next(request)? {
            Script::Reply(text) => return Ok(single_fragment_stream(text)),
            Script::Fail(error) => return Err(error.into()),
            Script::Stream(fragments) => fragments
                .into_iter()
                .map(|f| Ok(StreamEvent::Fragment(f)))
                .chain(std::iter::once(Ok(StreamEvent::Done)))
                .collect(),
            Script::Interrupted(fragments) => fragments
                .into_iter()
                .map(|f| Ok(StreamEvent::Fragment(f)))
                .collect(),
            Script::Events(events) => events,
            Script::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                return Ok(single_fragment_stream(text));
            }
        };
        Ok(Box::pin(futures::stream::iter(events)))
    }

    fn get_current_model(&self) -> Result<String> {
        Ok("scripted".to_string())
    }

    fn get_provider_capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_streaming: true,
            supports_token_counts: false,
        }
    }
}

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a configuration that validates without any environment
///
/// Uses the Ollama provider, which needs no credential.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.provider_type = "ollama".to_string();
    config
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
provider:
  type: groq
  groq:
    model: llama3-8b-8192
    api_base: http://localhost:9999/openai/v1
    api_key: gsk_test_key
    timeout_seconds: 20
  ollama:
    host: http://localhost:11434
    model: llama3.2:latest

persona:
  system_instructions: You are a concise biology tutor.
  greeting: Hi! What would you like to learn about today?
  suggestions:
    - Explain photosynthesis
    - What is CRISPR?

session:
  streaming: true
  context:
    max_turns: 20
    max_tokens: 6000
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Role, Turn};
    use futures::StreamExt;

    fn request() -> CompletionRequest {
        CompletionRequest::new("sys", vec![Turn::new(Role::User, "q")])
    }

    #[tokio::test]
    async fn test_scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new().reply("first").reply("second");
        assert_eq!(provider.complete(&request()).await.unwrap().content, "first");
        assert_eq!(provider.complete(&request()).await.unwrap().content, "second");
        assert!(provider.complete(&request()).await.is_err());
        assert_eq!(provider.calls().lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_stream_ends_with_done() {
        let provider = ScriptedProvider::new().stream(vec!["a", "b"]);
        let events: Vec<StreamEvent> = Provider::stream(&provider, &request())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_interrupted_stream_has_no_done() {
        let provider = ScriptedProvider::new().interrupted(vec!["a"]);
        let events: Vec<StreamEvent> = Provider::stream(&provider, &request())
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events, vec![StreamEvent::Fragment("a".to_string())]);
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "test.txt", "content");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<()> = Err(ParleyError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_validates() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_test_config_yaml_validates() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider.provider_type, "groq");
        assert_eq!(config.session.context.max_turns, Some(20));
    }
}
