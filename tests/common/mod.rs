use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use parley::config::{Credential, GroqConfig, OllamaConfig};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Groq settings pointed at a mock server
#[allow(dead_code)]
pub fn groq_config(api_base: &str) -> GroqConfig {
    GroqConfig {
        api_base: api_base.to_string(),
        api_key: Some(Credential::new("gsk_test_key")),
        timeout_seconds: 5,
        ..Default::default()
    }
}

/// Ollama settings pointed at a mock server
#[allow(dead_code)]
pub fn ollama_config(host: &str) -> OllamaConfig {
    OllamaConfig {
        host: host.to_string(),
        model: "llama3.2:latest".to_string(),
        timeout_seconds: 5,
    }
}

/// Server-Sent Events body carrying the given content deltas and `[DONE]`
#[allow(dead_code)]
pub fn groq_sse_body(fragments: &[&str], done: bool) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "choices": [{ "index": 0, "delta": { "content": fragment }, "finish_reason": null }]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}

/// Non-streaming chat completion body
#[allow(dead_code)]
pub fn groq_completion_body(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "llama3-70b-8192",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49 }
    })
}
