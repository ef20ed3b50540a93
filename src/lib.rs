//! Parley - terminal chat with a hosted language model
//!
//! This library provides the core functionality for Parley: a per-session
//! conversation store, the completion providers that answer it, and the
//! configuration that ties them together.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Conversation store, turn state machine and chat sessions
//! - `providers`: Completion provider abstraction and implementations (Groq, Ollama)
//! - `prompts`: Default persona and starter suggestions
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers for the CLI commands
//!
//! # Example
//!
//! ```no_run
//! use parley::{ChatSession, Config};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("config.yaml"), &Default::default())?;
//!     config.validate()?;
//!
//!     let mut session = ChatSession::from_config(&config)?;
//!     let reply = session.submit_user_turn("What is a ribosome?").await?;
//!     println!("{}", reply.content());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{ParleyError, Result};
pub use session::{ChatSession, ConversationStore, Message, PendingTurn};

#[cfg(test)]
pub mod test_utils;
