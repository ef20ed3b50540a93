//! Chat session state
//!
//! This module contains the conversation store and its turn state machine,
//! the bounded context window, and the session type that connects a store to
//! a completion client.

pub mod chat;
pub mod conversation;
pub mod message;
pub mod metrics;
pub mod store;

pub use chat::{ChatSession, PendingTurn};
pub use conversation::{ContextPolicy, Conversation};
pub use message::Message;
pub use store::{CompletionInput, ConversationStore, TurnState};
