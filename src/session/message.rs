//! Conversation messages

use crate::providers::{Role, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry in the conversation history
///
/// Messages are immutable once created; fields are read through accessors.
///
/// # Examples
///
/// ```
/// use parley::providers::Role;
/// use parley::session::Message;
///
/// let message = Message::user("What is a ribosome?");
/// assert_eq!(message.role(), Role::User);
/// assert_eq!(message.content(), "What is a ribosome?");
/// assert!(message.timestamp().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates a message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self::from_parts(role, content, Some(Utc::now()))
    }

    /// Creates a message with an explicit (possibly absent) timestamp
    pub fn from_parts(
        role: Role,
        content: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Creates a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Who produced the message
    pub fn role(&self) -> Role {
        self.role
    }

    /// The message text
    pub fn content(&self) -> &str {
        &self.content
    }

    /// When the message was created, if known
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Converts the message into a prompt turn
    pub fn to_turn(&self) -> Turn {
        Turn::new(self.role, self.content.clone())
    }
}
