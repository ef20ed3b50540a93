//! Conversation history with a bounded context window
//!
//! This module holds the ordered message history of one chat session and
//! selects which prior turns are resent with each new prompt.

use crate::providers::Turn;
use crate::session::Message;
use serde::{Deserialize, Serialize};

/// Limits on how much prior history is resent with each prompt
///
/// Both limits default to `None`, which resends the full history. When a limit
/// is set, the oldest prior messages are dropped first until every limit
/// holds. The new user turn is always sent, even if it alone exceeds
/// `max_tokens`.
///
/// # Token Counting
///
/// Uses a simple heuristic: characters / 4, rounded up.
///
/// # Examples
///
/// ```
/// use parley::session::ContextPolicy;
///
/// let policy = ContextPolicy::default();
/// assert!(policy.is_unbounded());
///
/// let policy = ContextPolicy { max_turns: Some(6), max_tokens: None };
/// assert!(!policy.is_unbounded());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPolicy {
    /// Maximum number of prior messages resent
    #[serde(default)]
    pub max_turns: Option<usize>,

    /// Maximum estimated tokens across prior messages and the new turn
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

impl ContextPolicy {
    /// Policy that resends the full history
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Returns true if no limit is set
    pub fn is_unbounded(&self) -> bool {
        self.max_turns.is_none() && self.max_tokens.is_none()
    }
}

/// Ordered, append-only message history
///
/// The conversation optionally starts with a greeting from the assistant.
/// [`Conversation::clear`] returns it to exactly that initial state.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    greeting: Option<String>,
    token_count: usize,
}

impl Conversation {
    /// Creates a conversation, seeded with the greeting if one is given
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::session::Conversation;
    ///
    /// let empty = Conversation::new(None);
    /// assert!(empty.is_empty());
    ///
    /// let greeted = Conversation::new(Some("Hello! Ask me about biology.".to_string()));
    /// assert_eq!(greeted.len(), 1);
    /// ```
    pub fn new(greeting: Option<String>) -> Self {
        let greeting = greeting.filter(|g| !g.trim().is_empty());
        let mut conversation = Self {
            messages: Vec::new(),
            greeting,
            token_count: 0,
        };
        conversation.seed();
        conversation
    }

    /// Restores the initial state
    fn seed(&mut self) {
        self.messages.clear();
        self.token_count = 0;
        if let Some(greeting) = self.greeting.clone() {
            // The greeting carries no timestamp so every reset is identical.
            self.push(Message::from_parts(
                crate::providers::Role::Assistant,
                greeting,
                None,
            ));
        }
    }

    /// Appends a message to the end of the history
    pub fn push(&mut self, message: Message) {
        self.token_count += estimate_tokens(message.content());
        self.messages.push(message);
    }

    /// All messages in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The configured greeting, if any
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    /// Estimated tokens across the whole history
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Returns the number of messages in the conversation
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the conversation has no messages
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns true if nothing beyond the initial greeting has been said
    pub fn is_fresh(&self) -> bool {
        let seeded = usize::from(self.greeting.is_some());
        self.messages.len() <= seeded
    }

    /// Discards every message and restores the greeting
    pub fn clear(&mut self) {
        self.seed();
    }

    /// Prior turns to resend ahead of `new_turn`, oldest first
    ///
    /// Always a contiguous suffix of the history. With an unbounded policy it
    /// is the full history.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::session::{ContextPolicy, Conversation, Message};
    ///
    /// let mut conversation = Conversation::new(None);
    /// conversation.push(Message::user("one"));
    /// conversation.push(Message::assistant("two"));
    /// conversation.push(Message::user("three"));
    ///
    /// let policy = ContextPolicy { max_turns: Some(2), max_tokens: None };
    /// let turns = conversation.window(&policy, "four");
    /// let texts: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    /// assert_eq!(texts, vec!["two", "three"]);
    /// ```
    pub fn window(&self, policy: &ContextPolicy, new_turn: &str) -> Vec<Turn> {
        let max_turns = policy.max_turns.unwrap_or(usize::MAX);
        let token_budget = policy
            .max_tokens
            .map(|max| max.saturating_sub(estimate_tokens(new_turn)))
            .unwrap_or(usize::MAX);

        let mut kept = 0usize;
        let mut used = 0usize;
        for message in self.messages.iter().rev() {
            let cost = estimate_tokens(message.content());
            if kept >= max_turns || used.saturating_add(cost) > token_budget {
                break;
            }
            kept += 1;
            used += cost;
        }

        let start = self.messages.len() - kept;
        if start > 0 {
            tracing::debug!(
                "Context window dropped {} of {} prior messages",
                start,
                self.messages.len()
            );
        }

        self.messages[start..].iter().map(Message::to_turn).collect()
    }
}

/// Estimates token count for a string using a simple heuristic
///
/// Uses characters / 4 rounded up, which approximates GPT tokenization for
/// English text.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Truncates a string to a maximum length in characters, adding an ellipsis
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let mut truncated = s
            .chars()
            .take(max_len.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}
