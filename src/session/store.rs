//! Session conversation store
//!
//! The store owns one conversation's history and its turn state machine:
//!
//! ```text
//!            begin_turn
//!   Idle ───────────────────▶ AwaitingCompletion
//!    ▲                              │
//!    └──────────────────────────────┘
//!      reply committed | failure | abandon_turn
//! ```
//!
//! While a completion is awaited only completion delivery (or abandonment)
//! is accepted; every other mutation fails with `ParleyError::TurnInFlight`.
//! The assistant reply is appended only after the client signals
//! end-of-stream, so failed or interrupted turns never touch the history.

use crate::error::{ParleyError, Result};
use crate::providers::{CompletionRequest, FragmentStream, Role, StreamEvent};
use crate::session::{ContextPolicy, Conversation, Message};
use futures::StreamExt;

/// Turn state of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Ready for a new user turn
    Idle,
    /// A user turn was sent and its reply has not been committed yet
    AwaitingCompletion,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingCompletion => write!(f, "awaiting completion"),
        }
    }
}

/// Output of a completion client, as delivered to the store
pub enum CompletionInput {
    /// A complete reply
    Text(String),
    /// Incremental reply fragments ending with `StreamEvent::Done`
    Stream(FragmentStream),
}

impl std::fmt::Debug for CompletionInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Concatenates fragments of one reply in arrival order
#[derive(Debug, Default)]
pub(crate) struct ReplyAccumulator {
    text: String,
    fragments: usize,
    finished: bool,
}

impl ReplyAccumulator {
    /// Pulls the next fragment, returning `None` once end-of-stream arrives
    ///
    /// # Errors
    ///
    /// Returns the stream's own error, or `StreamInterrupted` if the stream
    /// ends without its end-of-stream signal
    pub(crate) async fn pull(&mut self, stream: &mut FragmentStream) -> Result<Option<String>> {
        if self.finished {
            return Ok(None);
        }

        match stream.next().await {
            Some(Ok(StreamEvent::Fragment(fragment))) => {
                self.fragments += 1;
                self.text.push_str(&fragment);
                Ok(Some(fragment))
            }
            Some(Ok(StreamEvent::Done)) => {
                self.finished = true;
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            None => Err(ParleyError::StreamInterrupted {
                fragments: self.fragments,
            }
            .into()),
        }
    }

    pub(crate) fn fragments(&self) -> usize {
        self.fragments
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn into_text(self) -> String {
        self.text
    }
}

/// Owns the history and turn state of one conversation
///
/// # Examples
///
/// ```
/// use parley::providers::Role;
/// use parley::session::{ContextPolicy, ConversationStore};
///
/// let mut store = ConversationStore::new("You are a biology tutor.", None, ContextPolicy::default());
/// store.append(Role::User, "What is DNA?").unwrap();
/// store.append(Role::Assistant, "A molecule carrying genetic instructions.").unwrap();
///
/// let request = store.build_context("And RNA?");
/// assert_eq!(request.system_instructions, "You are a biology tutor.");
/// assert_eq!(request.turns.len(), 3);
/// assert_eq!(request.turns[2].content, "And RNA?");
/// ```
#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversation: Conversation,
    system_instructions: String,
    policy: ContextPolicy,
    state: TurnState,
}

impl ConversationStore {
    /// Creates a store in the Idle state
    ///
    /// # Arguments
    ///
    /// * `system_instructions` - Persona prefix sent with every prompt
    /// * `greeting` - Optional assistant message seeded into the history
    /// * `policy` - Limits on how much history is resent
    pub fn new(
        system_instructions: impl Into<String>,
        greeting: Option<String>,
        policy: ContextPolicy,
    ) -> Self {
        Self {
            conversation: Conversation::new(greeting),
            system_instructions: system_instructions.into(),
            policy,
            state: TurnState::Idle,
        }
    }

    /// Current turn state
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Returns true if no completion is pending
    pub fn is_idle(&self) -> bool {
        self.state == TurnState::Idle
    }

    /// The persona prefix sent with every prompt
    pub fn system_instructions(&self) -> &str {
        &self.system_instructions
    }

    /// The context-bounding policy
    pub fn policy(&self) -> &ContextPolicy {
        &self.policy
    }

    /// The underlying conversation
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// All messages in insertion order
    pub fn get_history(&self) -> &[Message] {
        self.conversation.messages()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.state == TurnState::AwaitingCompletion {
            return Err(ParleyError::TurnInFlight.into());
        }
        Ok(())
    }

    /// Appends a message to the end of the history
    ///
    /// # Errors
    ///
    /// Returns `TurnInFlight` while a completion is pending
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> Result<()> {
        self.ensure_idle()?;
        self.conversation.push(Message::new(role, content));
        Ok(())
    }

    /// Builds the prompt for a new user turn without changing any state
    ///
    /// The request holds the system instructions, the bounded prior history
    /// oldest first, and the new turn last.
    pub fn build_context(&self, new_user_turn: &str) -> CompletionRequest {
        let mut turns = self.conversation.window(&self.policy, new_user_turn);
        turns.push(crate::providers::Turn::new(Role::User, new_user_turn));
        CompletionRequest::new(self.system_instructions.clone(), turns)
    }

    /// Clears the history back to its initial state
    ///
    /// Idempotent: repeated resets are equivalent to one.
    ///
    /// # Errors
    ///
    /// Returns `TurnInFlight` while a completion is pending
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let discarded = self.conversation.len();
        self.conversation.clear();
        tracing::debug!("Conversation reset, {} messages discarded", discarded);
        Ok(())
    }

    /// Records a user turn and moves to AwaitingCompletion
    ///
    /// Returns the prompt to hand to the completion client. The prompt is
    /// built before the user turn is appended, so the turn appears exactly
    /// once, last.
    ///
    /// # Errors
    ///
    /// Returns `InputRejected` for empty or whitespace-only text and
    /// `TurnInFlight` while another completion is pending
    pub fn begin_turn(&mut self, text: &str) -> Result<CompletionRequest> {
        self.ensure_idle()?;
        if text.trim().is_empty() {
            return Err(
                ParleyError::InputRejected("message cannot be empty".to_string()).into(),
            );
        }

        let request = self.build_context(text);
        self.conversation.push(Message::user(text));
        self.state = TurnState::AwaitingCompletion;
        tracing::debug!(
            "Turn started: {} turns in prompt, {} messages in history",
            request.turns.len(),
            self.conversation.len()
        );
        Ok(request)
    }

    /// Delivers the completion for the pending turn
    ///
    /// Fragments are concatenated in arrival order and the reply is appended
    /// only after end-of-stream. On any failure nothing is appended, the
    /// store returns to Idle, and the user turn stays in the history.
    ///
    /// # Errors
    ///
    /// Returns `NoTurnInFlight` if no turn is pending, the client's own
    /// error, or `StreamInterrupted` if the stream ends early
    pub async fn receive_completion(&mut self, input: CompletionInput) -> Result<Message> {
        if self.state != TurnState::AwaitingCompletion {
            return Err(ParleyError::NoTurnInFlight.into());
        }

        let text = match input {
            CompletionInput::Text(text) => text,
            CompletionInput::Stream(mut stream) => {
                let mut reply = ReplyAccumulator::default();
                loop {
                    match reply.pull(&mut stream).await {
                        Ok(Some(_)) => continue,
                        Ok(None) => break,
                        Err(e) => {
                            self.fail_turn(&e);
                            return Err(e);
                        }
                    }
                }
                reply.into_text()
            }
        };

        self.commit_reply(text)
    }

    /// Appends the assistant reply and returns to Idle
    pub(crate) fn commit_reply(&mut self, text: String) -> Result<Message> {
        if self.state != TurnState::AwaitingCompletion {
            return Err(ParleyError::NoTurnInFlight.into());
        }
        let message = Message::assistant(text);
        self.conversation.push(message.clone());
        self.state = TurnState::Idle;
        tracing::debug!("Reply committed, {} messages in history", self.conversation.len());
        Ok(message)
    }

    /// Returns to Idle after a failed completion without appending anything
    pub(crate) fn fail_turn(&mut self, err: &anyhow::Error) {
        if self.state == TurnState::AwaitingCompletion {
            tracing::debug!("Turn failed: {}", err);
            self.state = TurnState::Idle;
        }
    }

    /// Gives up on the pending turn without appending a reply
    ///
    /// Does nothing when Idle.
    pub fn abandon_turn(&mut self) {
        if self.state == TurnState::AwaitingCompletion {
            tracing::debug!("Pending turn abandoned");
            self.state = TurnState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::providers::single_fragment_stream;

    fn store() -> ConversationStore {
        ConversationStore::new("Be a tutor.", None, ContextPolicy::default())
    }

    fn stream_of(events: Vec<Result<StreamEvent>>) -> FragmentStream {
        Box::pin(futures::stream::iter(events))
    }

    fn fragment(text: &str) -> Result<StreamEvent> {
        Ok(StreamEvent::Fragment(text.to_string()))
    }

    fn history(store: &ConversationStore) -> Vec<(Role, String)> {
        store
            .get_history()
            .iter()
            .map(|m| (m.role(), m.content().to_string()))
            .collect()
    }

    #[test]
    fn test_new_store_is_idle_and_empty() {
        let store = store();
        assert_eq!(store.state(), TurnState::Idle);
        assert!(store.get_history().is_empty());
    }

    #[test]
    fn test_append_keeps_exact_order() {
        let mut store = store();
        store.append(Role::User, "1").unwrap();
        store.append(Role::Assistant, "2").unwrap();
        store.append(Role::Assistant, "3").unwrap();
        store.append(Role::User, "4").unwrap();
        let texts: Vec<String> = history(&store).into_iter().map(|(_, c)| c).collect();
        assert_eq!(texts, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_build_context_orders_turns_and_is_pure() {
        let mut store = store();
        store.append(Role::User, "q1").unwrap();
        store.append(Role::Assistant, "a1").unwrap();

        let request = store.build_context("q2");
        assert_eq!(request.system_instructions, "Be a tutor.");
        let turns: Vec<(Role, &str)> = request
            .turns
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Role::User, "q1"),
                (Role::Assistant, "a1"),
                (Role::User, "q2")
            ]
        );
        assert_eq!(store.get_history().len(), 2);
        assert_eq!(store.state(), TurnState::Idle);
    }

    #[test]
    fn test_build_context_applies_policy_but_keeps_new_turn() {
        let mut store = ConversationStore::new(
            "sys",
            None,
            ContextPolicy {
                max_turns: Some(1),
                max_tokens: None,
            },
        );
        store.append(Role::User, "old").unwrap();
        store.append(Role::Assistant, "recent").unwrap();

        let request = store.build_context("new");
        let texts: Vec<&str> = request.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(texts, vec!["recent", "new"]);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut store = ConversationStore::new("sys", Some("Hi!".to_string()), ContextPolicy::default());
        let initial = store.get_history().to_vec();
        for i in 0..5 {
            store.append(Role::User, format!("m{}", i)).unwrap();
        }
        store.reset().unwrap();
        assert_eq!(store.get_history(), initial.as_slice());
        store.reset().unwrap();
        assert_eq!(store.get_history(), initial.as_slice());
    }

    #[test]
    fn test_reset_leaves_no_prior_turns_in_context() {
        let mut store = store();
        store.append(Role::User, "secret").unwrap();
        store.append(Role::Assistant, "reply").unwrap();
        store.reset().unwrap();

        let request = store.build_context("fresh");
        assert_eq!(request.turns.len(), 1);
        assert_eq!(request.turns[0].content, "fresh");
    }

    #[test]
    fn test_begin_turn_rejects_blank_input() {
        let mut store = store();
        let err = store.begin_turn("  \n\t").unwrap_err();
        assert!(matches!(classify(&err), Some(ParleyError::InputRejected(_))));
        assert_eq!(store.state(), TurnState::Idle);
        assert!(store.get_history().is_empty());
    }

    #[test]
    fn test_begin_turn_appends_user_turn_once() {
        let mut store = store();
        let request = store.begin_turn("Explain osmosis").unwrap();
        assert_eq!(request.turns.len(), 1);
        assert_eq!(store.state(), TurnState::AwaitingCompletion);
        assert_eq!(history(&store), vec![(Role::User, "Explain osmosis".to_string())]);
    }

    #[test]
    fn test_mutations_rejected_while_awaiting() {
        let mut store = store();
        store.begin_turn("first").unwrap();

        let err = store.begin_turn("second").unwrap_err();
        assert!(matches!(classify(&err), Some(ParleyError::TurnInFlight)));
        let err = store.append(Role::User, "x").unwrap_err();
        assert!(matches!(classify(&err), Some(ParleyError::TurnInFlight)));
        let err = store.reset().unwrap_err();
        assert!(matches!(classify(&err), Some(ParleyError::TurnInFlight)));

        assert_eq!(store.get_history().len(), 1);
    }

    #[tokio::test]
    async fn test_receive_completion_without_turn() {
        let mut store = store();
        let err = store
            .receive_completion(CompletionInput::Text("stray".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(classify(&err), Some(ParleyError::NoTurnInFlight)));
        assert!(store.get_history().is_empty());
    }

    #[tokio::test]
    async fn test_receive_text_commits_reply() {
        let mut store = store();
        store.begin_turn("Explain photosynthesis").unwrap();
        let message = store
            .receive_completion(CompletionInput::Text(
                "Photosynthesis converts light...".to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(message.role(), Role::Assistant);
        assert_eq!(store.state(), TurnState::Idle);
        assert_eq!(
            history(&store),
            vec![
                (Role::User, "Explain photosynthesis".to_string()),
                (Role::Assistant, "Photosynthesis converts light...".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_receive_stream_concatenates_in_order() {
        let mut store = store();
        store.begin_turn("q").unwrap();
        let stream = stream_of(vec![
            fragment("Mito"),
            fragment("chondria "),
            fragment("make ATP."),
            Ok(StreamEvent::Done),
        ]);
        let message = store
            .receive_completion(CompletionInput::Stream(stream))
            .await
            .unwrap();
        assert_eq!(message.content(), "Mitochondria make ATP.");
        assert_eq!(store.get_history().len(), 2);
    }

    #[tokio::test]
    async fn test_receive_single_fragment_stream() {
        let mut store = store();
        store.begin_turn("q").unwrap();
        store
            .receive_completion(CompletionInput::Stream(single_fragment_stream("whole")))
            .await
            .unwrap();
        assert_eq!(store.get_history()[1].content(), "whole");
    }

    #[tokio::test]
    async fn test_interrupted_stream_leaves_history_unchanged() {
        let mut store = store();
        store.begin_turn("q").unwrap();
        let before = store.get_history().to_vec();

        let stream = stream_of(vec![fragment("par"), fragment("tial")]);
        let err = store
            .receive_completion(CompletionInput::Stream(stream))
            .await
            .unwrap_err();

        match classify(&err) {
            Some(ParleyError::StreamInterrupted { fragments }) => assert_eq!(*fragments, 2),
            other => panic!("expected StreamInterrupted, got {:?}", other),
        }
        assert_eq!(store.get_history(), before.as_slice());
        assert_eq!(store.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_stream_error_returns_to_idle() {
        let mut store = store();
        store.begin_turn("q").unwrap();
        let stream = stream_of(vec![
            fragment("a"),
            Err(ParleyError::RateLimited("quota".to_string()).into()),
        ]);
        let err = store
            .receive_completion(CompletionInput::Stream(stream))
            .await
            .unwrap_err();
        assert!(classify(&err).unwrap().is_completion_failure());
        assert_eq!(store.state(), TurnState::Idle);
        assert_eq!(history(&store), vec![(Role::User, "q".to_string())]);
    }

    #[tokio::test]
    async fn test_fragments_after_done_are_ignored() {
        let mut store = store();
        store.begin_turn("q").unwrap();
        let stream = stream_of(vec![fragment("kept"), Ok(StreamEvent::Done), fragment("dropped")]);
        let message = store
            .receive_completion(CompletionInput::Stream(stream))
            .await
            .unwrap();
        assert_eq!(message.content(), "kept");
    }

    #[test]
    fn test_abandon_turn_returns_to_idle() {
        let mut store = store();
        store.begin_turn("q").unwrap();
        store.abandon_turn();
        assert!(store.is_idle());
        assert_eq!(store.get_history().len(), 1);

        store.abandon_turn();
        assert!(store.is_idle());
    }

    #[test]
    fn test_turn_state_display() {
        assert_eq!(TurnState::Idle.to_string(), "idle");
        assert_eq!(TurnState::AwaitingCompletion.to_string(), "awaiting completion");
    }
}
