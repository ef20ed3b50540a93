//! Chat session: a conversation store wired to a completion client

use crate::config::Config;
use crate::error::{classify, Result};
use crate::providers::{create_provider, single_fragment_stream, FragmentStream, Provider};
use crate::session::metrics::TurnMetrics;
use crate::session::store::{ConversationStore, ReplyAccumulator, TurnState};
use crate::session::Message;
use std::sync::Arc;
use uuid::Uuid;

/// One chat conversation and the client that answers it
///
/// Sessions are explicit values; nothing is shared between them. Only one
/// turn can be in flight at a time, which is enforced both by the store's
/// state machine and by [`PendingTurn`] borrowing the session's store.
///
/// # Examples
///
/// ```no_run
/// use parley::config::Config;
/// use parley::session::ChatSession;
///
/// # async fn example() -> parley::error::Result<()> {
/// let config = Config::default();
/// let mut session = ChatSession::from_config(&config)?;
/// let reply = session.submit_user_turn("Explain photosynthesis").await?;
/// println!("{}", reply.content());
/// # Ok(())
/// # }
/// ```
pub struct ChatSession {
    id: Uuid,
    store: ConversationStore,
    provider: Arc<dyn Provider>,
    streaming: bool,
    suggestions: Vec<String>,
}

impl ChatSession {
    /// Creates a session from an existing store and provider
    pub fn new(store: ConversationStore, provider: Arc<dyn Provider>, streaming: bool) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(session = %id, streaming, "Chat session created");
        Self {
            id,
            store,
            provider,
            streaming,
            suggestions: Vec::new(),
        }
    }

    /// Creates a session from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the session settings are invalid or the
    /// configured provider cannot be constructed
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.chat_settings()?;
        let provider = create_provider(&config.provider.provider_type, &config.provider)?;
        let store = ConversationStore::new(
            settings.system_instructions,
            config.persona.greeting.clone(),
            config.session.context,
        );
        Ok(Self::new(store, Arc::from(provider), config.session.streaming)
            .with_suggestions(config.persona.suggestions.clone()))
    }

    /// Sets the starter suggestions offered while the conversation is fresh
    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Unique session identifier used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The underlying store
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// The completion client
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Whether replies are requested as fragment streams
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Current turn state
    pub fn state(&self) -> TurnState {
        self.store.state()
    }

    /// All configured starter suggestions
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Suggestions to offer right now: all of them while the conversation is
    /// fresh, none once it has started
    pub fn starter_suggestions(&self) -> &[String] {
        if self.store.conversation().is_fresh() {
            &self.suggestions
        } else {
            &[]
        }
    }

    /// All messages in insertion order
    pub fn get_history(&self) -> &[Message] {
        self.store.get_history()
    }

    /// Starts a new conversation
    ///
    /// # Errors
    ///
    /// Returns `TurnInFlight` while a turn is pending
    pub fn request_reset(&mut self) -> Result<()> {
        self.store.reset()?;
        tracing::info!(session = %self.id, "Conversation reset");
        Ok(())
    }

    /// Sends a user turn and returns the reply as it arrives
    ///
    /// The user turn is recorded immediately. The returned [`PendingTurn`]
    /// yields fragments through [`PendingTurn::next_fragment`] and commits the
    /// reply with [`PendingTurn::finish`]. Dropping it first abandons the turn.
    ///
    /// # Errors
    ///
    /// Returns `InputRejected` for blank text, `TurnInFlight` if a turn is
    /// pending, or a completion failure if the client could not start a
    /// reply. After a completion failure the session is Idle again and the
    /// user turn stays in the history.
    pub async fn start_turn(&mut self, text: &str) -> Result<PendingTurn<'_>> {
        let request = self.store.begin_turn(text)?;
        let provider = Arc::clone(&self.provider);

        tracing::info!(
            session = %self.id,
            turns = request.turns.len(),
            "Requesting completion"
        );

        // Built before awaiting the client so a dropped future still abandons the turn.
        let mut turn = PendingTurn {
            store: &mut self.store,
            stream: Box::pin(futures::stream::empty()),
            reply: ReplyAccumulator::default(),
            metrics: TurnMetrics::new(self.streaming),
            session_id: self.id,
            settled: false,
        };

        let started: Result<FragmentStream> = if self.streaming {
            provider.stream(&request).await
        } else {
            provider
                .complete(&request)
                .await
                .map(|response| single_fragment_stream(response.content))
        };

        match started {
            Ok(stream) => {
                turn.stream = stream;
                Ok(turn)
            }
            Err(e) => {
                turn.fail(&e);
                Err(e)
            }
        }
    }

    /// Sends a user turn and waits for the whole reply
    ///
    /// # Errors
    ///
    /// See [`ChatSession::start_turn`]; interrupted streams return
    /// `StreamInterrupted`
    pub async fn submit_user_turn(&mut self, text: &str) -> Result<Message> {
        self.start_turn(text).await?.finish().await
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("store", &self.store)
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

/// A turn whose reply is still arriving
///
/// Holds the session's store mutably, so no other turn can start until this
/// one is finished or dropped.
pub struct PendingTurn<'a> {
    store: &'a mut ConversationStore,
    stream: FragmentStream,
    reply: ReplyAccumulator,
    metrics: TurnMetrics,
    session_id: Uuid,
    settled: bool,
}

impl PendingTurn<'_> {
    /// Returns the next fragment, or `None` once the reply is complete
    ///
    /// # Errors
    ///
    /// Returns the client's error or `StreamInterrupted`. The turn is then
    /// settled: nothing is committed and the store is Idle again.
    pub async fn next_fragment(&mut self) -> Result<Option<String>> {
        if self.settled {
            return Ok(None);
        }

        match self.reply.pull(&mut self.stream).await {
            Ok(Some(fragment)) => {
                self.metrics.record_fragment();
                Ok(Some(fragment))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Number of fragments received so far
    pub fn fragments(&self) -> usize {
        self.reply.fragments()
    }

    /// Waits for any remaining fragments and commits the reply
    ///
    /// # Errors
    ///
    /// Returns the client's error or `StreamInterrupted`, or `NoTurnInFlight`
    /// if the turn already failed
    pub async fn finish(mut self) -> Result<Message> {
        while self.next_fragment().await?.is_some() {}

        if self.settled || !self.reply.is_finished() {
            return Err(crate::error::ParleyError::NoTurnInFlight.into());
        }

        let text = std::mem::take(&mut self.reply).into_text();
        let message = self.store.commit_reply(text)?;
        self.settled = true;
        self.metrics.record_success();
        tracing::info!(
            session = %self.session_id,
            fragments = self.metrics.fragments(),
            elapsed_ms = u64::try_from(self.metrics.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Reply committed"
        );
        Ok(message)
    }

    fn fail(&mut self, err: &anyhow::Error) {
        let kind = classify(err).map(|p| p.kind()).unwrap_or("other");
        self.settled = true;
        self.metrics.record_failure(kind);
        tracing::warn!(session = %self.session_id, kind, "Completion failed: {}", err);
        self.store.fail_turn(err);
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::info!(
                session = %self.session_id,
                fragments = self.reply.fragments(),
                "Turn abandoned before completion"
            );
            self.store.abandon_turn();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParleyError;
    use crate::providers::{Role, StreamEvent};
    use crate::session::ContextPolicy;
    use crate::test_utils::ScriptedProvider;
    use std::time::Duration;

    fn session_with(provider: ScriptedProvider, streaming: bool) -> ChatSession {
        let store = ConversationStore::new("Be a tutor.", None, ContextPolicy::default());
        ChatSession::new(store, Arc::new(provider), streaming)
    }

    fn history(session: &ChatSession) -> Vec<(Role, String)> {
        session
            .get_history()
            .iter()
            .map(|m| (m.role(), m.content().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_submit_user_turn_success() {
        let provider = ScriptedProvider::new().reply("Photosynthesis converts light...");
        let mut session = session_with(provider, false);

        let reply = session.submit_user_turn("Explain photosynthesis").await.unwrap();
        assert_eq!(reply.content(), "Photosynthesis converts light...");
        assert_eq!(
            history(&session),
            vec![
                (Role::User, "Explain photosynthesis".to_string()),
                (Role::Assistant, "Photosynthesis converts light...".to_string()),
            ]
        );
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_failure_then_success_resumes() {
        let provider = ScriptedProvider::new()
            .fail(ParleyError::Authentication("bad key".to_string()))
            .reply("Y answer");
        let mut session = session_with(provider, false);

        let err = session.submit_user_turn("X").await.unwrap_err();
        assert!(classify(&err).unwrap().is_completion_failure());
        assert_eq!(history(&session), vec![(Role::User, "X".to_string())]);
        assert_eq!(session.state(), TurnState::Idle);

        session.submit_user_turn("Y").await.unwrap();
        assert_eq!(
            history(&session),
            vec![
                (Role::User, "X".to_string()),
                (Role::User, "Y".to_string()),
                (Role::Assistant, "Y answer".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_streamed_fragments_arrive_in_order() {
        let provider = ScriptedProvider::new().stream(vec!["Cells ", "divide ", "by mitosis."]);
        let mut session = session_with(provider, true);

        let mut seen = Vec::new();
        let mut turn = session.start_turn("How do cells divide?").await.unwrap();
        while let Some(fragment) = turn.next_fragment().await.unwrap() {
            seen.push(fragment);
        }
        assert_eq!(turn.fragments(), 3);
        let message = turn.finish().await.unwrap();

        assert_eq!(seen, vec!["Cells ", "divide ", "by mitosis."]);
        assert_eq!(message.content(), "Cells divide by mitosis.");
        assert_eq!(session.get_history().len(), 2);
    }

    #[tokio::test]
    async fn test_interrupted_stream_commits_nothing() {
        let provider = ScriptedProvider::new().interrupted(vec!["Half an"]);
        let mut session = session_with(provider, true);

        let err = session.submit_user_turn("q").await.unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(ParleyError::StreamInterrupted { fragments: 1 })
        ));
        assert_eq!(history(&session), vec![(Role::User, "q".to_string())]);
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_dropping_pending_turn_abandons_it() {
        let provider = ScriptedProvider::new()
            .stream(vec!["one", "two"])
            .reply("next");
        let mut session = session_with(provider, true);

        {
            let mut turn = session.start_turn("q").await.unwrap();
            assert_eq!(turn.next_fragment().await.unwrap().as_deref(), Some("one"));
        }

        assert_eq!(session.state(), TurnState::Idle);
        assert_eq!(history(&session), vec![(Role::User, "q".to_string())]);
        session.submit_user_turn("again").await.unwrap();
        assert_eq!(session.get_history().len(), 3);
    }

    #[tokio::test]
    async fn test_next_fragment_after_error_returns_none() {
        let provider = ScriptedProvider::new().stream_events(vec![
            Ok(StreamEvent::Fragment("a".to_string())),
            Err(ParleyError::Provider("mid-stream".to_string()).into()),
        ]);
        let mut session = session_with(provider, true);

        let mut turn = session.start_turn("q").await.unwrap();
        assert!(turn.next_fragment().await.unwrap().is_some());
        assert!(turn.next_fragment().await.is_err());
        assert!(turn.next_fragment().await.unwrap().is_none());
        let err = turn.finish().await.unwrap_err();
        assert!(matches!(classify(&err), Some(ParleyError::NoTurnInFlight)));
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_cancelled_submit_leaves_session_usable() {
        let provider = ScriptedProvider::new()
            .slow_reply("too late", Duration::from_secs(10))
            .reply("Y answer");
        let mut session = session_with(provider, false);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), session.submit_user_turn("X")).await;
        assert!(cancelled.is_err());
        assert_eq!(session.state(), TurnState::Idle);
        assert_eq!(history(&session), vec![(Role::User, "X".to_string())]);

        let reply = session.submit_user_turn("Y").await.unwrap();
        assert_eq!(reply.content(), "Y answer");
        assert_eq!(session.get_history().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_streaming_start_allows_reset() {
        let provider = ScriptedProvider::new().slow_reply("too late", Duration::from_secs(10));
        let mut session = session_with(provider, true);

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), session.start_turn("X")).await;
        assert!(cancelled.is_err());
        drop(cancelled);
        assert_eq!(session.state(), TurnState::Idle);

        session.request_reset().unwrap();
        assert!(session.get_history().is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_without_calling_provider() {
        let provider = ScriptedProvider::new();
        let calls = provider.calls();
        let mut session = session_with(provider, true);

        let err = session.submit_user_turn("   ").await.unwrap_err();
        assert!(matches!(classify(&err), Some(ParleyError::InputRejected(_))));
        assert!(session.get_history().is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_receives_full_history() {
        let provider = ScriptedProvider::new().reply("a1").reply("a2");
        let calls = provider.calls();
        let mut session = session_with(provider, false);

        session.submit_user_turn("q1").await.unwrap();
        session.submit_user_turn("q2").await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let texts: Vec<&str> = calls[1].turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(texts, vec!["q1", "a1", "q2"]);
        assert_eq!(calls[1].system_instructions, "Be a tutor.");
    }

    #[tokio::test]
    async fn test_reset_then_history_is_initial() {
        let provider = ScriptedProvider::new().reply("a");
        let mut session = session_with(provider, false);
        session.submit_user_turn("q").await.unwrap();

        session.request_reset().unwrap();
        assert!(session.get_history().is_empty());
        session.request_reset().unwrap();
        assert!(session.get_history().is_empty());
    }

    #[tokio::test]
    async fn test_starter_suggestions_only_while_fresh() {
        let provider = ScriptedProvider::new().reply("a");
        let mut session = session_with(provider, false)
            .with_suggestions(vec!["Explain mitosis".to_string()]);

        assert_eq!(session.starter_suggestions().len(), 1);
        session.submit_user_turn("q").await.unwrap();
        assert!(session.starter_suggestions().is_empty());
        assert_eq!(session.suggestions().len(), 1);

        session.request_reset().unwrap();
        assert_eq!(session.starter_suggestions().len(), 1);
    }
}
