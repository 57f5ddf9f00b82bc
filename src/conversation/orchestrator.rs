//! Conversation orchestrator: drives mount → send → reply → persist.
//!
//! [`ChatOrchestrator`] owns the [`SharedConversation`] and wires together the
//! session client, history store, language registry and voice input.
//!
//! # Send flow
//!
//! ```text
//! submit() / send_transcript()
//!   └─▶ guard: mounted, not busy, non-blank               [Ignored]
//!         └─▶ append user message, loading = true        [AwaitingResponse]
//!               └─▶ session.send(directive + text)
//!                     ├─ Ok  → append reply or "(No response)"   [Replied]
//!                     └─ Err → append apology                    [Failed]
//!                           └─▶ persist non-welcome messages      [Idle]
//! ```
//!
//! No lock on the shared state is held across an `.await`.

use std::sync::{Arc, MutexGuard};

use tokio::task::JoinHandle;

use crate::config::{AppConfig, WidgetConfig};
use crate::language::{compose_message, Language, LanguagePreference, LanguageRegistry};
use crate::session::{ChatBackend, SessionClient, SessionIdentity};
use crate::storage::{HistoryStore, KeyValueStore};
use crate::voice::{Recognition, RecognitionOutcome, SpeechRecognizer, VoiceInput};

use super::message::{ConversationLog, Role};
use super::state::{new_shared_conversation, ConversationState, SessionPhase, SharedConversation};

/// Appended when a typed message fails.
pub const APOLOGY_TEXT: &str = "Sorry, I encountered an error. Please try again.";

/// Appended when a voice transcript fails.
pub const VOICE_APOLOGY_TEXT: &str = "Sorry, I encountered an error processing your voice message.";

/// Appended when the backend answers with an empty reply.
pub const NO_RESPONSE_TEXT: &str = "(No response)";

/// Voice error shown when the platform has no speech engine.
pub const VOICE_UNSUPPORTED_TEXT: &str = "Voice recording is not supported in this browser";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Where a user message came from.  Only changes the apology wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Typed,
    Voice,
}

impl InputSource {
    fn apology(self) -> &'static str {
        match self {
            InputSource::Typed => APOLOGY_TEXT,
            InputSource::Voice => VOICE_APOLOGY_TEXT,
        }
    }
}

/// Why a send was not performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Blank after trimming.
    EmptyInput,
    /// A reply is still pending.
    AwaitingResponse,
    /// [`ChatOrchestrator::mount`] has not run.
    NotMounted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was appended and no request was made.
    Ignored(IgnoreReason),
    /// The agent's reply (or the placeholder) was appended.
    Replied,
    /// The request failed and an apology was appended.
    Failed,
}

/// Result of [`ChatOrchestrator::toggle_voice`].
#[derive(Debug)]
pub enum VoiceToggle {
    /// Voice is disabled, unsupported, or could not start.
    Unavailable,
    /// A new attempt is listening; pass it to
    /// [`finish_voice`](ChatOrchestrator::finish_voice).
    Started(Recognition),
    /// The attempt in flight was asked to stop.
    Stopped,
}

// ---------------------------------------------------------------------------
// ChatOrchestrator
// ---------------------------------------------------------------------------

/// Drives one embedded chat conversation.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use chat_widget::config::AppConfig;
/// use chat_widget::conversation::ChatOrchestrator;
/// use chat_widget::session::HttpBackend;
/// use chat_widget::storage::MemoryStore;
/// use chat_widget::voice::UnsupportedRecognizer;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let orchestrator = ChatOrchestrator::new(
///     &config,
///     Arc::new(MemoryStore::new()),
///     Arc::new(HttpBackend::from_config(&config.backend)),
///     Arc::new(UnsupportedRecognizer),
/// );
/// orchestrator.mount();
///
/// orchestrator.set_input("Hello");
/// orchestrator.submit().await;
/// for message in orchestrator.snapshot().log.messages() {
///     println!("{:?}: {}", message.role, message.content);
/// }
/// # }
/// ```
pub struct ChatOrchestrator {
    config: WidgetConfig,
    state: SharedConversation,
    session: SessionClient,
    history: HistoryStore,
    languages: LanguageRegistry,
    preference: LanguagePreference,
    voice: VoiceInput,
}

impl ChatOrchestrator {
    /// Build an orchestrator over the given store, backend and recognizer.
    ///
    /// Nothing is read or sent until [`mount`](Self::mount).
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn ChatBackend>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        let namespace = config.storage.namespace.as_str();
        let languages = LanguageRegistry::from_config(&config.widget);
        let default_language = languages.default_language().clone();

        let identity = Arc::new(SessionIdentity::new(Arc::clone(&store), namespace));
        Self {
            config: config.widget.clone(),
            state: new_shared_conversation(&default_language.code),
            session: SessionClient::new(backend, identity),
            history: HistoryStore::new(
                Arc::clone(&store),
                namespace,
                config.storage.max_messages,
            ),
            languages,
            preference: LanguagePreference::new(store, namespace),
            voice: VoiceInput::new(recognizer, &default_language.voice_locale),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Handle to the live state, for hosts that poll it.
    pub fn state(&self) -> SharedConversation {
        Arc::clone(&self.state)
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> ConversationState {
        self.lock_state().clone()
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    pub fn voice(&self) -> &VoiceInput {
        &self.voice
    }

    pub fn session_id(&self) -> String {
        self.session.session_id()
    }

    /// The currently selected language.
    pub fn language(&self) -> Language {
        let code = self.lock_state().language.clone();
        self.languages.resolve(&code).clone()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the widget.
    ///
    /// Restores the language preference and, when the stored history matches
    /// the configured context, the previous conversation; otherwise seeds the
    /// welcome message.  Session init runs on a spawned task whose handle is
    /// returned.  A second call changes nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(&self) -> JoinHandle<()> {
        if self.lock_state().phase != SessionPhase::Uninitialized {
            log::debug!("conversation: already mounted");
            return tokio::spawn(async {});
        }

        let stored_language = self.preference.load();
        let language = self
            .languages
            .initial_code(stored_language.as_deref())
            .to_string();
        self.voice.set_locale(self.languages.voice_locale(&language));

        let restored = self.history.load_valid(&self.config.context);

        {
            let mut state = self.lock_state();
            state.language = language;
            match restored {
                Some(stored) => {
                    log::info!(
                        "conversation: restored {} messages from history",
                        stored.messages.len()
                    );
                    state.log = ConversationLog::from_messages(stored.messages);
                    state.context_memory = true;
                }
                None => {
                    state.log = ConversationLog::welcome(&self.config.agent_name);
                    state.context_memory = false;
                }
            }
            state.phase = SessionPhase::Idle;
            state.loading = false;
            log::debug!("conversation: {}", state.phase.label());
        }

        let session = self.session.clone();
        let context = self.config.context.clone();
        tokio::spawn(async move {
            session.init(&context).await;
        })
    }

    /// Forget the conversation and start a new remote session.
    ///
    /// Local effects, including the session id rotation, are immediate; the
    /// remote reset of the old id followed by init of the new one runs on a
    /// spawned task whose handle is returned.  A reply still in flight when
    /// this is called is discarded on arrival.
    ///
    /// Must be called from within a tokio runtime.
    pub fn clear_memory(&self) -> JoinHandle<()> {
        let old_id = self.session.rotate();

        {
            let mut state = self.lock_state();
            self.history.clear();
            state.log = ConversationLog::welcome(&self.config.agent_name);
            state.context_memory = false;
            state.generation += 1;
        }
        log::info!("conversation: memory cleared");

        let session = self.session.clone();
        let context = self.config.context.clone();
        tokio::spawn(async move {
            session.reset_remote(&old_id).await;
            session.init(&context).await;
        })
    }

    // -----------------------------------------------------------------------
    // Language
    // -----------------------------------------------------------------------

    /// Select a language for subsequent messages and voice attempts.
    ///
    /// Unsupported codes resolve to the default language.  The conversation
    /// itself is left untouched.
    pub fn change_language(&self, code: &str) -> Language {
        let language = self.languages.resolve(code).clone();
        if language.code != code {
            log::warn!(
                "conversation: unsupported language '{code}', using '{}'",
                language.code
            );
        }

        self.preference.save(&language.code);
        self.voice.set_locale(&language.voice_locale);
        self.lock_state().language = language.code.clone();
        log::info!("conversation: language set to {}", language.native_name);
        language
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Replace the input buffer.
    pub fn set_input(&self, text: &str) {
        self.lock_state().input = text.to_string();
    }

    /// Send the input buffer.  The buffer is cleared only when the message is
    /// actually sent.
    pub async fn submit(&self) -> SendOutcome {
        let text = {
            let mut state = self.lock_state();
            if let Err(reason) = check_ready(&state, &state.input) {
                return SendOutcome::Ignored(reason);
            }
            std::mem::take(&mut state.input)
        };
        self.dispatch(text, InputSource::Typed).await
    }

    /// Send a voice transcript through the same pipeline as typed input.
    pub async fn send_transcript(&self, transcript: &str) -> SendOutcome {
        self.dispatch(transcript.to_string(), InputSource::Voice).await
    }

    async fn dispatch(&self, text: String, source: InputSource) -> SendOutcome {
        let (generation, language) = {
            let mut state = self.lock_state();
            if let Err(reason) = check_ready(&state, &text) {
                log::debug!("conversation: send ignored ({reason:?})");
                return SendOutcome::Ignored(reason);
            }
            state.log.push(Role::User, text.as_str());
            state.loading = true;
            state.phase = SessionPhase::AwaitingResponse;
            log::debug!("conversation: {}", state.phase.label());
            (state.generation, state.language.clone())
        };

        let directive = self.languages.directive(&language);
        let payload = compose_message(&directive, &text);
        let result = self.session.send(&payload, &self.config.context).await;

        let mut state = self.lock_state();
        state.loading = false;
        state.phase = SessionPhase::Idle;

        if state.generation != generation {
            log::info!("conversation: dropping reply for a cleared conversation");
            return match result {
                Ok(_) => SendOutcome::Replied,
                Err(_) => SendOutcome::Failed,
            };
        }

        let outcome = match result {
            Ok(reply) => {
                let reply = if reply.trim().is_empty() {
                    NO_RESPONSE_TEXT.to_string()
                } else {
                    reply
                };
                state.log.push(Role::Agent, reply);
                SendOutcome::Replied
            }
            Err(e) => {
                log::error!("conversation: send failed: {e}");
                state.log.push(Role::Agent, source.apology());
                SendOutcome::Failed
            }
        };

        self.persist(&mut state);
        outcome
    }

    /// Write the log to the history store and flag the conversation as
    /// remembered.  A welcome-only log is never written.
    ///
    /// Called with the state lock held so a concurrent `clear_memory` cannot
    /// land between the write and the flag.
    fn persist(&self, state: &mut ConversationState) {
        let messages = state.log.persistable();
        if messages.is_empty() {
            return;
        }
        self.history.save(&messages, &self.config.context);
        state.context_memory = true;
    }

    // -----------------------------------------------------------------------
    // Voice
    // -----------------------------------------------------------------------

    /// Start listening, or stop the attempt already in flight.
    ///
    /// Without a speech engine this reports the unsupported error whether or
    /// not voice is enabled; a supported but disabled voice is silent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn toggle_voice(&self) -> VoiceToggle {
        if !self.voice.is_supported() {
            self.lock_state().voice_error = Some(VOICE_UNSUPPORTED_TEXT.to_string());
            return VoiceToggle::Unavailable;
        }

        if !self.config.enable_voice {
            return VoiceToggle::Unavailable;
        }

        if self.voice.is_active() {
            self.voice.stop();
            return VoiceToggle::Stopped;
        }

        self.lock_state().voice_error = None;
        match self.voice.start() {
            Ok(recognition) => VoiceToggle::Started(recognition),
            Err(e) => {
                self.lock_state().voice_error = Some(e.to_string());
                VoiceToggle::Unavailable
            }
        }
    }

    /// Wait for `recognition` to finish and act on its outcome.
    ///
    /// A transcript is sent as a voice message and its outcome returned.  A
    /// failure is surfaced as the voice error; nothing is sent.
    pub async fn finish_voice(&self, recognition: Recognition) -> Option<SendOutcome> {
        match recognition.outcome().await {
            RecognitionOutcome::Transcript(text) => Some(self.send_transcript(&text).await),
            RecognitionOutcome::Failed(e) => {
                self.lock_state().voice_error = Some(e.to_string());
                None
            }
            RecognitionOutcome::Cancelled => None,
        }
    }

    pub fn dismiss_voice_error(&self) {
        self.lock_state().voice_error = None;
    }

    fn lock_state(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Whether `text` may be sent in `state`.
fn check_ready(state: &ConversationState, text: &str) -> Result<(), IgnoreReason> {
    match state.phase {
        SessionPhase::Uninitialized => Err(IgnoreReason::NotMounted),
        SessionPhase::AwaitingResponse => Err(IgnoreReason::AwaitingResponse),
        SessionPhase::Idle if text.trim().is_empty() => Err(IgnoreReason::EmptyInput),
        SessionPhase::Idle => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::conversation::message::{welcome_text, WELCOME_MESSAGE_ID};
    use crate::session::{Ack, SessionError};
    use crate::storage::store::tests::BrokenStore;
    use crate::storage::{MemoryStore, StorageError};
    use crate::voice::{MockRecognizer, VoiceError};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Init { session_id: String, context: String },
        Send { session_id: String, message: String },
        Reset { session_id: String },
    }

    /// Scripted backend.  Replies are popped from `replies`; once empty it
    /// answers "Sure!".  With a gate, `send` waits for one permit first.
    #[derive(Default)]
    struct MockBackend {
        replies: Mutex<VecDeque<Result<String, SessionError>>>,
        fail_lifecycle: bool,
        gate: Option<Arc<Notify>>,
        calls: Mutex<Vec<Call>>,
    }

    impl MockBackend {
        fn replying(replies: Vec<Result<String, SessionError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Self::default()
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn sent_messages(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Send { message, .. } => Some(message),
                    _ => None,
                })
                .collect()
        }

        fn lifecycle_result(&self, session_id: &str) -> Result<Ack, SessionError> {
            if self.fail_lifecycle {
                Err(SessionError::Request("connection refused".into()))
            } else {
                Ok(Ack {
                    success: true,
                    message: None,
                    session_id: Some(session_id.to_string()),
                })
            }
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        async fn init(&self, session_id: &str, context: &str) -> Result<Ack, SessionError> {
            self.calls.lock().unwrap().push(Call::Init {
                session_id: session_id.to_string(),
                context: context.to_string(),
            });
            self.lifecycle_result(session_id)
        }

        async fn send(&self, session_id: &str, message: &str, _context: &str) -> Result<String, SessionError> {
            self.calls.lock().unwrap().push(Call::Send {
                session_id: session_id.to_string(),
                message: message.to_string(),
            });
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("Sure!".to_string()))
        }

        async fn reset(&self, session_id: &str) -> Result<Ack, SessionError> {
            self.calls.lock().unwrap().push(Call::Reset {
                session_id: session_id.to_string(),
            });
            self.lifecycle_result(session_id)
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        backend: Arc<MockBackend>,
        recognizer: Arc<MockRecognizer>,
        config: AppConfig,
    }

    impl Harness {
        fn new(backend: MockBackend) -> Self {
            Self::with(AppConfig::default(), backend, MockRecognizer::silent())
        }

        fn with(config: AppConfig, backend: MockBackend, recognizer: MockRecognizer) -> Self {
            Self {
                store: Arc::new(MemoryStore::new()),
                backend: Arc::new(backend),
                recognizer: Arc::new(recognizer),
                config,
            }
        }

        fn orchestrator(&self) -> ChatOrchestrator {
            ChatOrchestrator::new(
                &self.config,
                self.store.clone(),
                self.backend.clone(),
                self.recognizer.clone(),
            )
        }

        fn history(&self) -> HistoryStore {
            HistoryStore::new(
                self.store.clone(),
                &self.config.storage.namespace,
                self.config.storage.max_messages,
            )
        }

        async fn mounted(&self) -> ChatOrchestrator {
            let orchestrator = self.orchestrator();
            orchestrator.mount().await.unwrap();
            orchestrator
        }
    }

    async fn wait_for_phase(orchestrator: &ChatOrchestrator, phase: SessionPhase) {
        for _ in 0..100 {
            if orchestrator.snapshot().phase == phase {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("phase never reached {phase:?}");
    }

    // ── Mount ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn fresh_mount_shows_welcome_only() {
        let mut config = AppConfig::default();
        config.widget.agent_name = "HelperBot".into();
        let h = Harness::with(config, MockBackend::default(), MockRecognizer::silent());

        let orchestrator = h.mounted().await;
        let state = orchestrator.snapshot();

        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(state.log.len(), 1);
        let welcome = &state.log.messages()[0];
        assert_eq!(welcome.id, WELCOME_MESSAGE_ID);
        assert_eq!(welcome.role, Role::Agent);
        assert_eq!(welcome.content, "Hi! I'm HelperBot. How can I help you today?");
        assert!(!state.context_memory);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn mount_initialises_session_with_context() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        assert_eq!(
            h.backend.calls(),
            vec![Call::Init {
                session_id: orchestrator.session_id(),
                context: h.config.widget.context.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn second_mount_changes_nothing() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;
        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        orchestrator.mount().await.unwrap();
        assert_eq!(orchestrator.snapshot().log.len(), 3);
        assert_eq!(h.backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn init_failure_does_not_block_sending() {
        let backend = MockBackend {
            fail_lifecycle: true,
            ..MockBackend::default()
        };
        let h = Harness::new(backend);
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        assert_eq!(orchestrator.submit().await, SendOutcome::Replied);
    }

    #[tokio::test]
    async fn mount_restores_history_with_matching_context() {
        let h = Harness::new(MockBackend::default());
        {
            let first = h.mounted().await;
            first.set_input("Remember me");
            first.submit().await;
        }

        let orchestrator = h.mounted().await;
        let state = orchestrator.snapshot();
        assert!(state.context_memory);
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log.messages()[0].content, "Remember me");
        assert_eq!(state.log.messages()[1].content, "Sure!");
    }

    #[tokio::test]
    async fn mount_discards_history_from_another_context() {
        let h = Harness::new(MockBackend::default());
        let mut log = ConversationLog::welcome("x");
        log.push(Role::User, "old question");
        log.push(Role::Agent, "old answer");
        h.history().save(&log.persistable(), "a different context");

        let orchestrator = h.mounted().await;
        let state = orchestrator.snapshot();
        assert!(!state.context_memory);
        assert!(state.log.is_welcome_only());
        assert_eq!(
            state.log.messages()[0].content,
            welcome_text(&h.config.widget.agent_name)
        );
    }

    #[tokio::test]
    async fn mount_applies_stored_language() {
        let h = Harness::new(MockBackend::default());
        h.orchestrator().change_language("es");

        let orchestrator = h.mounted().await;
        assert_eq!(orchestrator.snapshot().language, "es");
        assert_eq!(orchestrator.voice().locale(), "es-ES");
    }

    #[tokio::test]
    async fn mount_ignores_unsupported_stored_language() {
        let mut config = AppConfig::default();
        config.widget.supported_languages.retain(|l| l.code != "hi");
        let h = Harness::with(config, MockBackend::default(), MockRecognizer::silent());
        LanguagePreference::new(h.store.clone(), &h.config.storage.namespace).save("hi");

        let orchestrator = h.mounted().await;
        assert_eq!(orchestrator.snapshot().language, "en");
        assert_eq!(orchestrator.voice().locale(), "en-US");
    }

    // ── Sending ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_before_mount_is_ignored() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.orchestrator();

        orchestrator.set_input("Hello");
        assert_eq!(
            orchestrator.submit().await,
            SendOutcome::Ignored(IgnoreReason::NotMounted)
        );
        assert_eq!(orchestrator.snapshot().input, "Hello");
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        orchestrator.set_input("   \n\t");
        assert_eq!(
            orchestrator.submit().await,
            SendOutcome::Ignored(IgnoreReason::EmptyInput)
        );
        assert_eq!(
            orchestrator.send_transcript("  ").await,
            SendOutcome::Ignored(IgnoreReason::EmptyInput)
        );
        assert_eq!(orchestrator.snapshot().log.len(), 1);
        assert!(h.backend.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn each_send_adds_exactly_two_messages() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            orchestrator.set_input(text);
            assert_eq!(orchestrator.submit().await, SendOutcome::Replied);

            let state = orchestrator.snapshot();
            assert_eq!(state.log.len(), 1 + 2 * (i + 1));
            let user = &state.log.messages()[state.log.len() - 2];
            assert_eq!(user.role, Role::User);
            assert_eq!(user.content, *text);
            assert_eq!(state.log.last().unwrap().role, Role::Agent);
        }

        let log = orchestrator.snapshot().log;
        assert!(log
            .messages()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn submit_clears_input_and_loading() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        let state = orchestrator.snapshot();
        assert!(state.input.is_empty());
        assert!(!state.loading);
        assert_eq!(state.phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn english_message_carries_english_directive() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        assert_eq!(
            h.backend.sent_messages(),
            vec!["Please respond in English.\n\nHello".to_string()]
        );
    }

    #[tokio::test]
    async fn hindi_message_carries_hindi_directive() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;
        orchestrator.change_language("hi");

        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        assert_eq!(
            h.backend.sent_messages(),
            vec!["कृपया हिंदी में जवाब दें। (Please respond in Hindi)\n\nHello".to_string()]
        );
        // The log keeps what the user typed.
        assert_eq!(orchestrator.snapshot().log.messages()[1].content, "Hello");
    }

    #[tokio::test]
    async fn send_uses_current_session_id() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        let sid = orchestrator.session_id();
        assert!(h
            .backend
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Send { session_id, .. } if *session_id == sid)));
    }

    #[tokio::test]
    async fn server_error_appends_one_apology() {
        let backend = MockBackend::replying(vec![Err(SessionError::Status(500))]);
        let h = Harness::new(backend);
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        assert_eq!(orchestrator.submit().await, SendOutcome::Failed);

        let state = orchestrator.snapshot();
        assert_eq!(state.log.len(), 3);
        assert_eq!(state.log.last().unwrap().role, Role::Agent);
        assert_eq!(state.log.last().unwrap().content, APOLOGY_TEXT);
        assert!(!state.loading);
        assert_eq!(state.phase, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn empty_reply_uses_placeholder() {
        let backend = MockBackend::replying(vec![Ok(String::new())]);
        let h = Harness::new(backend);
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        assert_eq!(
            orchestrator.snapshot().log.last().unwrap().content,
            NO_RESPONSE_TEXT
        );
    }

    #[tokio::test]
    async fn send_while_awaiting_reply_is_ignored() {
        let gate = Arc::new(Notify::new());
        let h = Harness::new(MockBackend::gated(Arc::clone(&gate)));
        let orchestrator = Arc::new(h.mounted().await);

        orchestrator.set_input("first");
        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.submit().await })
        };
        wait_for_phase(&orchestrator, SessionPhase::AwaitingResponse).await;
        assert!(orchestrator.snapshot().loading);

        orchestrator.set_input("second");
        assert_eq!(
            orchestrator.submit().await,
            SendOutcome::Ignored(IgnoreReason::AwaitingResponse)
        );
        assert_eq!(
            orchestrator.send_transcript("third").await,
            SendOutcome::Ignored(IgnoreReason::AwaitingResponse)
        );
        assert_eq!(orchestrator.snapshot().input, "second");
        assert_eq!(orchestrator.snapshot().log.len(), 2);

        gate.notify_one();
        assert_eq!(first.await.unwrap(), SendOutcome::Replied);
        assert_eq!(orchestrator.snapshot().log.len(), 3);
        assert_eq!(h.backend.sent_messages().len(), 1);
    }

    // ── Persistence ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn welcome_only_log_is_never_written() {
        let h = Harness::new(MockBackend::default());
        let _orchestrator = h.mounted().await;
        assert!(!h.history().has_history());
    }

    #[tokio::test]
    async fn reply_is_persisted_without_welcome() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        let stored = h.history().load().unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert!(stored.messages.iter().all(|m| !m.is_welcome()));
        assert_eq!(stored.context, h.config.widget.context);
        assert!(orchestrator.snapshot().context_memory);
    }

    #[tokio::test]
    async fn failed_turn_is_persisted_too() {
        let backend = MockBackend::replying(vec![Err(SessionError::Timeout)]);
        let h = Harness::new(backend);
        let orchestrator = h.mounted().await;

        orchestrator.set_input("Hello");
        orchestrator.submit().await;

        let stored = h.history().load().unwrap();
        assert_eq!(stored.messages.last().unwrap().content, APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn persisted_history_is_capped() {
        let mut config = AppConfig::default();
        config.storage.max_messages = 4;
        let h = Harness::with(config, MockBackend::default(), MockRecognizer::silent());
        let orchestrator = h.mounted().await;

        for text in ["a", "b", "c"] {
            orchestrator.set_input(text);
            orchestrator.submit().await;
        }

        assert_eq!(orchestrator.snapshot().log.len(), 7);
        let stored = h.history().load().unwrap();
        assert_eq!(stored.messages.len(), 4);
        assert_eq!(stored.messages[0].content, "b");
    }

    // ── Clear memory ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn clear_memory_resets_everything() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;
        orchestrator.set_input("Hello");
        orchestrator.submit().await;
        assert!(orchestrator.snapshot().context_memory);
        let old_id = orchestrator.session_id();

        orchestrator.clear_memory().await.unwrap();

        let state = orchestrator.snapshot();
        assert!(state.log.is_welcome_only());
        assert!(!state.context_memory);
        assert!(!h.history().has_history());

        let new_id = orchestrator.session_id();
        assert_ne!(new_id, old_id);

        let calls = h.backend.calls();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(tail[0], Call::Reset { session_id: old_id });
        assert_eq!(
            tail[1],
            Call::Init {
                session_id: new_id,
                context: h.config.widget.context.clone(),
            }
        );
    }

    #[tokio::test]
    async fn clear_memory_survives_backend_failure() {
        let backend = MockBackend {
            fail_lifecycle: true,
            ..MockBackend::default()
        };
        let h = Harness::new(backend);
        let orchestrator = h.mounted().await;
        let old_id = orchestrator.session_id();

        orchestrator.clear_memory().await.unwrap();
        assert_ne!(orchestrator.session_id(), old_id);
        assert!(orchestrator.snapshot().log.is_welcome_only());
    }

    #[tokio::test]
    async fn reply_for_cleared_conversation_is_dropped() {
        let gate = Arc::new(Notify::new());
        let h = Harness::new(MockBackend::gated(Arc::clone(&gate)));
        let orchestrator = Arc::new(h.mounted().await);

        orchestrator.set_input("Hello");
        let pending = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.submit().await })
        };
        wait_for_phase(&orchestrator, SessionPhase::AwaitingResponse).await;

        orchestrator.clear_memory().await.unwrap();
        gate.notify_one();
        pending.await.unwrap();

        let state = orchestrator.snapshot();
        assert!(state.log.is_welcome_only());
        assert!(!state.context_memory);
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(!h.history().has_history());
    }

    #[tokio::test]
    async fn send_right_after_clear_uses_new_session() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;
        let old_id = orchestrator.session_id();

        let reset = orchestrator.clear_memory();
        let new_id = orchestrator.session_id();
        assert_ne!(new_id, old_id);

        orchestrator.set_input("Hello again");
        assert_eq!(orchestrator.submit().await, SendOutcome::Replied);
        reset.await.unwrap();

        let calls = h.backend.calls();
        assert!(calls.contains(&Call::Send {
            session_id: new_id.clone(),
            message: "Please respond in English.\n\nHello again".into(),
        }));
        assert!(calls.contains(&Call::Reset { session_id: old_id.clone() }));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, Call::Send { session_id, .. } if *session_id == old_id)));
        assert_eq!(orchestrator.session_id(), new_id);
    }

    /// Records history writes made while the conversation state is unlocked.
    struct LockCheckingStore {
        inner: MemoryStore,
        state: std::sync::OnceLock<SharedConversation>,
        unlocked: Mutex<Vec<String>>,
    }

    impl LockCheckingStore {
        fn check(&self, key: &str) {
            if !key.ends_with("chat-history") {
                return;
            }
            if let Some(state) = self.state.get() {
                if state.try_lock().is_ok() {
                    self.unlocked.lock().unwrap().push(key.to_string());
                }
            }
        }
    }

    impl KeyValueStore for LockCheckingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.check(key);
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.check(key);
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn history_writes_happen_under_the_state_lock() {
        let store = Arc::new(LockCheckingStore {
            inner: MemoryStore::new(),
            state: std::sync::OnceLock::new(),
            unlocked: Mutex::new(Vec::new()),
        });
        let orchestrator = ChatOrchestrator::new(
            &AppConfig::default(),
            store.clone(),
            Arc::new(MockBackend::default()),
            Arc::new(MockRecognizer::silent()),
        );
        store.state.set(orchestrator.state()).unwrap();
        orchestrator.mount().await.unwrap();

        orchestrator.set_input("Hello");
        orchestrator.submit().await;
        orchestrator.clear_memory().await.unwrap();

        assert!(store.unlocked.lock().unwrap().is_empty());
        assert!(!orchestrator.snapshot().context_memory);
        assert_eq!(store.inner.get("chat-widget-chat-history").unwrap(), None);
    }

    // ── Storage failures ────────────────────────────────────────────────────

    #[tokio::test]
    async fn conversation_continues_without_storage() {
        let backend = Arc::new(MockBackend::default());
        let orchestrator = ChatOrchestrator::new(
            &AppConfig::default(),
            Arc::new(BrokenStore),
            backend.clone(),
            Arc::new(MockRecognizer::silent()),
        );

        orchestrator.mount().await.unwrap();
        assert!(orchestrator.snapshot().log.is_welcome_only());
        assert_eq!(orchestrator.snapshot().language, "en");

        orchestrator.set_input("Hello");
        assert_eq!(orchestrator.submit().await, SendOutcome::Replied);
        assert_eq!(orchestrator.snapshot().log.len(), 3);

        assert_eq!(orchestrator.change_language("hi").code, "hi");

        let old_id = orchestrator.session_id();
        orchestrator.clear_memory().await.unwrap();
        assert!(orchestrator.snapshot().log.is_welcome_only());
        assert_ne!(orchestrator.session_id(), old_id);
        assert!(backend.calls().contains(&Call::Reset { session_id: old_id }));
    }

    // ── Language ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn language_change_keeps_log_and_session() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;
        let calls_before = h.backend.calls().len();
        let log_before = orchestrator.snapshot().log;

        let language = orchestrator.change_language("hi");

        assert_eq!(language.code, "hi");
        assert_eq!(orchestrator.snapshot().log, log_before);
        assert_eq!(orchestrator.voice().locale(), "hi-IN");
        assert_eq!(h.backend.calls().len(), calls_before);
        let preference = LanguagePreference::new(h.store.clone(), &h.config.storage.namespace);
        assert_eq!(preference.load().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn unsupported_language_falls_back_to_default() {
        let h = Harness::new(MockBackend::default());
        let orchestrator = h.mounted().await;

        let language = orchestrator.change_language("fr");
        assert_eq!(language.code, "en");
        assert_eq!(orchestrator.language().code, "en");
    }

    // ── Voice ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn voice_disabled_is_a_silent_noop() {
        let mut config = AppConfig::default();
        config.widget.enable_voice = false;
        let h = Harness::with(config, MockBackend::default(), MockRecognizer::transcript("hi"));
        let orchestrator = h.mounted().await;

        assert!(matches!(orchestrator.toggle_voice(), VoiceToggle::Unavailable));
        assert!(orchestrator.snapshot().voice_error.is_none());
        assert!(!orchestrator.voice().is_recording());
        assert!(h.recognizer.locales().is_empty());
        assert!(h.backend.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn voice_unsupported_reports_error() {
        let h = Harness::with(
            AppConfig::default(),
            MockBackend::default(),
            MockRecognizer::unsupported(),
        );
        let orchestrator = h.mounted().await;

        assert!(matches!(orchestrator.toggle_voice(), VoiceToggle::Unavailable));
        assert_eq!(
            orchestrator.snapshot().voice_error.as_deref(),
            Some(VOICE_UNSUPPORTED_TEXT)
        );
        assert!(h.backend.sent_messages().is_empty());

        orchestrator.dismiss_voice_error();
        assert!(orchestrator.snapshot().voice_error.is_none());
    }

    #[tokio::test]
    async fn unsupported_voice_reports_error_even_when_disabled() {
        let mut config = AppConfig::default();
        config.widget.enable_voice = false;
        let h = Harness::with(config, MockBackend::default(), MockRecognizer::unsupported());
        let orchestrator = h.mounted().await;

        assert!(matches!(orchestrator.toggle_voice(), VoiceToggle::Unavailable));
        assert_eq!(
            orchestrator.snapshot().voice_error.as_deref(),
            Some(VOICE_UNSUPPORTED_TEXT)
        );
        assert!(!orchestrator.voice().is_recording());
    }

    #[tokio::test]
    async fn attempt_that_ended_on_its_own_is_still_delivered() {
        let h = Harness::with(
            AppConfig::default(),
            MockBackend::default(),
            MockRecognizer::transcript("first words"),
        );
        let orchestrator = h.mounted().await;

        let VoiceToggle::Started(first) = orchestrator.toggle_voice() else {
            panic!("voice should start");
        };
        for _ in 0..100 {
            if !orchestrator.voice().is_active() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!orchestrator.voice().is_active());

        // The next toggle starts a fresh attempt; the ended one still holds
        // its transcript.
        let VoiceToggle::Started(second) = orchestrator.toggle_voice() else {
            panic!("voice should start again");
        };
        assert_eq!(orchestrator.finish_voice(first).await, Some(SendOutcome::Replied));
        assert_eq!(orchestrator.snapshot().log.messages()[1].content, "first words");

        assert_eq!(orchestrator.finish_voice(second).await, Some(SendOutcome::Replied));
        assert_eq!(orchestrator.snapshot().log.len(), 5);
    }

    #[tokio::test]
    async fn transcript_is_sent_like_typed_text() {
        let h = Harness::with(
            AppConfig::default(),
            MockBackend::default(),
            MockRecognizer::transcript("namaste"),
        );
        let orchestrator = h.mounted().await;
        orchestrator.change_language("hi");

        let VoiceToggle::Started(recognition) = orchestrator.toggle_voice() else {
            panic!("voice should start");
        };
        let outcome = orchestrator.finish_voice(recognition).await;

        assert_eq!(outcome, Some(SendOutcome::Replied));
        assert_eq!(h.recognizer.locales(), vec!["hi-IN".to_string()]);
        let state = orchestrator.snapshot();
        assert_eq!(state.log.len(), 3);
        assert_eq!(state.log.messages()[1].content, "namaste");
        assert!(h.backend.sent_messages()[0].ends_with("\n\nnamaste"));
    }

    #[tokio::test]
    async fn failed_voice_send_uses_voice_apology() {
        let h = Harness::with(
            AppConfig::default(),
            MockBackend::replying(vec![Err(SessionError::Status(502))]),
            MockRecognizer::transcript("hello"),
        );
        let orchestrator = h.mounted().await;

        let VoiceToggle::Started(recognition) = orchestrator.toggle_voice() else {
            panic!("voice should start");
        };
        assert_eq!(
            orchestrator.finish_voice(recognition).await,
            Some(SendOutcome::Failed)
        );
        assert_eq!(
            orchestrator.snapshot().log.last().unwrap().content,
            VOICE_APOLOGY_TEXT
        );
    }

    #[tokio::test]
    async fn recognition_error_sets_voice_error_only() {
        let h = Harness::with(
            AppConfig::default(),
            MockBackend::default(),
            MockRecognizer::error(VoiceError::PermissionDenied),
        );
        let orchestrator = h.mounted().await;

        let VoiceToggle::Started(recognition) = orchestrator.toggle_voice() else {
            panic!("voice should start");
        };
        assert_eq!(orchestrator.finish_voice(recognition).await, None);

        let state = orchestrator.snapshot();
        assert_eq!(
            state.voice_error.as_deref(),
            Some(VoiceError::PermissionDenied.to_string().as_str())
        );
        assert!(state.log.is_welcome_only());
        assert!(h.backend.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn toggling_twice_stops_and_delivers() {
        let h = Harness::with(
            AppConfig::default(),
            MockBackend::default(),
            MockRecognizer::until_stopped(Some("stop here")),
        );
        let orchestrator = h.mounted().await;

        let VoiceToggle::Started(recognition) = orchestrator.toggle_voice() else {
            panic!("voice should start");
        };
        for _ in 0..100 {
            if orchestrator.voice().is_recording() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(orchestrator.voice().is_recording());
        assert!(matches!(orchestrator.toggle_voice(), VoiceToggle::Stopped));

        assert_eq!(
            orchestrator.finish_voice(recognition).await,
            Some(SendOutcome::Replied)
        );
        assert_eq!(orchestrator.snapshot().log.messages()[1].content, "stop here");
        assert!(!orchestrator.voice().is_active());
    }

    #[tokio::test]
    async fn starting_voice_clears_previous_error() {
        let h = Harness::with(
            AppConfig::default(),
            MockBackend::default(),
            MockRecognizer::silent(),
        );
        let orchestrator = h.mounted().await;
        orchestrator.state().lock().unwrap().voice_error = Some("old".into());

        let VoiceToggle::Started(recognition) = orchestrator.toggle_voice() else {
            panic!("voice should start");
        };
        assert!(orchestrator.snapshot().voice_error.is_none());

        // Silent attempt ending on its own reports no speech.
        assert_eq!(orchestrator.finish_voice(recognition).await, None);
        assert_eq!(
            orchestrator.snapshot().voice_error.as_deref(),
            Some(VoiceError::NoSpeech.to_string().as_str())
        );
    }
}
