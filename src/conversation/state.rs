//! Session phase and shared conversation state.
//!
//! [`SessionPhase`] drives the orchestrator's state machine.  Hosts read it
//! via [`SharedConversation`] to decide which controls to enable.
//!
//! [`ConversationState`] is the single source of truth for everything a host
//! renders: the Conversation Log, input buffer, loading and context-memory
//! flags, current language and any voice error.
//!
//! [`SharedConversation`] is a type alias for `Arc<Mutex<ConversationState>>`,
//! cheap to clone and safe to share across tasks.

use std::sync::{Arc, Mutex};

use super::message::ConversationLog;

// ---------------------------------------------------------------------------
// SessionPhase
// ---------------------------------------------------------------------------

/// States of the conversation session.
///
/// ```text
/// Uninitialized ──mount──▶ Idle
///          Idle ──send───▶ AwaitingResponse ──reply / failure──▶ Idle
///          Idle ──clear memory──▶ Idle (fresh welcome log)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Constructed but not mounted; sends are ignored.
    #[default]
    Uninitialized,

    /// Ready for input.
    Idle,

    /// One message is in flight; further sends are rejected.
    AwaitingResponse,
}

impl SessionPhase {
    /// Returns `true` while a remote call is outstanding.
    ///
    /// ```
    /// use chat_widget::conversation::SessionPhase;
    ///
    /// assert!(!SessionPhase::Uninitialized.is_busy());
    /// assert!(!SessionPhase::Idle.is_busy());
    /// assert!(SessionPhase::AwaitingResponse.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionPhase::AwaitingResponse)
    }

    /// A short human-readable label for status displays.
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Uninitialized => "Starting",
            SessionPhase::Idle => "Ready",
            SessionPhase::AwaitingResponse => "Thinking",
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

/// Shared conversation state, the single source of truth for hosts.
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// Current phase of the session.
    pub phase: SessionPhase,

    /// The active Conversation Log.
    pub log: ConversationLog,

    /// Text typed but not yet submitted.
    pub input: String,

    /// `true` while a reply is pending.
    pub loading: bool,

    /// `true` when the conversation was restored from storage or has been
    /// saved since.
    pub context_memory: bool,

    /// Code of the selected language.
    pub language: String,

    /// User-facing voice failure, shown until dismissed or the next attempt.
    pub voice_error: Option<String>,

    /// Bumped whenever the conversation is reset; replies that started under
    /// an older generation are dropped.
    pub generation: u64,
}

impl ConversationState {
    pub fn new(language: &str) -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            log: ConversationLog::new(),
            input: String::new(),
            loading: false,
            context_memory: false,
            language: language.to_string(),
            voice_error: None,
            generation: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// SharedConversation
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`ConversationState`].
///
/// Lock for a short critical section; do **not** hold the lock across
/// `.await` points.
pub type SharedConversation = Arc<Mutex<ConversationState>>;

pub fn new_shared_conversation(language: &str) -> SharedConversation {
    Arc::new(Mutex::new(ConversationState::new(language)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
