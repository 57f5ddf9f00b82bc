//! Conversation module: the message log, shared state and the orchestrator
//! that drives a chat session.

pub mod message;
pub mod orchestrator;
pub mod state;

pub use message::{welcome_text, ConversationLog, Message, Role, WELCOME_MESSAGE_ID};
pub use orchestrator::{
    ChatOrchestrator, IgnoreReason, InputSource, SendOutcome, VoiceToggle, APOLOGY_TEXT,
    NO_RESPONSE_TEXT, VOICE_APOLOGY_TEXT, VOICE_UNSUPPORTED_TEXT,
};
pub use state::{new_shared_conversation, ConversationState, SessionPhase, SharedConversation};
