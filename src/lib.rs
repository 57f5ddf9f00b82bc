//! Conversation-session core of an embeddable chat widget.
//!
//! Hosts build a [`conversation::ChatOrchestrator`] from an
//! [`config::AppConfig`], a durable [`storage::KeyValueStore`], a
//! [`session::ChatBackend`] and a [`voice::SpeechRecognizer`], then drive it
//! from their UI.

pub mod config;
pub mod conversation;
pub mod language;
pub mod session;
pub mod storage;
pub mod voice;
