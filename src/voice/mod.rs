//! Voice input module.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     VoiceInput                       │
//! │   capability { supported, recording, locale }        │
//! │                                                      │
//! │   start() ──spawn──▶ SpeechRecognizer::recognize()   │
//! │      │                        ▲                      │
//! │      ▼                        │ StopSignal           │
//! │   Recognition ── events ──▶ Started / Transcript /   │
//! │      │                      Failed / Ended           │
//! │      └── StopHandle ── stop() / abort() ─────────────┘
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod input;
pub mod recognizer;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use error::VoiceError;
pub use input::{
    Recognition, RecognitionOutcome, StopHandle, VoiceCapability, VoiceEvent, VoiceInput,
};
pub use recognizer::{SpeechRecognizer, StopMode, StopSignal, UnsupportedRecognizer};

// test-only re-export so the orchestrator tests can build a scripted
// recognizer without reaching into `voice::recognizer`.
#[cfg(test)]
pub use recognizer::MockRecognizer;
