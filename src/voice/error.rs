//! Voice failure taxonomy.
//!
//! The `Display` text of each variant is the message shown to the user; it is
//! never written into the conversation.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("Microphone access denied. Please allow microphone access and try again.")]
    PermissionDenied,

    #[error("No speech detected. Please try speaking clearly.")]
    NoSpeech,

    #[error("No microphone found. Please check your microphone connection.")]
    NoMicrophone,

    #[error("Network error occurred during voice recognition.")]
    Network,

    #[error("Speech recognition is not supported in this environment")]
    Unsupported,

    #[error("Voice recognition error: {0}")]
    Other(String),
}

impl VoiceError {
    /// Map a speech-engine error code (`not-allowed`, `no-speech`, ...) onto
    /// the taxonomy.
    ///
    /// ```
    /// use chat_widget::voice::VoiceError;
    ///
    /// assert_eq!(VoiceError::from_code("not-allowed"), VoiceError::PermissionDenied);
    /// assert_eq!(VoiceError::from_code("aborted"), VoiceError::Other("aborted".into()));
    /// ```
    pub fn from_code(code: &str) -> Self {
        match code {
            "not-allowed" | "service-not-allowed" => VoiceError::PermissionDenied,
            "no-speech" => VoiceError::NoSpeech,
            "audio-capture" => VoiceError::NoMicrophone,
            "network" => VoiceError::Network,
            "unsupported" | "language-not-supported" => VoiceError::Unsupported,
            other => VoiceError::Other(other.to_string()),
        }
    }
}
