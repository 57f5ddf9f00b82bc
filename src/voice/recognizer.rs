//! Speech-recognition capability trait.
//!
//! # Overview
//!
//! [`SpeechRecognizer`] is the seam to the platform speech engine.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn SpeechRecognizer>`.  One call to
//! [`recognize`](SpeechRecognizer::recognize) is one single-shot recognition
//! attempt: it resolves with a transcript, an error, or `None` when the
//! attempt was stopped before anything was heard.
//!
//! [`UnsupportedRecognizer`] stands in on platforms with no speech engine.
//!
//! [`MockRecognizer`] (available under `#[cfg(test)]`) returns scripted
//! outcomes for unit tests.

use async_trait::async_trait;
use tokio::sync::watch;

use super::error::VoiceError;

// ---------------------------------------------------------------------------
// StopMode / StopSignal
// ---------------------------------------------------------------------------

/// How the caller wants an in-progress attempt to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Keep listening.
    Running,
    /// Stop listening and deliver whatever was heard.
    Stop,
    /// Stop listening and discard everything.
    Abort,
}

/// Receiving side of a stop request, handed to the recognizer.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<StopMode>,
}

impl StopSignal {
    pub fn new(rx: watch::Receiver<StopMode>) -> Self {
        Self { rx }
    }

    /// Current request without waiting.
    pub fn mode(&self) -> StopMode {
        *self.rx.borrow()
    }

    /// Wait until a stop or abort is requested.
    ///
    /// If the requesting side is dropped this resolves to `Abort`.
    pub async fn requested(&mut self) -> StopMode {
        loop {
            let mode = *self.rx.borrow_and_update();
            if mode != StopMode::Running {
                return mode;
            }
            if self.rx.changed().await.is_err() {
                return StopMode::Abort;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechRecognizer trait
// ---------------------------------------------------------------------------

/// Platform speech-to-text capability.
///
/// # Contract
///
/// - `locale` is a BCP-47 tag such as `"hi-IN"`, fixed for the attempt.
/// - `Ok(Some(text))`: a transcript was produced.
/// - `Ok(None)`: the attempt ended with nothing to report (stopped or
///   aborted via `stop`).
/// - `Err(e)`: the engine failed.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Whether the engine exists on this platform.
    fn is_supported(&self) -> bool;

    /// Run one recognition attempt.
    async fn recognize(&self, locale: &str, stop: StopSignal) -> Result<Option<String>, VoiceError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechRecognizer>) {}
};

// ---------------------------------------------------------------------------
// UnsupportedRecognizer
// ---------------------------------------------------------------------------

/// Recognizer for platforms without speech support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedRecognizer;

#[async_trait]
impl SpeechRecognizer for UnsupportedRecognizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn recognize(&self, _locale: &str, _stop: StopSignal) -> Result<Option<String>, VoiceError> {
        Err(VoiceError::Unsupported)
    }
}

// ---------------------------------------------------------------------------
// MockRecognizer (tests only)
// ---------------------------------------------------------------------------

/// Scripted recognizer for unit tests.
///
/// ```rust,ignore
/// let recognizer = MockRecognizer::transcript("hello");
/// ```
#[cfg(test)]
pub struct MockRecognizer {
    supported: bool,
    behaviour: MockBehaviour,
    locales: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
enum MockBehaviour {
    Reply(Result<Option<String>, VoiceError>),
    /// Wait for a stop request; deliver the transcript on `Stop`.
    UntilStopped(Option<String>),
}

#[cfg(test)]
impl MockRecognizer {
    pub fn transcript(text: impl Into<String>) -> Self {
        Self::with(MockBehaviour::Reply(Ok(Some(text.into()))))
    }

    pub fn error(error: VoiceError) -> Self {
        Self::with(MockBehaviour::Reply(Err(error)))
    }

    pub fn silent() -> Self {
        Self::with(MockBehaviour::Reply(Ok(None)))
    }

    pub fn until_stopped(heard: Option<&str>) -> Self {
        Self::with(MockBehaviour::UntilStopped(heard.map(str::to_string)))
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::silent()
        }
    }

    /// Locales passed to each `recognize` call, in order.
    pub fn locales(&self) -> Vec<String> {
        self.locales.lock().unwrap().clone()
    }

    fn with(behaviour: MockBehaviour) -> Self {
        Self {
            supported: true,
            behaviour,
            locales: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn recognize(&self, locale: &str, mut stop: StopSignal) -> Result<Option<String>, VoiceError> {
        self.locales.lock().unwrap().push(locale.to_string());
        match &self.behaviour {
            MockBehaviour::Reply(result) => result.clone(),
            MockBehaviour::UntilStopped(heard) => match stop.requested().await {
                StopMode::Stop => Ok(heard.clone()),
                _ => Ok(None),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
