//! Voice Input Adapter.
//!
//! [`VoiceInput`] wraps a [`SpeechRecognizer`] and tracks the transient
//! [`VoiceCapability`] state.  Each [`start`](VoiceInput::start) spawns one
//! recognition attempt on the tokio runtime and returns a [`Recognition`]
//! handle carrying the lifecycle events:
//!
//! ```text
//! Started ──▶ Transcript(text) ──▶ Ended
//!         ──▶ Failed(error)    ──▶ Ended
//!         ──▶ (stop/abort, nothing heard) ──▶ Ended
//! ```
//!
//! At most one of `Transcript` / `Failed` is emitted per attempt and `Ended`
//! is always last.  An attempt stopped before it begins listening emits only
//! `Ended`.  Only one attempt may be in flight; the locale is read when
//! an attempt starts, so [`set_locale`](VoiceInput::set_locale) affects the
//! next attempt only.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};

use super::error::VoiceError;
use super::recognizer::{SpeechRecognizer, StopMode, StopSignal};

// ---------------------------------------------------------------------------
// VoiceCapability
// ---------------------------------------------------------------------------

/// Transient voice state; re-derived every time the widget starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceCapability {
    pub supported: bool,
    pub recording: bool,
    pub locale: String,
}

// ---------------------------------------------------------------------------
// Events and outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Started,
    Transcript(String),
    Failed(VoiceError),
    Ended,
}

/// Final result of one recognition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    Transcript(String),
    Failed(VoiceError),
    /// Stopped or aborted with nothing to deliver.
    Cancelled,
}

// ---------------------------------------------------------------------------
// StopHandle
// ---------------------------------------------------------------------------

/// Cancels the attempt it was issued for.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<StopMode>>,
}

impl StopHandle {
    fn new() -> (Self, StopSignal) {
        let (tx, rx) = watch::channel(StopMode::Running);
        (Self { tx: Arc::new(tx) }, StopSignal::new(rx))
    }

    /// Stop listening; a transcript already heard is still delivered.
    pub fn stop(&self) {
        self.request(StopMode::Stop);
    }

    /// Stop listening and discard any transcript.
    pub fn abort(&self) {
        self.request(StopMode::Abort);
    }

    fn request(&self, mode: StopMode) {
        // Abort may upgrade a pending Stop; nothing downgrades an Abort.
        self.tx.send_if_modified(|current| match (*current, mode) {
            (StopMode::Running, _) | (StopMode::Stop, StopMode::Abort) => {
                *current = mode;
                true
            }
            _ => false,
        });
    }
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

/// Handle to one in-flight attempt.
#[derive(Debug)]
pub struct Recognition {
    events: mpsc::UnboundedReceiver<VoiceEvent>,
    stop: StopHandle,
}

impl Recognition {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Next lifecycle event; `None` after `Ended` has been received.
    pub async fn next_event(&mut self) -> Option<VoiceEvent> {
        self.events.recv().await
    }

    /// Drain the events and collapse them into the final outcome.
    pub async fn outcome(mut self) -> RecognitionOutcome {
        let mut outcome = RecognitionOutcome::Cancelled;
        while let Some(event) = self.events.recv().await {
            match event {
                VoiceEvent::Started => {}
                VoiceEvent::Transcript(text) => outcome = RecognitionOutcome::Transcript(text),
                VoiceEvent::Failed(error) => outcome = RecognitionOutcome::Failed(error),
                VoiceEvent::Ended => break,
            }
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// VoiceInput
// ---------------------------------------------------------------------------

pub struct VoiceInput {
    recognizer: Arc<dyn SpeechRecognizer>,
    state: Arc<Mutex<VoiceCapability>>,
    active: Arc<Mutex<Option<StopHandle>>>,
}

impl VoiceInput {
    /// Probe `recognizer` for support and start with `locale`.
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, locale: &str) -> Self {
        let supported = recognizer.is_supported();
        if !supported {
            log::info!("voice: speech recognition not supported on this platform");
        }
        Self {
            recognizer,
            state: Arc::new(Mutex::new(VoiceCapability {
                supported,
                recording: false,
                locale: locale.to_string(),
            })),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_supported(&self) -> bool {
        lock(&self.state).supported
    }

    /// `true` between the `Started` event and stop/end/error.
    pub fn is_recording(&self) -> bool {
        lock(&self.state).recording
    }

    /// `true` from `start` until the attempt's `Ended` event.
    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn capability(&self) -> VoiceCapability {
        lock(&self.state).clone()
    }

    pub fn locale(&self) -> String {
        lock(&self.state).locale.clone()
    }

    /// Locale for the next attempt; an attempt in progress keeps its own.
    pub fn set_locale(&self, locale: &str) {
        log::debug!("voice: recognition locale set to {locale}");
        lock(&self.state).locale = locale.to_string();
    }

    /// Begin a recognition attempt.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`VoiceError::Unsupported`]: no speech engine.
    /// - [`VoiceError::Other`] (`"already-recording"`): an attempt is
    ///   already in flight; it is left untouched.
    pub fn start(&self) -> Result<Recognition, VoiceError> {
        let locale = {
            let state = lock(&self.state);
            if !state.supported {
                return Err(VoiceError::Unsupported);
            }
            state.locale.clone()
        };

        let mut active = lock(&self.active);
        if active.is_some() {
            log::debug!("voice: start ignored, recognition already in flight");
            return Err(VoiceError::Other("already-recording".into()));
        }

        let (stop, signal) = StopHandle::new();
        *active = Some(stop.clone());
        drop(active);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_attempt(
            Arc::clone(&self.recognizer),
            locale,
            signal,
            Arc::clone(&self.state),
            Arc::clone(&self.active),
            events_tx,
        ));

        Ok(Recognition {
            events: events_rx,
            stop,
        })
    }

    /// Stop the current attempt, keeping what was heard.
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.active).as_ref() {
            handle.stop();
        }
        lock(&self.state).recording = false;
    }

    /// Abort the current attempt, discarding what was heard.
    pub fn abort(&self) {
        if let Some(handle) = lock(&self.active).as_ref() {
            handle.abort();
        }
        lock(&self.state).recording = false;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drive one attempt and publish its lifecycle events.
async fn run_attempt(
    recognizer: Arc<dyn SpeechRecognizer>,
    locale: String,
    signal: StopSignal,
    state: Arc<Mutex<VoiceCapability>>,
    active: Arc<Mutex<Option<StopHandle>>>,
    events: mpsc::UnboundedSender<VoiceEvent>,
) {
    if signal.mode() != StopMode::Running {
        log::debug!("voice: recognition stopped before it started");
        *lock(&active) = None;
        let _ = events.send(VoiceEvent::Ended);
        return;
    }

    lock(&state).recording = true;
    let _ = events.send(VoiceEvent::Started);
    log::debug!("voice: recognition started ({locale})");

    let result = recognizer.recognize(&locale, signal.clone()).await;
    let mode = signal.mode();

    lock(&state).recording = false;

    let event = match (result, mode) {
        (_, StopMode::Abort) => {
            log::debug!("voice: recognition aborted");
            None
        }
        (Ok(Some(text)), _) if !text.trim().is_empty() => Some(VoiceEvent::Transcript(text)),
        (Ok(_), StopMode::Stop) => None,
        // Ended on its own without hearing anything.
        (Ok(_), _) => Some(VoiceEvent::Failed(VoiceError::NoSpeech)),
        (Err(e), _) => {
            log::warn!("voice: recognition failed: {e}");
            Some(VoiceEvent::Failed(e))
        }
    };
    if let Some(event) = event {
        let _ = events.send(event);
    }

    // Clear before Ended so a consumer reacting to Ended can start again.
    *lock(&active) = None;
    let _ = events.send(VoiceEvent::Ended);
    log::debug!("voice: recognition ended");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
