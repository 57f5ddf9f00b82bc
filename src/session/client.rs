//! Remote Session Client: session identity plus best-effort lifecycle calls.
//!
//! [`SessionClient`] wraps any [`ChatBackend`] and owns the per-browser
//! [`SessionIdentity`].  `init` and `reset` never return an error: failures
//! are logged and swallowed so the widget stays usable while the backend is
//! unreachable.  Only `send` reports failure, and the orchestrator turns that
//! into an apology message.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::Rng;

use super::backend::{validate_request, ChatBackend, SessionError};
use crate::storage::{storage_key, KeyValueStore};

/// Context sent to `init` when the configured one is blank.
pub const DEFAULT_CONTEXT: &str = "You are a helpful assistant.";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

// ---------------------------------------------------------------------------
// SessionIdentity
// ---------------------------------------------------------------------------

/// Opaque per-browser session token, cached in memory and in the store.
///
/// Generated lazily on first use, stable across reloads, replaced only by
/// [`rotate`](SessionIdentity::rotate).
pub struct SessionIdentity {
    store: Arc<dyn KeyValueStore>,
    key: String,
    cached: Mutex<Option<String>>,
}

impl SessionIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        Self {
            store,
            key: storage_key(namespace, "session-id"),
            cached: Mutex::new(None),
        }
    }

    /// `session_{unix millis}_{9 base-36 chars}`.
    pub fn generate() -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        format!("session_{}_{suffix}", Utc::now().timestamp_millis())
    }

    /// The current id, loading or generating it on first call.
    pub fn current(&self) -> String {
        let mut cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let id = match self.store.get(&self.key) {
            Ok(Some(stored)) if !stored.trim().is_empty() => stored,
            Ok(_) => self.generate_and_store(),
            Err(e) => {
                log::warn!("session: failed to read stored session id: {e}");
                self.generate_and_store()
            }
        };

        *cached = Some(id.clone());
        id
    }

    /// Forget the current id so the next [`current`](Self::current) call
    /// generates a new one.  Returns the discarded id.
    pub fn rotate(&self) -> String {
        let old = self.current();
        let mut cached = self.cached.lock().unwrap_or_else(|p| p.into_inner());
        *cached = None;
        if let Err(e) = self.store.remove(&self.key) {
            log::warn!("session: failed to remove stored session id: {e}");
        }
        old
    }

    fn generate_and_store(&self) -> String {
        let id = Self::generate();
        if let Err(e) = self.store.set(&self.key, &id) {
            log::warn!("session: failed to persist session id: {e}");
        }
        log::info!("session: created session id {id}");
        id
    }
}

// ---------------------------------------------------------------------------
// SessionClient
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share the backend and the identity.
#[derive(Clone)]
pub struct SessionClient {
    backend: Arc<dyn ChatBackend>,
    identity: Arc<SessionIdentity>,
}

impl SessionClient {
    pub fn new(backend: Arc<dyn ChatBackend>, identity: Arc<SessionIdentity>) -> Self {
        Self { backend, identity }
    }

    pub fn session_id(&self) -> String {
        self.identity.current()
    }

    /// Prime the remote session.  Never fails.
    pub async fn init(&self, context: &str) {
        let session_id = self.session_id();
        let context = if context.trim().is_empty() {
            DEFAULT_CONTEXT
        } else {
            context
        };

        match self.backend.init(&session_id, context).await {
            Ok(ack) => log::info!(
                "session: initialised {session_id} (success={})",
                ack.success
            ),
            Err(e) => log::warn!("session: init failed for {session_id}: {e}"),
        }
    }

    /// Send `message` on the current session and return the reply text.
    pub async fn send(&self, message: &str, context: &str) -> Result<String, SessionError> {
        let session_id = self.session_id();
        validate_request(&session_id, Some(message))?;

        log::debug!("session: sending {} bytes on {session_id}", message.len());
        self.backend.send(&session_id, message, context).await
    }

    /// Discard the local identity and return it.  The next call that needs
    /// an id gets a fresh one.
    pub fn rotate(&self) -> String {
        self.identity.rotate()
    }

    /// Drop the remote memory of `session_id`.  Never fails.
    pub async fn reset_remote(&self, session_id: &str) {
        match self.backend.reset(session_id).await {
            Ok(_) => log::info!("session: reset {session_id}"),
            Err(e) => log::warn!("session: reset failed for {session_id}: {e}"),
        }
    }

    /// Rotate the local identity, then reset the old remote session.
    /// Never fails.
    pub async fn reset(&self) {
        let old = self.rotate();
        self.reset_remote(&old).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
