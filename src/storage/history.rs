//! History Store: durable, capped log of the conversation.
//!
//! The record is written as JSON under `{namespace}-chat-history`:
//!
//! ```text
//! {
//!   "messages":    [{ "id", "role", "content", "timestamp" }, ...],
//!   "lastUpdated": "2026-10-16T09:30:00Z",
//!   "context":     "You are a helpful assistant"
//! }
//! ```
//!
//! `context` fingerprints the persona in effect when the log was written;
//! [`HistoryStore::load_valid`] treats a mismatch as "no history".  None of
//! the operations return errors: storage failures are logged and the caller
//! carries on in memory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{storage_key, KeyValueStore};
use crate::conversation::Message;

/// Stored-message cap used when none is configured.
pub const DEFAULT_MAX_MESSAGES: usize = 50;

// ---------------------------------------------------------------------------
// StoredHistory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredHistory {
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
    pub context: String,
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_messages: usize,
}

impl HistoryStore {
    /// `max_messages` of zero is bumped to one; an empty cap would make
    /// every save a silent clear.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: &str, max_messages: usize) -> Self {
        Self {
            store,
            key: storage_key(namespace, "chat-history"),
            max_messages: max_messages.max(1),
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Persist the most recent `max_messages` of `messages` with `context`.
    pub fn save(&self, messages: &[Message], context: &str) {
        let start = messages.len().saturating_sub(self.max_messages);
        let record = StoredHistory {
            messages: messages[start..].to_vec(),
            last_updated: Utc::now(),
            context: context.to_string(),
        };

        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("history: failed to serialise record: {e}");
                return;
            }
        };

        match self.store.set(&self.key, &json) {
            Ok(()) => log::debug!("history: saved {} messages", record.messages.len()),
            Err(e) => log::warn!("history: failed to save chat history: {e}"),
        }
    }

    /// Read the stored record.  Missing, unreadable or malformed records all
    /// come back as `None`.
    pub fn load(&self) -> Option<StoredHistory> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("history: failed to load chat history: {e}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("history: discarding malformed record: {e}");
                None
            }
        }
    }

    /// Load the record only if it is non-empty and was saved under `context`.
    pub fn load_valid(&self, context: &str) -> Option<StoredHistory> {
        let record = self.load()?;
        if record.messages.is_empty() {
            return None;
        }
        if record.context != context {
            log::info!("history: stored context differs from current; starting fresh");
            return None;
        }
        Some(record)
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            log::warn!("history: failed to clear chat history: {e}");
        }
    }

    /// `true` when a record key exists, valid or not.
    pub fn has_history(&self) -> bool {
        matches!(self.store.get(&self.key), Ok(Some(_)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
