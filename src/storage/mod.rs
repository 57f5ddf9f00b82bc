//! Durable local storage.
//!
//! * [`KeyValueStore`]: synchronous get/set/remove contract.
//! * [`FileStore`] / [`MemoryStore`]: the shipped implementations.
//! * [`HistoryStore`] / [`StoredHistory`]: the capped, context-fingerprinted
//!   conversation record.
//! * [`StorageError`]: failures a store can report.

pub mod history;
pub mod store;

pub use history::{HistoryStore, StoredHistory, DEFAULT_MAX_MESSAGES};
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageError};

/// Build the key for `suffix` under `namespace` (`chat-widget-language`).
pub fn storage_key(namespace: &str, suffix: &str) -> String {
    format!("{namespace}-{suffix}")
}
