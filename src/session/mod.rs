//! Remote session module.
//!
//! This module provides:
//! * [`ChatBackend`]: async trait for the init/send/reset service.
//! * [`HttpBackend`]: HTTP/JSON implementation against `/chat/*` routes.
//! * [`SessionIdentity`]: per-browser session token in durable storage.
//! * [`SessionClient`]: identity + backend, with best-effort init/reset.
//! * [`SessionError`]: error variants for backend calls.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chat_widget::config::AppConfig;
//! use chat_widget::session::{HttpBackend, SessionClient, SessionIdentity};
//! use chat_widget::storage::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let identity = Arc::new(SessionIdentity::new(Arc::new(MemoryStore::new()), "chat-widget"));
//!     let client = SessionClient::new(
//!         Arc::new(HttpBackend::from_config(&config.backend)),
//!         identity,
//!     );
//!
//!     client.init(&config.widget.context).await;
//!     match client.send("Hello", &config.widget.context).await {
//!         Ok(reply) => println!("{reply}"),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

pub mod backend;
pub mod client;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use backend::{validate_request, Ack, ChatBackend, HttpBackend, SessionError};
pub use client::{SessionClient, SessionIdentity, DEFAULT_CONTEXT};
