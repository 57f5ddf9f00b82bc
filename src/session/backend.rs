//! Core `ChatBackend` trait and `HttpBackend` implementation.
//!
//! `HttpBackend` speaks the widget backend's JSON protocol:
//!
//! | Route                | Body                              | Reply                              |
//! |----------------------|-----------------------------------|------------------------------------|
//! | `POST /chat/init`    | `{sessionId, context}`            | `{success, message, sessionId}`    |
//! | `POST /chat/message` | `{sessionId, message, context}`   | `{success, response, sessionId}`   |
//! | `POST /chat/reset`   | `{sessionId}`                     | `{success, message, sessionId}`    |
//!
//! Any non-2xx status is a failure.  All connection details come from
//! [`BackendConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BackendConfig;

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors that can occur talking to the chat backend.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request was rejected client-side before any network call.
    #[error("invalid request: {0}")]
    Validation(String),

    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("backend request timed out")]
    Timeout,

    /// The backend answered with a non-success status.
    #[error("HTTP error! status: {0}")]
    Status(u16),

    /// The response body was not the expected JSON.
    #[error("failed to parse backend response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SessionError::Timeout
        } else {
            SessionError::Request(e.to_string())
        }
    }
}

/// Reject requests with a blank session id or message.
pub fn validate_request(session_id: &str, message: Option<&str>) -> Result<(), SessionError> {
    if session_id.trim().is_empty() {
        return Err(SessionError::Validation("session id is required".into()));
    }
    if message.is_some_and(|m| m.trim().is_empty()) {
        return Err(SessionError::Validation("message is required".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Acknowledgement returned by `init` and `reset`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ack {
    pub success: bool,
    pub message: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitRequest<'a> {
    session_id: &'a str,
    context: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest<'a> {
    session_id: &'a str,
    message: &'a str,
    context: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequest<'a> {
    session_id: &'a str,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct MessageResponse {
    response: Option<String>,
}

// ---------------------------------------------------------------------------
// ChatBackend trait
// ---------------------------------------------------------------------------

/// Request/response service holding session-keyed conversation memory.
///
/// Implementors must be `Send + Sync` so they can be shared behind
/// `Arc<dyn ChatBackend>`.  `init` is expected to be idempotent for a given
/// session id.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Prime the remote session `session_id` with `context`.
    async fn init(&self, session_id: &str, context: &str) -> Result<Ack, SessionError>;

    /// Send `message` and return the reply text (possibly empty).
    async fn send(
        &self,
        session_id: &str,
        message: &str,
        context: &str,
    ) -> Result<String, SessionError>;

    /// Drop the remote memory for `session_id`.
    async fn reset(&self, session_id: &str) -> Result<Ack, SessionError>;
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// Talks to the widget backend over HTTP/JSON.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build an `HttpBackend` from config.
    ///
    /// The HTTP client carries the per-request timeout from
    /// `config.timeout_secs`.  A default client is used if the builder fails.
    pub fn from_config(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<reqwest::Response, SessionError> {
        let url = format!("{}{route}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Status(status.as_u16()));
        }
        Ok(response)
    }

    async fn ack(response: reqwest::Response) -> Result<Ack, SessionError> {
        response
            .json::<Ack>()
            .await
            .map_err(|e| SessionError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn init(&self, session_id: &str, context: &str) -> Result<Ack, SessionError> {
        validate_request(session_id, None)?;
        let response = self
            .post("/chat/init", &InitRequest { session_id, context })
            .await?;
        Self::ack(response).await
    }

    async fn send(
        &self,
        session_id: &str,
        message: &str,
        context: &str,
    ) -> Result<String, SessionError> {
        validate_request(session_id, Some(message))?;
        let response = self
            .post(
                "/chat/message",
                &MessageRequest {
                    session_id,
                    message,
                    context,
                },
            )
            .await?;

        let body: MessageResponse = response
            .json()
            .await
            .map_err(|e| SessionError::Parse(e.to_string()))?;

        Ok(body.response.unwrap_or_default())
    }

    async fn reset(&self, session_id: &str) -> Result<Ack, SessionError> {
        validate_request(session_id, None)?;
        let response = self
            .post("/chat/reset", &ResetRequest { session_id })
            .await?;
        Self::ack(response).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_trims_trailing_slash() {
        let backend = HttpBackend::from_config(&BackendConfig {
            base_url: "http://localhost:3001/api/".into(),
            timeout_secs: 5,
        });
        assert_eq!(backend.base_url(), "http://localhost:3001/api");
    }

    #[test]
    fn backend_is_object_safe() {
        let backend: Box<dyn ChatBackend> =
            Box::new(HttpBackend::from_config(&BackendConfig::default()));
        drop(backend);
    }

    #[test]
    fn validation_rejects_blank_inputs() {
        assert!(matches!(
            validate_request("", Some("hi")),
            Err(SessionError::Validation(_))
        ));
        assert!(matches!(
            validate_request("session_1", Some("  \n")),
            Err(SessionError::Validation(_))
        ));
        assert!(validate_request("session_1", None).is_ok());
        assert!(validate_request("session_1", Some("hi")).is_ok());
    }

    /// Validation must fail before touching the network; an unroutable
    /// base URL would otherwise produce a `Request` error.
    #[tokio::test]
    async fn send_with_empty_message_never_hits_network() {
        let backend = HttpBackend::from_config(&BackendConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
        });
        let err = backend.send("session_1", "", "ctx").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }

    #[test]
    fn status_error_display_includes_code() {
        assert_eq!(SessionError::Status(500).to_string(), "HTTP error! status: 500");
    }

    #[test]
    fn ack_tolerates_missing_fields() {
        let ack: Ack = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(ack.success);
        assert!(ack.session_id.is_none());
    }
}
