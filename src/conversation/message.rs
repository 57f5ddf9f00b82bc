//! Message and Conversation Log types.
//!
//! A [`Message`] is immutable once created.  [`ConversationLog`] is the
//! append-only, insertion-ordered sequence the orchestrator builds; it hands
//! out the persistable subset (everything except the synthetic welcome) to
//! the History Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id reserved for the synthetic welcome message.
pub const WELCOME_MESSAGE_ID: &str = "welcome";

/// Greeting shown at the top of a fresh conversation.
pub fn welcome_text(agent_name: &str) -> String {
    format!("Hi! I'm {agent_name}. How can I help you today?")
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Who authored a message.
///
/// Agent messages are stored as `"assistant"`; `"agent"` is accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant", alias = "agent")]
    Agent,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message with a fresh UUID v4 id.
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// The synthetic greeting that seeds a fresh conversation.
    pub fn welcome(agent_name: &str) -> Self {
        Self {
            id: WELCOME_MESSAGE_ID.to_string(),
            role: Role::Agent,
            content: welcome_text(agent_name),
            timestamp: Utc::now(),
        }
    }

    pub fn is_welcome(&self) -> bool {
        self.id == WELCOME_MESSAGE_ID
    }
}

// ---------------------------------------------------------------------------
// ConversationLog
// ---------------------------------------------------------------------------

/// Ordered, append-only message sequence for one widget instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log holding only the welcome message.
    pub fn welcome(agent_name: &str) -> Self {
        Self {
            messages: vec![Message::welcome(agent_name)],
        }
    }

    /// Rebuild a log from stored messages, kept in the order given.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Append a new message stamped with the current time.
    ///
    /// The timestamp is clamped to the previous message's so the log stays
    /// non-decreasing even if the wall clock steps backwards.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> &Message {
        let now = Utc::now();
        let timestamp = match self.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.messages.push(Message::new(role, content, timestamp));
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages that belong in the Stored History Record.
    pub fn persistable(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.is_welcome())
            .cloned()
            .collect()
    }

    /// `true` when nothing but the welcome message has been appended.
    pub fn is_welcome_only(&self) -> bool {
        self.messages.iter().all(Message::is_welcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashSet;

    #[test]
    fn welcome_log_has_single_agent_greeting() {
        let log = ConversationLog::welcome("HelperBot");
        assert_eq!(log.len(), 1);
        let msg = &log.messages()[0];
        assert_eq!(msg.role, Role::Agent);
        assert_eq!(msg.content, "Hi! I'm HelperBot. How can I help you today?");
        assert!(msg.is_welcome());
        assert!(log.is_welcome_only());
        assert!(log.persistable().is_empty());
    }

    #[test]
    fn push_appends_in_order_with_unique_ids() {
        let mut log = ConversationLog::welcome("Bot");
        for i in 0..10 {
            log.push(Role::User, format!("q{i}"));
            log.push(Role::Agent, format!("a{i}"));
        }
        assert_eq!(log.len(), 21);
        assert!(!log.is_welcome_only());

        let ids: HashSet<&str> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 21);

        let contents: Vec<&str> = log.messages()[1..5].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["q0", "a0", "q1", "a1"]);
    }

    #[test]
    fn timestamps_never_decrease() {
        let future = Utc::now() + Duration::hours(1);
        let mut log = ConversationLog::from_messages(vec![Message::new(Role::User, "from the future", future)]);

        let pushed = log.push(Role::Agent, "reply").timestamp;

        assert_eq!(pushed, future);
        let stamps: Vec<_> = log.messages().iter().map(|m| m.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn persistable_skips_welcome() {
        let mut log = ConversationLog::welcome("Bot");
        log.push(Role::User, "hello");
        log.push(Role::Agent, "hi");

        let stored = log.persistable();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|m| !m.is_welcome()));
    }

    #[test]
    fn role_serialises_agent_as_assistant() {
        assert_eq!(serde_json::to_string(&Role::Agent).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        let agent: Role = serde_json::from_str("\"agent\"").unwrap();
        assert_eq!(agent, Role::Agent);
    }
}
