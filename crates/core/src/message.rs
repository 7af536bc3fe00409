//! Message and Turn domain types.
//!
//! A `ChatMessage` is one durably persisted turn of a conversation between a
//! user and a companion. A `Turn` is the lightweight (role, text) pair that
//! flows through session memory and prompt assembly without carrying
//! persistence identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI companion
    Assistant,
}

impl Role {
    /// The database / wire token for this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a role token. Unknown tokens are rejected — roles are a closed set.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted turn of a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: Uuid,

    /// The companion this exchange belongs to
    pub companion_id: Uuid,

    /// The user on the other side of the exchange
    pub user_id: Uuid,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Creation timestamp — the ordering key for history replay
    pub created_at: DateTime<Utc>,
}

/// Input for persisting a new message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub companion_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub content: String,
}

impl NewMessage {
    /// A new user-authored turn.
    pub fn user(companion_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            companion_id,
            user_id,
            role: Role::User,
            content: content.into(),
        }
    }

    /// A new companion-authored turn.
    pub fn assistant(companion_id: Uuid, user_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            companion_id,
            user_id,
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordering for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrder {
    /// Ascending creation time — history replay.
    OldestFirst,
    /// Descending creation time — latest-first pagination.
    NewestFirst,
}

/// A (role, text) pair without persistence identifiers.
///
/// This is what session memory stores and what the prompt composer consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for Turn {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_token() {
        assert_eq!(Role::parse(Role::User.as_str()), Some(Role::User));
        assert_eq!(Role::parse(Role::Assistant.as_str()), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, r#""assistant""#);
    }

    #[test]
    fn new_message_helpers_set_role() {
        let companion = Uuid::new_v4();
        let user = Uuid::new_v4();
        assert_eq!(NewMessage::user(companion, user, "hi").role, Role::User);
        assert_eq!(
            NewMessage::assistant(companion, user, "hello").role,
            Role::Assistant
        );
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::user("How are you?");
        let json = serde_json::to_string(&turn).unwrap();
        let back: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }
}
