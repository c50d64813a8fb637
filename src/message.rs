//! Transcript message model.

use chat_provider::WireRole;
use session_store::{StoredMessage, StoredRole};
use time::OffsetDateTime;
use uuid::Uuid;

/// Transcript role. Distinct from [`WireRole`]: error entries never go on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl Role {
    /// Total mapping onto the wire roles; `Error` has no wire form.
    #[must_use]
    pub fn wire_role(self) -> Option<WireRole> {
        match self {
            Self::User => Some(WireRole::User),
            Self::Assistant => Some(WireRole::Assistant),
            Self::Error => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Error => "error",
        }
    }
}

impl From<StoredRole> for Role {
    fn from(role: StoredRole) -> Self {
        match role {
            StoredRole::User => Self::User,
            StoredRole::Assistant => Self::Assistant,
            StoredRole::Error => Self::Error,
        }
    }
}

impl From<Role> for StoredRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Self::User,
            Role::Assistant => Self::Assistant,
            Role::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Unix milliseconds; display and ordering only.
    pub timestamp: i64,
    pub id: Option<String>,
}

impl Message {
    /// New message stamped with the current time and a fresh id.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: now_millis(),
            id: Some(Uuid::new_v4().to_string()),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Self {
            role: stored.role.into(),
            content: stored.content,
            timestamp: stored.timestamp,
            id: stored.id,
        }
    }
}

impl From<&Message> for StoredMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.into(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            id: message.id.clone(),
        }
    }
}

/// Current wall-clock time in unix milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_role_has_no_wire_form() {
        assert_eq!(Role::User.wire_role(), Some(WireRole::User));
        assert_eq!(Role::Assistant.wire_role(), Some(WireRole::Assistant));
        assert_eq!(Role::Error.wire_role(), None);
    }

    #[test]
    fn new_messages_get_unique_ids_and_current_timestamps() {
        let before = now_millis();
        let first = Message::user("hi");
        let second = Message::user("hi");

        assert_ne!(first.id, second.id);
        assert!(first.timestamp >= before);
        assert!(first.id.as_deref().is_some_and(|id| Uuid::parse_str(id).is_ok()));
    }

    #[test]
    fn stored_conversion_preserves_fields() {
        let message = Message {
            role: Role::Error,
            content: "Error: boom".to_string(),
            timestamp: 1_700_000_000_000,
            id: None,
        };

        let stored = StoredMessage::from(&message);
        assert_eq!(stored.role, StoredRole::Error);
        assert_eq!(Message::from(stored), message);
    }
}
