use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_SCOPE_ID_LEN, PDF_MIME_TYPE};
use crate::error::FeedError;

// Opaque string identifiers. The store mints them, everything else only
// compares and forwards them.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $generate:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self($generate().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(ProfileId, Uuid::new_v4);
string_id!(ServerId, Uuid::new_v4);
string_id!(MemberId, Uuid::new_v4);
string_id!(ChannelId, Uuid::new_v4);
string_id!(ConversationId, Uuid::new_v4);
string_id!(
    /// UUIDv7 text: lexical order follows creation order.
    MessageId,
    Uuid::now_v7
);

// ---------------------------------------------------------------------------
// Feed scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Channel,
    Conversation,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Conversation => "conversation",
        }
    }
}

impl FromStr for ScopeKind {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(Self::Channel),
            "conversation" => Ok(Self::Conversation),
            other => Err(FeedError::InvalidScope(format!("unknown scope kind '{other}'"))),
        }
    }
}

/// A channel or direct conversation: the owner of one transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FeedScope {
    pub kind: ScopeKind,
    pub id: String,
}

impl FeedScope {
    pub fn channel(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Channel,
            id: id.into(),
        }
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Conversation,
            id: id.into(),
        }
    }

    /// Build a scope from its textual parts, rejecting malformed input.
    pub fn parse(kind: &str, id: &str) -> Result<Self, FeedError> {
        let scope = Self {
            kind: kind.parse()?,
            id: id.to_string(),
        };
        scope.validate()?;
        Ok(scope)
    }

    /// Ids are non-empty, bounded, and limited to `[A-Za-z0-9_-]`.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.id.is_empty() {
            return Err(FeedError::InvalidScope("empty scope id".into()));
        }
        if self.id.len() > MAX_SCOPE_ID_LEN {
            return Err(FeedError::InvalidScope(format!(
                "scope id longer than {MAX_SCOPE_ID_LEN} bytes"
            )));
        }
        if let Some(c) = self
            .id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(FeedError::InvalidScope(format!(
                "illegal character {c:?} in scope id"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for FeedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

/// Server role, ordered by privilege: `Guest < Moderator < Admin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Guest,
    Moderator,
    Admin,
}

impl Role {
    pub fn at_least(self, required: Role) -> bool {
        self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "GUEST",
            Self::Moderator => "MODERATOR",
            Self::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GUEST" => Ok(Self::Guest),
            "MODERATOR" => Ok(Self::Moderator),
            "ADMIN" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A profile's membership in one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub profile_id: ProfileId,
    pub server_id: ServerId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Total order of a transcript: creation time, ties broken by id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    pub created_at: DateTime<Utc>,
    pub id: MessageId,
}

/// How an attached file is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Pdf,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub scope: FeedScope,
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub author_member_id: MemberId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

impl Message {
    pub fn sort_key(&self) -> SortKey {
        SortKey {
            created_at: self.created_at,
            id: self.id.clone(),
        }
    }

    /// Content changed after creation. Tombstones never report as edited.
    pub fn is_edited(&self) -> bool {
        !self.deleted && self.updated_at != self.created_at
    }

    pub fn attachment(&self) -> Option<AttachmentKind> {
        self.file_url.as_ref()?;
        match self.file_type.as_deref() {
            Some(PDF_MIME_TYPE) => Some(AttachmentKind::Pdf),
            _ => Some(AttachmentKind::Image),
        }
    }

    /// Turn the message into a tombstone. Idempotent; `updated_at` only
    /// moves forward so repeated deletes converge.
    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.deleted = true;
        self.content.clear();
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn message(id: &str) -> Message {
        let at = Utc::now();
        Message {
            id: MessageId::from(id),
            scope: FeedScope::channel("ch1"),
            content: "hello".into(),
            file_url: None,
            file_type: None,
            author_member_id: MemberId::from("author"),
            created_at: at,
            updated_at: at,
            deleted: false,
        }
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Guest < Role::Moderator);
        assert!(Role::Moderator < Role::Admin);
        assert!(Role::Admin.at_least(Role::Moderator));
        assert!(!Role::Guest.at_least(Role::Moderator));
        assert_eq!("MODERATOR".parse::<Role>().unwrap(), Role::Moderator);
    }

    #[test]
    fn test_scope_validation() {
        assert!(FeedScope::parse("channel", "ch-1_a").is_ok());
        assert!(matches!(
            FeedScope::parse("channel", ""),
            Err(FeedError::InvalidScope(_))
        ));
        assert!(matches!(
            FeedScope::parse("channel", "a b"),
            Err(FeedError::InvalidScope(_))
        ));
        assert!(matches!(
            FeedScope::parse("group", "ch1"),
            Err(FeedError::InvalidScope(_))
        ));
        let long = "x".repeat(MAX_SCOPE_ID_LEN + 1);
        assert!(FeedScope::channel(long).validate().is_err());
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(FeedScope::conversation("c9").to_string(), "conversation:c9");
    }

    #[test]
    fn test_message_ids_sort_by_creation() {
        let first = MessageId::new();
        let second = MessageId::new();
        assert!(first < second);
    }

    #[test]
    fn test_tombstone_is_idempotent() {
        let mut m = message("m1");
        let later = m.updated_at + Duration::seconds(5);
        m.tombstone(later);
        m.tombstone(m.created_at);
        assert!(m.deleted);
        assert!(m.content.is_empty());
        assert_eq!(m.updated_at, later);
        assert!(!m.is_edited());
    }

    #[test]
    fn test_attachment_kind() {
        let mut m = message("m1");
        assert_eq!(m.attachment(), None);
        m.file_url = Some("https://files/doc".into());
        m.file_type = Some(PDF_MIME_TYPE.into());
        assert_eq!(m.attachment(), Some(AttachmentKind::Pdf));
        m.file_type = Some("image/png".into());
        assert_eq!(m.attachment(), Some(AttachmentKind::Image));
    }
}
