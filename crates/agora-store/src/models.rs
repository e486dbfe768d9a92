//! Records persisted alongside messages.
//!
//! [`Member`] and [`Message`] live in `agora-shared` because the feed and
//! the permission rules need them too; they are re-exported here.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use agora_shared::{
    ChannelId, ConversationId, Member, MemberId, Message, MessageId, ProfileId, Role, ServerId,
};

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// An identity as seen by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A server groups channels and members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub image_url: Option<String>,
    /// Shared with people who should be able to join.
    pub invite_code: String,
    /// Profile that created the server.
    pub owner_profile_id: ProfileId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelKind {
    #[default]
    Text,
    Audio,
    Video,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Audio => "AUDIO",
            Self::Video => "VIDEO",
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(Self::Text),
            "AUDIO" => Ok(Self::Audio),
            "VIDEO" => Ok(Self::Video),
            other => Err(format!("unknown channel kind '{other}'")),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub server_id: ServerId,
    /// Profile that created the channel.
    pub creator_profile_id: ProfileId,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A direct conversation between two members of the same server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub member_one_id: MemberId,
    pub member_two_id: MemberId,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn includes(&self, member: &MemberId) -> bool {
        &self.member_one_id == member || &self.member_two_id == member
    }
}
