use serde::{Deserialize, Serialize};

use crate::constants::{EVENT_MESSAGE_CREATED, EVENT_MESSAGE_DELETED, EVENT_MESSAGE_UPDATED};
use crate::types::{FeedScope, Message, MessageId};

/// One batch of history returned by the message store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Newest first.
    pub items: Vec<Message>,
    /// Id of the oldest item; the exclusive bound for the next older page.
    pub next_cursor: Option<MessageId>,
    /// Whether an older page may still exist.
    pub has_more: bool,
}

impl Page {
    /// Build a page from newest-first items, deriving the cursor.
    pub fn from_items(items: Vec<Message>, has_more: bool) -> Self {
        let next_cursor = items.last().map(|m| m.id.clone());
        Self {
            items,
            next_cursor,
            has_more,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Live events pushed for a feed scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "kebab-case")]
pub enum FeedEvent {
    MessageCreated(Message),
    MessageUpdated(Message),
    MessageDeleted(Message),
}

impl FeedEvent {
    pub fn message(&self) -> &Message {
        match self {
            Self::MessageCreated(m) | Self::MessageUpdated(m) | Self::MessageDeleted(m) => m,
        }
    }

    pub fn scope(&self) -> &FeedScope {
        &self.message().scope
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => EVENT_MESSAGE_CREATED,
            Self::MessageUpdated(_) => EVENT_MESSAGE_UPDATED,
            Self::MessageDeleted(_) => EVENT_MESSAGE_DELETED,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
