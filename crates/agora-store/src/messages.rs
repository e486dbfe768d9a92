//! Message history and message writes.
//!
//! History is read newest-first in pages bounded by an exclusive `before`
//! cursor (a message id). Ordering is `(created_at, id)` descending, the
//! reverse of transcript order. Deletes are soft: the row stays as a
//! tombstone with empty content.

use rusqlite::params;

use agora_shared::constants::{MAX_CONTENT_LEN, MAX_PAGE_SIZE};
use agora_shared::{permissions, FeedError, FeedScope, Page, ScopeKind};

use crate::database::{self, Database};
use crate::error::{Result, StoreError};
use crate::models::{ChannelId, ConversationId, Member, MemberId, Message, MessageId};

const MESSAGE_COLUMNS: &str =
    "id, scope_kind, scope_id, content, file_url, file_type, member_id, created_at, updated_at, deleted";

/// A file already uploaded to the file host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub file_url: String,
    pub file_type: String,
}

/// Result of an update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// The row changed; the caller should announce it.
    Applied(Message),
    /// The message was already a tombstone. Idempotent success.
    Unchanged(Message),
}

impl Mutation {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn message(&self) -> &Message {
        match self {
            Self::Applied(m) | Self::Unchanged(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            Self::Applied(m) | Self::Unchanged(m) => m,
        }
    }
}

impl Database {
    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// Check that `scope` is well formed and names an existing channel or
    /// conversation.
    pub fn ensure_scope(&self, scope: &FeedScope) -> Result<()> {
        scope.validate().map_err(invalid_scope)?;
        match scope.kind {
            ScopeKind::Channel => self.get_channel(&ChannelId(scope.id.clone())).map(|_| ()),
            ScopeKind::Conversation => self
                .get_conversation(&ConversationId(scope.id.clone()))
                .map(|_| ()),
        }
    }

    /// Whether `member` may read and post in `scope`.
    pub fn check_access(&self, scope: &FeedScope, member: &Member) -> Result<()> {
        scope.validate().map_err(invalid_scope)?;
        let allowed = match scope.kind {
            ScopeKind::Channel => {
                self.get_channel(&ChannelId(scope.id.clone()))?.server_id == member.server_id
            }
            ScopeKind::Conversation => self
                .get_conversation(&ConversationId(scope.id.clone()))?
                .includes(&member.id),
        };

        if allowed {
            Ok(())
        } else {
            Err(StoreError::Forbidden(format!(
                "member {} has no access to {scope}",
                member.id
            )))
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// One page of history, newest first, strictly older than `before`.
    ///
    /// Reads one row past `limit` to decide `has_more` without a count.
    pub fn list_messages(
        &self,
        scope: &FeedScope,
        before: Option<&MessageId>,
        limit: u32,
    ) -> Result<Page> {
        self.ensure_scope(scope)?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let cursor_ts: Option<String> = match before {
            Some(id) => Some(
                self.conn()
                    .query_row(
                        "SELECT created_at FROM messages
                         WHERE id = ?1 AND scope_kind = ?2 AND scope_id = ?3",
                        params![id.as_str(), scope.kind.as_str(), scope.id],
                        |row| row.get(0),
                    )
                    .map_err(database::not_found)?,
            ),
            None => None,
        };

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE scope_kind = ?1 AND scope_id = ?2
               AND (?3 IS NULL OR created_at < ?3 OR (created_at = ?3 AND id < ?4))
             ORDER BY created_at DESC, id DESC
             LIMIT ?5"
        );
        let mut stmt = self.conn().prepare(&sql)?;

        let rows = stmt.query_map(
            params![
                scope.kind.as_str(),
                scope.id,
                cursor_ts,
                before.map(|id| id.as_str()),
                i64::from(limit) + 1,
            ],
            row_to_message,
        )?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }

        let has_more = items.len() > limit as usize;
        items.truncate(limit as usize);

        tracing::trace!(scope = %scope, returned = items.len(), has_more, "listed messages");
        Ok(Page::from_items(items, has_more))
    }

    pub fn get_message(&self, id: &MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.as_str()],
                row_to_message,
            )
            .map_err(database::not_found)
    }

    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Post a message. An attachment message with no text uses the file
    /// URL as its content.
    pub fn create_message(
        &self,
        author: &Member,
        scope: &FeedScope,
        content: &str,
        attachment: Option<NewAttachment>,
    ) -> Result<Message> {
        self.check_access(scope, author)?;

        let content = match (&attachment, content.trim()) {
            (Some(file), "") => file.file_url.clone(),
            (None, "") => return Err(StoreError::Invalid("message content is required".into())),
            (_, text) => text.to_string(),
        };
        check_length(&content)?;

        let now = database::now();
        let (file_url, file_type) = match attachment {
            Some(file) => (Some(file.file_url), Some(file.file_type)),
            None => (None, None),
        };
        let message = Message {
            id: MessageId::new(),
            scope: scope.clone(),
            content,
            file_url,
            file_type,
            author_member_id: author.id.clone(),
            created_at: now,
            updated_at: now,
            deleted: false,
        };

        self.conn().execute(
            &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                message.id.as_str(),
                message.scope.kind.as_str(),
                message.scope.id,
                message.content,
                message.file_url,
                message.file_type,
                message.author_member_id.as_str(),
                database::encode_ts(&message.created_at),
                database::encode_ts(&message.updated_at),
                message.deleted,
            ],
        )?;

        tracing::debug!(msg_id = %message.id, scope = %scope, "message created");
        Ok(message)
    }

    /// Replace a message's content. Author only, text messages only.
    pub fn update_message(&self, actor: &Member, id: &MessageId, content: &str) -> Result<Mutation> {
        let mut message = self.get_message(id)?;
        self.check_access(&message.scope, actor)?;

        if message.deleted {
            tracing::debug!(msg_id = %id, "{}", FeedError::StaleWrite(id.clone()));
            return Ok(Mutation::Unchanged(message));
        }
        if !permissions::can_edit(actor, &message) {
            return Err(StoreError::Forbidden(format!(
                "member {} may not edit message {id}",
                actor.id
            )));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::Invalid("message content is required".into()));
        }
        check_length(content)?;

        message.content = content.to_string();
        message.updated_at = database::now_after(&message.updated_at);

        self.conn().execute(
            "UPDATE messages SET content = ?1, updated_at = ?2 WHERE id = ?3",
            params![
                message.content,
                database::encode_ts(&message.updated_at),
                id.as_str()
            ],
        )?;

        tracing::debug!(msg_id = %id, "message updated");
        Ok(Mutation::Applied(message))
    }

    /// Turn a message into a tombstone. The author or any moderator/admin.
    pub fn soft_delete_message(&self, actor: &Member, id: &MessageId) -> Result<Mutation> {
        let mut message = self.get_message(id)?;
        self.check_access(&message.scope, actor)?;

        if message.deleted {
            tracing::debug!(msg_id = %id, "{}", FeedError::StaleWrite(id.clone()));
            return Ok(Mutation::Unchanged(message));
        }
        if !permissions::can_delete(actor, &message) {
            return Err(StoreError::Forbidden(format!(
                "member {} may not delete message {id}",
                actor.id
            )));
        }

        message.tombstone(database::now_after(&message.updated_at));

        self.conn().execute(
            "UPDATE messages SET content = '', deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![database::encode_ts(&message.updated_at), id.as_str()],
        )?;

        tracing::debug!(msg_id = %id, by = %actor.id, "message deleted");
        Ok(Mutation::Applied(message))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn invalid_scope(err: FeedError) -> StoreError {
    StoreError::Invalid(err.to_string())
}

fn check_length(content: &str) -> Result<()> {
    if content.len() > MAX_CONTENT_LEN {
        return Err(StoreError::Invalid(format!(
            "message longer than {MAX_CONTENT_LEN} bytes"
        )));
    }
    Ok(())
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let kind_str: String = row.get(1)?;
    let created_str: String = row.get(7)?;
    let updated_str: String = row.get(8)?;

    let kind = kind_str
        .parse::<ScopeKind>()
        .map_err(|e| database::conversion_error(1, e))?;

    Ok(Message {
        id: MessageId(row.get(0)?),
        scope: FeedScope {
            kind,
            id: row.get(2)?,
        },
        content: row.get(3)?,
        file_url: row.get(4)?,
        file_type: row.get(5)?,
        author_member_id: MemberId(row.get(6)?),
        created_at: database::decode_ts(7, &created_str)?,
        updated_at: database::decode_ts(8, &updated_str)?,
        deleted: row.get(9)?,
    })
}
