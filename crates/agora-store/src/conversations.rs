//! Direct conversations between two members of one server.

use rusqlite::params;

use crate::database::{self, Database};
use crate::error::{Result, StoreError};
use crate::models::{Conversation, ConversationId, MemberId};

impl Database {
    /// Find the conversation between two members, creating it if needed.
    /// Argument order does not matter.
    pub fn get_or_create_conversation(&self, one: &MemberId, two: &MemberId) -> Result<Conversation> {
        if one == two {
            return Err(StoreError::Invalid("cannot start a conversation with yourself".into()));
        }

        let first = self.get_member(one)?;
        let second = self.get_member(two)?;
        if first.server_id != second.server_id {
            return Err(StoreError::Forbidden("members belong to different servers".into()));
        }

        match self.find_conversation(one, two) {
            Ok(existing) => return Ok(existing),
            Err(StoreError::NotFound) => {}
            Err(other) => return Err(other),
        }

        let conversation = Conversation {
            id: ConversationId::new(),
            member_one_id: one.clone(),
            member_two_id: two.clone(),
            created_at: database::now(),
        };

        self.conn().execute(
            "INSERT INTO conversations (id, member_one_id, member_two_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                conversation.id.as_str(),
                conversation.member_one_id.as_str(),
                conversation.member_two_id.as_str(),
                database::encode_ts(&conversation.created_at),
            ],
        )?;

        tracing::debug!(conversation = %conversation.id, "conversation created");
        Ok(conversation)
    }

    pub fn get_conversation(&self, id: &ConversationId) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, member_one_id, member_two_id, created_at
                 FROM conversations WHERE id = ?1",
                params![id.as_str()],
                row_to_conversation,
            )
            .map_err(database::not_found)
    }

    fn find_conversation(&self, one: &MemberId, two: &MemberId) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, member_one_id, member_two_id, created_at
                 FROM conversations
                 WHERE (member_one_id = ?1 AND member_two_id = ?2)
                    OR (member_one_id = ?2 AND member_two_id = ?1)",
                params![one.as_str(), two.as_str()],
                row_to_conversation,
            )
            .map_err(database::not_found)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let created_str: String = row.get(3)?;
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        member_one_id: MemberId(row.get(1)?),
        member_two_id: MemberId(row.get(2)?),
        created_at: database::decode_ts(3, &created_str)?,
    })
}
