//! CRUD operations for [`Channel`] records.

use rusqlite::{params, Connection};

use agora_shared::constants::GENERAL_CHANNEL_NAME;
use agora_shared::permissions;

use crate::database::{self, Database};
use crate::error::{Result, StoreError};
use crate::models::{Channel, ChannelId, ChannelKind, Member, ProfileId, ServerId};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a channel in the actor's server. Staff only; `general` is
    /// reserved.
    pub fn create_channel(&self, actor: &Member, name: &str, kind: ChannelKind) -> Result<Channel> {
        if !permissions::can_manage_channels(actor) {
            return Err(StoreError::Forbidden("only moderators and admins can create channels".into()));
        }

        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("channel name is required".into()));
        }
        if name == GENERAL_CHANNEL_NAME {
            return Err(StoreError::Invalid(format!(
                "channel name cannot be \"{GENERAL_CHANNEL_NAME}\""
            )));
        }

        let channel = Channel {
            id: ChannelId::new(),
            name: name.to_string(),
            kind,
            server_id: actor.server_id.clone(),
            creator_profile_id: actor.profile_id.clone(),
            created_at: database::now(),
        };
        insert_channel(self.conn(), &channel)?;

        tracing::info!(channel = %channel.id, server = %channel.server_id, kind = %kind, "channel created");
        Ok(channel)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single channel by id.
    pub fn get_channel(&self, id: &ChannelId) -> Result<Channel> {
        self.conn()
            .query_row(
                "SELECT id, name, kind, server_id, profile_id, created_at
                 FROM channels
                 WHERE id = ?1",
                params![id.as_str()],
                row_to_channel,
            )
            .map_err(database::not_found)
    }

    /// List channels belonging to a server, oldest first.
    pub fn list_channels_for_server(&self, server_id: &ServerId) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, kind, server_id, profile_id, created_at
             FROM channels
             WHERE server_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![server_id.as_str()], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a channel and its messages. Staff only; `general` stays.
    pub fn delete_channel(&self, actor: &Member, id: &ChannelId) -> Result<()> {
        let channel = self.get_channel(id)?;

        if channel.server_id != actor.server_id || !permissions::can_manage_channels(actor) {
            return Err(StoreError::Forbidden("only moderators and admins can delete channels".into()));
        }
        if channel.name == GENERAL_CHANNEL_NAME {
            return Err(StoreError::Invalid("the general channel cannot be deleted".into()));
        }

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE scope_kind = 'channel' AND scope_id = ?1",
            params![id.as_str()],
        )?;
        tx.execute("DELETE FROM channels WHERE id = ?1", params![id.as_str()])?;
        tx.commit()?;

        tracing::info!(channel = %id, "channel deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn insert_channel(conn: &Connection, channel: &Channel) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO channels (id, name, kind, server_id, profile_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            channel.id.as_str(),
            channel.name,
            channel.kind.as_str(),
            channel.server_id.as_str(),
            channel.creator_profile_id.as_str(),
            database::encode_ts(&channel.created_at),
        ],
    )?;
    Ok(())
}

/// Map a `rusqlite::Row` to a [`Channel`].
fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let kind_str: String = row.get(2)?;
    let created_str: String = row.get(5)?;

    let kind = kind_str
        .parse::<ChannelKind>()
        .map_err(|e| database::conversion_error(2, e))?;

    Ok(Channel {
        id: ChannelId(row.get(0)?),
        name: row.get(1)?,
        kind,
        server_id: ServerId(row.get(3)?),
        creator_profile_id: ProfileId(row.get(4)?),
        created_at: database::decode_ts(5, &created_str)?,
    })
}
