//! CRUD operations for [`Server`] records.

use rusqlite::params;
use uuid::Uuid;

use agora_shared::constants::GENERAL_CHANNEL_NAME;

use crate::channels::insert_channel;
use crate::database::{self, Database};
use crate::error::{Result, StoreError};
use crate::members::insert_member;
use crate::models::{Channel, ChannelId, ChannelKind, Member, MemberId, ProfileId, Role, Server, ServerId};

impl Database {
    /// Create a server owned by `owner`.
    ///
    /// The owner joins as ADMIN and the server starts with a `general`
    /// text channel. All three rows are written in one transaction.
    pub fn create_server(
        &self,
        owner: &ProfileId,
        name: &str,
        image_url: Option<&str>,
    ) -> Result<(Server, Member, Channel)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("server name is required".into()));
        }
        // Surface a clean NotFound instead of a foreign key failure.
        self.get_profile(owner)?;

        let created_at = database::now();
        let server = Server {
            id: ServerId::new(),
            name: name.to_string(),
            image_url: image_url.map(str::to_string),
            invite_code: Uuid::new_v4().to_string(),
            owner_profile_id: owner.clone(),
            created_at,
        };
        let admin = Member {
            id: MemberId::new(),
            profile_id: owner.clone(),
            server_id: server.id.clone(),
            role: Role::Admin,
            created_at,
        };
        let general = Channel {
            id: ChannelId::new(),
            name: GENERAL_CHANNEL_NAME.to_string(),
            kind: ChannelKind::Text,
            server_id: server.id.clone(),
            creator_profile_id: owner.clone(),
            created_at,
        };

        let tx = self.conn().unchecked_transaction()?;
        tx.execute(
            "INSERT INTO servers (id, name, image_url, invite_code, profile_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                server.id.as_str(),
                server.name,
                server.image_url,
                server.invite_code,
                server.owner_profile_id.as_str(),
                database::encode_ts(&server.created_at),
            ],
        )?;
        insert_member(&tx, &admin)?;
        insert_channel(&tx, &general)?;
        tx.commit()?;

        tracing::info!(server = %server.id, owner = %owner, "server created");
        Ok((server, admin, general))
    }

    pub fn get_server(&self, id: &ServerId) -> Result<Server> {
        self.conn()
            .query_row(
                "SELECT id, name, image_url, invite_code, profile_id, created_at
                 FROM servers WHERE id = ?1",
                params![id.as_str()],
                row_to_server,
            )
            .map_err(database::not_found)
    }

    pub fn get_server_by_invite(&self, invite_code: &str) -> Result<Server> {
        self.conn()
            .query_row(
                "SELECT id, name, image_url, invite_code, profile_id, created_at
                 FROM servers WHERE invite_code = ?1",
                params![invite_code],
                row_to_server,
            )
            .map_err(database::not_found)
    }
}

fn row_to_server(row: &rusqlite::Row<'_>) -> rusqlite::Result<Server> {
    let created_str: String = row.get(5)?;
    Ok(Server {
        id: ServerId(row.get(0)?),
        name: row.get(1)?,
        image_url: row.get(2)?,
        invite_code: row.get(3)?,
        owner_profile_id: ProfileId(row.get(4)?),
        created_at: database::decode_ts(5, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_starts_with_admin_and_general() {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_profile("owner", None).unwrap();

        let (server, admin, general) = db.create_server(&owner.id, "Rustaceans", None).unwrap();

        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.server_id, server.id);
        assert_eq!(general.name, GENERAL_CHANNEL_NAME);
        assert_eq!(db.get_server(&server.id).unwrap(), server);
        assert_eq!(db.get_server_by_invite(&server.invite_code).unwrap().id, server.id);
        assert_eq!(db.list_channels_for_server(&server.id).unwrap(), vec![general]);
    }

    #[test]
    fn test_unknown_owner_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.create_server(&ProfileId::from("ghost"), "x", None),
            Err(StoreError::NotFound)
        ));
    }
}
