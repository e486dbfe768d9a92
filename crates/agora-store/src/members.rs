//! CRUD operations for [`Member`] records.

use rusqlite::{params, Connection};

use crate::database::{self, Database};
use crate::error::{Result, StoreError};
use crate::models::{Member, MemberId, ProfileId, Role, ServerId};

impl Database {
    /// Add `profile` to `server` with the given role.
    pub fn add_member(&self, server_id: &ServerId, profile_id: &ProfileId, role: Role) -> Result<Member> {
        self.get_server(server_id)?;
        self.get_profile(profile_id)?;

        match self.get_member_for_profile(server_id, profile_id) {
            Ok(_) => {
                return Err(StoreError::Invalid(format!(
                    "profile {profile_id} is already a member of server {server_id}"
                )))
            }
            Err(StoreError::NotFound) => {}
            Err(other) => return Err(other),
        }

        let member = Member {
            id: MemberId::new(),
            profile_id: profile_id.clone(),
            server_id: server_id.clone(),
            role,
            created_at: database::now(),
        };
        insert_member(self.conn(), &member)?;

        tracing::debug!(member = %member.id, server = %server_id, role = %role, "member added");
        Ok(member)
    }

    /// Join through an invite code as a GUEST. Joining twice returns the
    /// existing membership.
    pub fn join_server(&self, invite_code: &str, profile_id: &ProfileId) -> Result<Member> {
        let server = self.get_server_by_invite(invite_code)?;
        match self.get_member_for_profile(&server.id, profile_id) {
            Ok(existing) => Ok(existing),
            Err(StoreError::NotFound) => self.add_member(&server.id, profile_id, Role::Guest),
            Err(other) => Err(other),
        }
    }

    pub fn get_member(&self, id: &MemberId) -> Result<Member> {
        self.conn()
            .query_row(
                "SELECT id, role, profile_id, server_id, created_at FROM members WHERE id = ?1",
                params![id.as_str()],
                row_to_member,
            )
            .map_err(database::not_found)
    }

    pub fn get_member_for_profile(&self, server_id: &ServerId, profile_id: &ProfileId) -> Result<Member> {
        self.conn()
            .query_row(
                "SELECT id, role, profile_id, server_id, created_at
                 FROM members WHERE server_id = ?1 AND profile_id = ?2",
                params![server_id.as_str(), profile_id.as_str()],
                row_to_member,
            )
            .map_err(database::not_found)
    }

    /// List a server's members, oldest membership first.
    pub fn list_members(&self, server_id: &ServerId) -> Result<Vec<Member>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, role, profile_id, server_id, created_at
             FROM members
             WHERE server_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![server_id.as_str()], row_to_member)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    /// Change another member's role. Only admins may do this, and never
    /// on themselves.
    pub fn set_member_role(&self, actor: &Member, target: &MemberId, role: Role) -> Result<Member> {
        if actor.role != Role::Admin {
            return Err(StoreError::Forbidden("only admins can change roles".into()));
        }
        if &actor.id == target {
            return Err(StoreError::Forbidden("admins cannot change their own role".into()));
        }

        let mut member = self.get_member(target)?;
        if member.server_id != actor.server_id {
            return Err(StoreError::Forbidden("member belongs to another server".into()));
        }

        self.conn().execute(
            "UPDATE members SET role = ?1 WHERE id = ?2",
            params![role.as_str(), target.as_str()],
        )?;
        member.role = role;
        Ok(member)
    }
}

pub(crate) fn insert_member(conn: &Connection, member: &Member) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO members (id, role, profile_id, server_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            member.id.as_str(),
            member.role.as_str(),
            member.profile_id.as_str(),
            member.server_id.as_str(),
            database::encode_ts(&member.created_at),
        ],
    )?;
    Ok(())
}

fn row_to_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<Member> {
    let role_str: String = row.get(1)?;
    let created_str: String = row.get(4)?;

    let role = role_str
        .parse::<Role>()
        .map_err(|e| database::conversion_error(1, e))?;

    Ok(Member {
        id: MemberId(row.get(0)?),
        role,
        profile_id: ProfileId(row.get(2)?),
        server_id: ServerId(row.get(3)?),
        created_at: database::decode_ts(4, &created_str)?,
    })
}
