//! CRUD operations for [`Profile`] records.

use rusqlite::params;

use crate::database::{self, Database};
use crate::error::{Result, StoreError};
use crate::models::{Profile, ProfileId};

impl Database {
    /// Register a profile for an identity the auth provider vouched for.
    pub fn create_profile(&self, name: &str, image_url: Option<&str>) -> Result<Profile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("profile name is required".into()));
        }

        let profile = Profile {
            id: ProfileId::new(),
            name: name.to_string(),
            image_url: image_url.map(str::to_string),
            created_at: database::now(),
        };

        self.conn().execute(
            "INSERT INTO profiles (id, name, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                profile.id.as_str(),
                profile.name,
                profile.image_url,
                database::encode_ts(&profile.created_at),
            ],
        )?;

        tracing::debug!(profile = %profile.id, "profile created");
        Ok(profile)
    }

    pub fn get_profile(&self, id: &ProfileId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT id, name, image_url, created_at FROM profiles WHERE id = ?1",
                params![id.as_str()],
                row_to_profile,
            )
            .map_err(database::not_found)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let created_str: String = row.get(3)?;
    Ok(Profile {
        id: ProfileId(row.get(0)?),
        name: row.get(1)?,
        image_url: row.get(2)?,
        created_at: database::decode_ts(3, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_fetch_profile() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_profile("  ada  ", None).unwrap();
        assert_eq!(created.name, "ada");

        let fetched = db.get_profile(&created.id).unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_blank_name_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.create_profile("   ", None),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_profile_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_profile(&ProfileId::from("nope")),
            Err(StoreError::NotFound)
        ));
    }
}
