//! Schema migrations.
//!
//! `PRAGMA user_version` records the last applied step. Each pending step
//! runs in its own transaction together with the version bump.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// Ordered; the version of a step is its position plus one.
const STEPS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

pub fn current_version() -> u32 {
    STEPS.len() as u32
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if applied > current_version() {
        return Err(StoreError::Migration(format!(
            "database is at schema {applied}, newer than supported {}",
            current_version()
        )));
    }

    for (index, (name, step)) in STEPS.iter().enumerate().skip(applied as usize) {
        let version = index as u32 + 1;
        tracing::info!(migration = name, version, "applying migration");

        let tx = conn.unchecked_transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(conn: &Connection) -> u32 {
        conn.pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(version(&conn), current_version());
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", current_version() + 1)
            .unwrap();
        assert!(matches!(
            run_migrations(&conn),
            Err(StoreError::Migration(_))
        ));
    }
}
