//! v001 -- Initial schema creation.
//!
//! Creates `profiles`, `servers`, `members`, `channels`, `conversations`
//! and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (identities vouched for by the auth provider)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id         TEXT PRIMARY KEY NOT NULL,
    name       TEXT NOT NULL,
    image_url  TEXT,
    created_at TEXT NOT NULL                  -- RFC-3339, UTC, micros
);

-- ----------------------------------------------------------------
-- Servers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS servers (
    id          TEXT PRIMARY KEY NOT NULL,
    name        TEXT NOT NULL,
    image_url   TEXT,
    invite_code TEXT NOT NULL UNIQUE,
    profile_id  TEXT NOT NULL,                -- owner
    created_at  TEXT NOT NULL,

    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Members (one per profile per server)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS members (
    id         TEXT PRIMARY KEY NOT NULL,
    role       TEXT NOT NULL,                 -- GUEST | MODERATOR | ADMIN
    profile_id TEXT NOT NULL,
    server_id  TEXT NOT NULL,
    created_at TEXT NOT NULL,

    UNIQUE (profile_id, server_id),
    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE,
    FOREIGN KEY (server_id)  REFERENCES servers(id)  ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_members_server_id ON members(server_id);

-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id         TEXT PRIMARY KEY NOT NULL,
    name       TEXT NOT NULL,
    kind       TEXT NOT NULL,                 -- TEXT | AUDIO | VIDEO
    profile_id TEXT NOT NULL,                 -- creator
    server_id  TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE,
    FOREIGN KEY (server_id)  REFERENCES servers(id)  ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_channels_server_id ON channels(server_id);

-- ----------------------------------------------------------------
-- Direct conversations between two members
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id            TEXT PRIMARY KEY NOT NULL,
    member_one_id TEXT NOT NULL,
    member_two_id TEXT NOT NULL,
    created_at    TEXT NOT NULL,

    UNIQUE (member_one_id, member_two_id),
    FOREIGN KEY (member_one_id) REFERENCES members(id) ON DELETE CASCADE,
    FOREIGN KEY (member_two_id) REFERENCES members(id) ON DELETE CASCADE
);

-- ----------------------------------------------------------------
-- Messages (channel and conversation feeds share one table)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUIDv7
    scope_kind TEXT NOT NULL,                 -- channel | conversation
    scope_id   TEXT NOT NULL,
    content    TEXT NOT NULL,
    file_url   TEXT,
    file_type  TEXT,
    member_id  TEXT NOT NULL,                 -- author
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted    INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1, never reset

    FOREIGN KEY (member_id) REFERENCES members(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_scope_recency
    ON messages(scope_kind, scope_id, created_at DESC, id DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
