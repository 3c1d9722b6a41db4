//! SQLite schema for the fanitude database.
//!
//! Three small tables with no migration history yet; the schema is applied
//! idempotently on open.

use anyhow::Result;
use rusqlite::Connection;

const CREATE_ARTISTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS artists (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    spotify_id TEXT UNIQUE,
    apple_music_id TEXT UNIQUE,
    deezer_id TEXT UNIQUE,
    image_url TEXT
);
";

const CREATE_USER_FOLLOWS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS user_follows (
    user_id TEXT NOT NULL,
    artist_id TEXT NOT NULL,
    fanitude_points INTEGER NOT NULL DEFAULT 0,
    last_listening_minutes INTEGER NOT NULL DEFAULT 0,
    last_sync_at TEXT NOT NULL,
    PRIMARY KEY (user_id, artist_id),
    FOREIGN KEY (artist_id) REFERENCES artists(id)
);
";

const CREATE_USER_FOLLOWS_INDEX: &str = "
CREATE INDEX IF NOT EXISTS idx_user_follows_user ON user_follows(user_id);
";

const CREATE_PLATFORM_CONNECTIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS platform_connections (
    user_id TEXT PRIMARY KEY,
    platform TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NOT NULL
);
";

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "{}{}{}{}",
        CREATE_ARTISTS_TABLE,
        CREATE_USER_FOLLOWS_TABLE,
        CREATE_USER_FOLLOWS_INDEX,
        CREATE_PLATFORM_CONNECTIONS_TABLE,
    ))?;
    Ok(())
}
