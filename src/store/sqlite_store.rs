use super::models::{ArtistCatalogEntry, Platform, PlatformConnection, UserFollow};
use super::schema::create_schema;
use super::{CatalogStore, ConnectionStore, FollowStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// SQLite-backed implementation of the catalog, follow and connection stores.
///
/// All three tables live in one database file; the stores share a single
/// connection behind a mutex.
pub struct SqliteFanStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFanStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if !path.exists() {
            info!("Creating new fanitude database at {:?}", path);
        }
        let conn = Connection::open(path).context("Failed to open fanitude database")?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_artist(row: &rusqlite::Row) -> rusqlite::Result<ArtistCatalogEntry> {
        Ok(ArtistCatalogEntry {
            id: row.get("id")?,
            name: row.get("name")?,
            spotify_id: row.get("spotify_id")?,
            apple_music_id: row.get("apple_music_id")?,
            deezer_id: row.get("deezer_id")?,
            image_url: row.get("image_url")?,
        })
    }

    fn row_to_follow(row: &rusqlite::Row) -> rusqlite::Result<UserFollow> {
        let last_sync_at_str: String = row.get("last_sync_at")?;
        Ok(UserFollow {
            user_id: row.get("user_id")?,
            artist_id: row.get("artist_id")?,
            fanitude_points: row.get("fanitude_points")?,
            last_listening_minutes: row.get("last_listening_minutes")?,
            last_sync_at: DateTime::parse_from_rfc3339(&last_sync_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn platform_id_column(platform: Platform) -> &'static str {
        match platform {
            Platform::Spotify => "spotify_id",
            Platform::AppleMusic => "apple_music_id",
            Platform::Deezer => "deezer_id",
        }
    }
}

impl CatalogStore for SqliteFanStore {
    fn find_by_platform_id(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<ArtistCatalogEntry>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT * FROM artists WHERE {} = ?1",
            Self::platform_id_column(platform)
        );
        conn.query_row(&sql, params![platform_id], Self::row_to_artist)
            .optional()
            .context("Failed to look up artist by platform id")
    }

    fn upsert_artist(&self, entry: &ArtistCatalogEntry) -> Result<ArtistCatalogEntry> {
        // Keyed by spotify id when present: a concurrent insert of the same
        // platform id must resolve to the already-stored row.
        if let Some(spotify_id) = &entry.spotify_id {
            if let Some(existing) = self.find_by_platform_id(Platform::Spotify, spotify_id)? {
                return Ok(existing);
            }
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO artists (id, name, spotify_id, apple_music_id, deezer_id, image_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(spotify_id) DO NOTHING",
            params![
                entry.id,
                entry.name,
                entry.spotify_id,
                entry.apple_music_id,
                entry.deezer_id,
                entry.image_url
            ],
        )
        .context("Failed to insert catalog artist")?;
        drop(conn);
        match &entry.spotify_id {
            Some(spotify_id) => self
                .find_by_platform_id(Platform::Spotify, spotify_id)?
                .context("Upserted artist not found"),
            None => Ok(entry.clone()),
        }
    }

    fn get_artist(&self, id: &str) -> Result<Option<ArtistCatalogEntry>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM artists WHERE id = ?1",
            params![id],
            Self::row_to_artist,
        )
        .optional()
        .context("Failed to get catalog artist")
    }

    fn artists_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM artists", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl FollowStore for SqliteFanStore {
    fn list_by_user(&self, user_id: &str) -> Result<Vec<UserFollow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM user_follows WHERE user_id = ?1")?;
        let follows = stmt
            .query_map(params![user_id], Self::row_to_follow)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list user follows")?;
        Ok(follows)
    }

    fn upsert(&self, follow: &UserFollow) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_follows
                (user_id, artist_id, fanitude_points, last_listening_minutes, last_sync_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, artist_id) DO UPDATE SET
                fanitude_points = excluded.fanitude_points,
                last_listening_minutes = excluded.last_listening_minutes,
                last_sync_at = excluded.last_sync_at",
            params![
                follow.user_id,
                follow.artist_id,
                follow.fanitude_points,
                follow.last_listening_minutes,
                follow.last_sync_at.to_rfc3339()
            ],
        )
        .context("Failed to upsert user follow")?;
        Ok(())
    }

    fn delete(&self, user_id: &str, artist_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM user_follows WHERE user_id = ?1 AND artist_id = ?2",
                params![user_id, artist_id],
            )
            .context("Failed to delete user follow")?;
        Ok(deleted > 0)
    }
}

impl ConnectionStore for SqliteFanStore {
    fn get(&self, user_id: &str) -> Result<Option<PlatformConnection>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM platform_connections WHERE user_id = ?1",
            params![user_id],
            |row| {
                let platform_str: String = row.get("platform")?;
                Ok(PlatformConnection {
                    user_id: row.get("user_id")?,
                    platform: Platform::parse(&platform_str).unwrap_or(Platform::Spotify),
                    access_token: row.get("access_token")?,
                    refresh_token: row.get("refresh_token")?,
                })
            },
        )
        .optional()
        .context("Failed to get platform connection")
    }

    fn upsert(&self, connection: &PlatformConnection) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO platform_connections (user_id, platform, access_token, refresh_token)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                platform = excluded.platform,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token",
            params![
                connection.user_id,
                connection.platform.as_str(),
                connection.access_token,
                connection.refresh_token
            ],
        )
        .context("Failed to upsert platform connection")?;
        Ok(())
    }

    fn update_access_token(&self, user_id: &str, access_token: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE platform_connections SET access_token = ?2 WHERE user_id = ?1",
            params![user_id, access_token],
        )
        .context("Failed to update access token")?;
        Ok(())
    }

    fn delete(&self, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .execute(
                "DELETE FROM platform_connections WHERE user_id = ?1",
                params![user_id],
            )
            .context("Failed to delete platform connection")?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist(spotify_id: &str, name: &str) -> ArtistCatalogEntry {
        ArtistCatalogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            spotify_id: Some(spotify_id.to_string()),
            apple_music_id: None,
            deezer_id: None,
            image_url: None,
        }
    }

    #[test]
    fn test_upsert_artist_is_idempotent_per_platform_id() {
        let store = SqliteFanStore::new_in_memory().unwrap();

        let first = store.upsert_artist(&artist("sp-1", "Caparezza")).unwrap();
        let second = store.upsert_artist(&artist("sp-1", "Caparezza")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.artists_count().unwrap(), 1);
    }

    #[test]
    fn test_find_by_platform_id() {
        let store = SqliteFanStore::new_in_memory().unwrap();
        let stored = store.upsert_artist(&artist("sp-2", "Brunori Sas")).unwrap();

        let found = store
            .find_by_platform_id(Platform::Spotify, "sp-2")
            .unwrap()
            .unwrap();
        assert_eq!(found, stored);
        assert!(store
            .find_by_platform_id(Platform::Spotify, "sp-missing")
            .unwrap()
            .is_none());
        assert!(store
            .find_by_platform_id(Platform::Deezer, "sp-2")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_follow_roundtrip_and_delete() {
        let store = SqliteFanStore::new_in_memory().unwrap();
        let stored = store.upsert_artist(&artist("sp-3", "Verdena")).unwrap();

        let follow = UserFollow {
            user_id: "user-1".to_string(),
            artist_id: stored.id.clone(),
            fanitude_points: 42,
            last_listening_minutes: 42,
            last_sync_at: Utc::now(),
        };
        FollowStore::upsert(&store, &follow).unwrap();

        let listed = store.list_by_user("user-1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fanitude_points, 42);

        // Upsert overwrites the score instead of duplicating the row.
        let updated = UserFollow {
            fanitude_points: 7,
            last_listening_minutes: 7,
            ..follow.clone()
        };
        FollowStore::upsert(&store, &updated).unwrap();
        let listed = store.list_by_user("user-1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fanitude_points, 7);

        assert!(FollowStore::delete(&store, "user-1", &stored.id).unwrap());
        assert!(!FollowStore::delete(&store, "user-1", &stored.id).unwrap());
        assert!(store.list_by_user("user-1").unwrap().is_empty());
    }

    #[test]
    fn test_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fanitude.db");

        let stored = {
            let store = SqliteFanStore::new(&db_path).unwrap();
            store.upsert_artist(&artist("sp-4", "Calcutta")).unwrap()
        };

        let store = SqliteFanStore::new(&db_path).unwrap();
        let found = store.get_artist(&stored.id).unwrap().unwrap();
        assert_eq!(found, stored);
    }

    #[test]
    fn test_connection_lifecycle() {
        let store = SqliteFanStore::new_in_memory().unwrap();
        let connection = PlatformConnection {
            user_id: "user-1".to_string(),
            platform: Platform::Spotify,
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
        };
        ConnectionStore::upsert(&store, &connection).unwrap();

        store.update_access_token("user-1", "fresher").unwrap();
        let got = ConnectionStore::get(&store, "user-1").unwrap().unwrap();
        assert_eq!(got.access_token, "fresher");
        assert_eq!(got.refresh_token, "refresh");

        assert!(ConnectionStore::delete(&store, "user-1").unwrap());
        assert!(ConnectionStore::get(&store, "user-1").unwrap().is_none());
    }
}
