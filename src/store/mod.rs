mod models;
mod schema;
mod sqlite_store;

pub use models::*;
pub use sqlite_store::SqliteFanStore;

use anyhow::Result;

/// Shared artist catalog, platform-agnostic.
///
/// Entries are created on first observation from any user and never
/// duplicated per platform id.
pub trait CatalogStore: Send + Sync {
    /// Look up a catalog entry by one of its platform-specific ids.
    fn find_by_platform_id(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<ArtistCatalogEntry>>;

    /// Insert the entry if its platform id is unseen, otherwise return the
    /// existing row. Idempotent.
    fn upsert_artist(&self, entry: &ArtistCatalogEntry) -> Result<ArtistCatalogEntry>;

    /// Get a catalog entry by internal id.
    fn get_artist(&self, id: &str) -> Result<Option<ArtistCatalogEntry>>;

    /// Number of catalog entries.
    fn artists_count(&self) -> Result<usize>;
}

/// Per-user follow relationships, rewritten on every sync.
pub trait FollowStore: Send + Sync {
    fn list_by_user(&self, user_id: &str) -> Result<Vec<UserFollow>>;
    fn upsert(&self, follow: &UserFollow) -> Result<()>;
    /// Returns true if a row was deleted.
    fn delete(&self, user_id: &str, artist_id: &str) -> Result<bool>;
}

/// Streaming-platform credentials, one connection per user.
pub trait ConnectionStore: Send + Sync {
    fn get(&self, user_id: &str) -> Result<Option<PlatformConnection>>;
    fn upsert(&self, connection: &PlatformConnection) -> Result<()>;
    fn update_access_token(&self, user_id: &str, access_token: &str) -> Result<()>;
    /// Returns true if a row was deleted.
    fn delete(&self, user_id: &str) -> Result<bool>;
}
