//! Fanitude Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod cache;
pub mod config;
pub mod reconcile;
pub mod scoring;
pub mod server;
pub mod spotify;
pub mod store;
pub mod sync;

// Re-export commonly used types for convenience
pub use cache::{ArtistCache, CachePage, ScoredArtist};
pub use server::run_server;
pub use store::{CatalogStore, ConnectionStore, FollowStore, SqliteFanStore};
pub use sync::{SyncError, SyncService};
