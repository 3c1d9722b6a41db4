//! Reconciliation of observed upstream artists against the shared catalog.
//!
//! Unseen artists are inserted (idempotent upsert keyed by platform id) and
//! follows no longer observed upstream are pruned: the follow relation is a
//! derived snapshot of current listening, not a sticky manual selection.
//! An empty observation set means "unknown", never "confirmed absent", so it
//! must not prune anything.

use crate::spotify::ObservedArtist;
use crate::store::{ArtistCatalogEntry, CatalogStore, FollowStore, Platform};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct CatalogReconciler {
    catalog: Arc<dyn CatalogStore>,
    follows: Arc<dyn FollowStore>,
}

impl CatalogReconciler {
    pub fn new(catalog: Arc<dyn CatalogStore>, follows: Arc<dyn FollowStore>) -> Self {
        Self { catalog, follows }
    }

    /// Map observed external artists onto catalog entries, inserting unseen
    /// ones, and prune the user's follows absent from the observed set.
    pub fn reconcile(
        &self,
        user_id: &str,
        observed: &[ObservedArtist],
    ) -> Result<Vec<ArtistCatalogEntry>> {
        if observed.is_empty() {
            // A transient outage must not wipe the user's follow set.
            info!(
                "No observed artists for user {}, skipping follow pruning",
                user_id
            );
            return Ok(Vec::new());
        }

        let mut entries = Vec::with_capacity(observed.len());
        for artist in observed {
            let entry = match self
                .catalog
                .find_by_platform_id(Platform::Spotify, &artist.spotify_id)?
            {
                Some(existing) => existing,
                None => self.catalog.upsert_artist(&ArtistCatalogEntry {
                    id: Uuid::new_v4().to_string(),
                    name: artist.name.clone(),
                    spotify_id: Some(artist.spotify_id.clone()),
                    apple_music_id: None,
                    deezer_id: None,
                    image_url: artist.image_url.clone(),
                })?,
            };
            entries.push(entry);
        }

        let observed_ids: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let mut pruned = 0;
        for follow in self.follows.list_by_user(user_id)? {
            if !observed_ids.contains(follow.artist_id.as_str()) {
                self.follows.delete(user_id, &follow.artist_id)?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!(
                "Pruned {} follows no longer observed upstream for user {}",
                pruned, user_id
            );
        }

        Ok(entries)
    }
}
