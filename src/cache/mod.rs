//! Per-user, TTL-bound cache of the fully scored and sorted artist list.
//!
//! An entry always holds the complete scored set for its user; pagination is
//! a pure slice over it. Entries past the TTL are still served, flagged
//! stale, until explicitly invalidated or swept. The cache is process-local
//! and not shared across horizontally scaled instances.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default entry time-to-live before an entry is served as stale.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3 * 60 * 60);
/// Default idle period after which an untouched entry is swept.
pub const DEFAULT_DEAD_AFTER: Duration = Duration::from_secs(6 * 60 * 60);

/// One artist in a user's scored list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredArtist {
    pub artist_id: String,
    pub spotify_id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub score: u32,
    pub selected: bool,
}

/// A page sliced out of a cached entry.
#[derive(Debug, Clone)]
pub struct CachePage {
    pub items: Vec<ScoredArtist>,
    pub total: usize,
    pub is_stale: bool,
}

struct CacheEntry {
    artists: Vec<ScoredArtist>,
    cached_at: Instant,
    stale: bool,
    last_touched: Instant,
}

pub struct ArtistCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    dead_after: Duration,
}

impl Default for ArtistCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_DEAD_AFTER)
    }
}

impl ArtistCache {
    pub fn new(ttl: Duration, dead_after: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            dead_after,
        }
    }

    /// Slice a page out of the user's entry, if one exists.
    ///
    /// An entry past its TTL is returned with `is_stale = true` rather than
    /// treated as a miss. Reading an entry keeps it alive for the sweeper.
    pub fn get(&self, user_id: &str, page: usize, limit: usize) -> Option<CachePage> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get_mut(user_id)?;
        entry.last_touched = Instant::now();

        let is_stale = entry.stale || entry.cached_at.elapsed() > self.ttl;
        let total = entry.artists.len();
        let start = page.saturating_mul(limit).min(total);
        let end = start.saturating_add(limit).min(total);

        Some(CachePage {
            items: entry.artists[start..end].to_vec(),
            total,
            is_stale,
        })
    }

    /// Atomically replace the user's entry with a freshly scored list.
    pub fn set(&self, user_id: &str, artists: Vec<ScoredArtist>) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            user_id.to_string(),
            CacheEntry {
                artists,
                cached_at: now,
                stale: false,
                last_touched: now,
            },
        );
    }

    /// Flip one artist's `selected` flag in place, leaving freshness
    /// metadata untouched so a lightweight toggle does not force a resync.
    ///
    /// Returns false if there is no entry or the artist is not in it.
    pub fn update_selected(&self, user_id: &str, artist_id: &str, selected: bool) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(user_id) else {
            return false;
        };
        entry.last_touched = Instant::now();
        match entry
            .artists
            .iter_mut()
            .find(|artist| artist.artist_id == artist_id)
        {
            Some(artist) => {
                artist.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Remove the user's entry entirely.
    pub fn invalidate(&self, user_id: &str) -> bool {
        self.entries.lock().unwrap().remove(user_id).is_some()
    }

    /// Downgrade the user's entry to stale without removing it.
    pub fn mark_stale(&self, user_id: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(user_id) {
            Some(entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Remove entries nobody has touched for the dead-after window.
    ///
    /// Entries still being read as stale fallback have a recent
    /// `last_touched` and survive. Returns the number of removed entries.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| entry.last_touched.elapsed() <= self.dead_after);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Swept {} dead cache entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(artist_id: &str, score: u32) -> ScoredArtist {
        ScoredArtist {
            artist_id: artist_id.to_string(),
            spotify_id: format!("sp-{}", artist_id),
            name: format!("artist {}", artist_id),
            image_url: None,
            score,
            selected: false,
        }
    }

    fn sorted_list(n: usize) -> Vec<ScoredArtist> {
        (0..n)
            .map(|i| scored(&format!("a{}", i), (n - i) as u32))
            .collect()
    }

    #[test]
    fn test_set_then_get_returns_exact_fresh_slice() {
        let cache = ArtistCache::default();
        cache.set("user-1", sorted_list(10));

        let page = cache.get("user-1", 1, 3).unwrap();
        assert!(!page.is_stale);
        assert_eq!(page.total, 10);
        let ids: Vec<&str> = page.items.iter().map(|a| a.artist_id.as_str()).collect();
        assert_eq!(ids, ["a3", "a4", "a5"]);
    }

    #[test]
    fn test_page_past_the_end_is_empty_not_a_miss() {
        let cache = ArtistCache::default();
        cache.set("user-1", sorted_list(4));

        let page = cache.get("user-1", 5, 10).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 4);
    }

    #[test]
    fn test_expired_entry_is_served_stale_until_invalidated() {
        let cache = ArtistCache::new(Duration::from_millis(20), DEFAULT_DEAD_AFTER);
        cache.set("user-1", sorted_list(2));

        std::thread::sleep(Duration::from_millis(40));

        let page = cache.get("user-1", 0, 10).unwrap();
        assert!(page.is_stale);
        assert_eq!(page.total, 2);

        assert!(cache.invalidate("user-1"));
        assert!(cache.get("user-1", 0, 10).is_none());
    }

    #[test]
    fn test_mark_stale_downgrades_a_fresh_entry() {
        let cache = ArtistCache::default();
        cache.set("user-1", sorted_list(1));

        assert!(!cache.get("user-1", 0, 10).unwrap().is_stale);
        assert!(cache.mark_stale("user-1"));
        assert!(cache.get("user-1", 0, 10).unwrap().is_stale);
        assert!(!cache.mark_stale("ghost"));
    }

    #[test]
    fn test_selection_toggle_leaves_freshness_untouched() {
        let cache = ArtistCache::default();
        cache.set("user-1", sorted_list(3));

        assert!(cache.update_selected("user-1", "a1", true));
        let page = cache.get("user-1", 0, 10).unwrap();
        assert!(!page.is_stale);
        assert!(page.items.iter().any(|a| a.artist_id == "a1" && a.selected));

        assert!(!cache.update_selected("user-1", "missing", true));
        assert!(!cache.update_selected("ghost", "a1", true));
    }

    #[test]
    fn test_set_replaces_the_whole_entry() {
        let cache = ArtistCache::default();
        cache.set("user-1", sorted_list(5));
        cache.update_selected("user-1", "a0", true);

        cache.set("user-1", sorted_list(2));
        let page = cache.get("user-1", 0, 10).unwrap();
        assert_eq!(page.total, 2);
        // The selected flag belongs to the replaced entry, not the new one.
        assert!(page.items.iter().all(|a| !a.selected));
    }

    #[test]
    fn test_sweep_removes_only_untouched_entries() {
        let cache = ArtistCache::new(DEFAULT_TTL, Duration::from_millis(30));
        cache.set("dead-user", sorted_list(1));
        cache.set("live-user", sorted_list(1));

        std::thread::sleep(Duration::from_millis(20));
        // Reading keeps the live user's entry alive.
        cache.get("live-user", 0, 10).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.sweep(), 1);
        assert!(cache.get("dead-user", 0, 10).is_none());
        assert!(cache.get("live-user", 0, 10).is_some());
    }
}
