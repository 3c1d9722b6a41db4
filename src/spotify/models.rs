//! Typed contracts for the Spotify Web API and the aggregated signal set.
//!
//! Upstream payloads are deserialized into the private-ish wire structs below
//! and normalized into `SignalSet` at the aggregation boundary; nothing
//! downstream ever sees a raw JSON blob.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// Time window for the top-artists endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Short,
    Medium,
    Long,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Short => "short_term",
            TimeRange::Medium => "medium_term",
            TimeRange::Long => "long_term",
        }
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistObject {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageObject {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
}

#[derive(Debug, Deserialize)]
pub struct PagedArtists {
    #[serde(default)]
    pub items: Vec<ArtistObject>,
}

#[derive(Debug, Deserialize)]
pub struct FollowedArtistsResponse {
    pub artists: PagedArtists,
}

#[derive(Debug, Deserialize)]
pub struct PlayHistoryItem {
    pub track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
pub struct RecentlyPlayedResponse {
    #[serde(default)]
    pub items: Vec<PlayHistoryItem>,
}

#[derive(Debug, Deserialize)]
pub struct SavedTrackItem {
    pub track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
pub struct SavedTracksResponse {
    #[serde(default)]
    pub items: Vec<SavedTrackItem>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistObject {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistsResponse {
    #[serde(default)]
    pub items: Vec<PlaylistObject>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistTrackItem {
    pub track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistTracksResponse {
    #[serde(default)]
    pub items: Vec<PlaylistTrackItem>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    pub error: Option<String>,
}

// =============================================================================
// Aggregated signals
// =============================================================================

/// An artist as observed from any upstream source, with the metadata kept
/// from whichever source saw it first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedArtist {
    pub spotify_id: String,
    pub name: String,
    pub image_url: Option<String>,
}

/// Per-artist occurrence counts feeding the score formula.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalCounts {
    pub recent_plays: u32,
    pub saved_tracks: u32,
    pub playlist_tracks: u32,
    pub followed: bool,
}

/// A user's listening signals merged across all upstream sources.
///
/// Membership is the union across sources; metadata follows the first writer.
#[derive(Debug, Default)]
pub struct SignalSet {
    artists: HashMap<String, ObservedArtist>,
    recent_plays: HashMap<String, u32>,
    saved_tracks: HashMap<String, u32>,
    playlist_tracks: HashMap<String, u32>,
    followed: HashSet<String>,
    sources_failed: u32,
}

impl SignalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artist's membership. First writer's metadata wins.
    pub fn observe(&mut self, artist: ObservedArtist) {
        self.artists.entry(artist.spotify_id.clone()).or_insert(artist);
    }

    pub fn record_followed(&mut self, spotify_id: &str) {
        self.followed.insert(spotify_id.to_string());
    }

    pub fn record_recent_play(&mut self, spotify_id: &str) {
        *self.recent_plays.entry(spotify_id.to_string()).or_insert(0) += 1;
    }

    pub fn record_saved_track(&mut self, spotify_id: &str) {
        *self.saved_tracks.entry(spotify_id.to_string()).or_insert(0) += 1;
    }

    pub fn record_playlist_track(&mut self, spotify_id: &str) {
        *self
            .playlist_tracks
            .entry(spotify_id.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_source_failure(&mut self) {
        self.sources_failed += 1;
    }

    /// Every artist observed in any source, deduplicated.
    pub fn observed_artists(&self) -> Vec<&ObservedArtist> {
        self.artists.values().collect()
    }

    pub fn counts_for(&self, spotify_id: &str) -> SignalCounts {
        SignalCounts {
            recent_plays: self.recent_plays.get(spotify_id).copied().unwrap_or(0),
            saved_tracks: self.saved_tracks.get(spotify_id).copied().unwrap_or(0),
            playlist_tracks: self.playlist_tracks.get(spotify_id).copied().unwrap_or(0),
            followed: self.followed.contains(spotify_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.artists.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artists.len()
    }

    /// Number of upstream sources that failed while building this set.
    pub fn sources_failed(&self) -> u32 {
        self.sources_failed
    }
}
