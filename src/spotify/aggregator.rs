//! Aggregation of a user's listening signals across upstream sources.
//!
//! All sources are fetched concurrently. A non-auth failure in one source
//! degrades that source's contribution to empty instead of aborting the
//! whole aggregation; auth failures propagate so the token layer can act.

use super::client::SpotifyApi;
use super::models::{ArtistObject, ObservedArtist, SignalSet, TimeRange, TrackObject};
use super::UpstreamError;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SignalAggregator {
    api: Arc<dyn SpotifyApi>,
}

impl SignalAggregator {
    pub fn new(api: Arc<dyn SpotifyApi>) -> Self {
        Self { api }
    }

    /// Fetch and merge every signal source for the given access token.
    pub async fn fetch_signals(&self, access_token: &str) -> Result<SignalSet, UpstreamError> {
        let (top_short, top_medium, top_long, followed, recent, saved, playlist) = tokio::join!(
            self.api.top_artists(access_token, TimeRange::Short),
            self.api.top_artists(access_token, TimeRange::Medium),
            self.api.top_artists(access_token, TimeRange::Long),
            self.api.followed_artists(access_token),
            self.api.recently_played(access_token),
            self.api.saved_tracks(access_token),
            self.api.playlist_tracks(access_token),
        );

        let mut signals = SignalSet::new();

        let top_short = guard("top_artists_short", top_short, &mut signals)?;
        let top_medium = guard("top_artists_medium", top_medium, &mut signals)?;
        let top_long = guard("top_artists_long", top_long, &mut signals)?;
        let followed = guard("followed_artists", followed, &mut signals)?;
        let recent = guard("recently_played", recent, &mut signals)?;
        let saved = guard("saved_tracks", saved, &mut signals)?;
        let playlist = guard("playlist_tracks", playlist, &mut signals)?;

        for artist in top_short.iter().chain(&top_medium).chain(&top_long) {
            observe_artist(&mut signals, artist);
        }
        for artist in &followed {
            if let Some(id) = observe_artist(&mut signals, artist) {
                signals.record_followed(&id);
            }
        }
        for track in &recent {
            for id in observe_track_artists(&mut signals, track) {
                signals.record_recent_play(&id);
            }
        }
        for track in &saved {
            for id in observe_track_artists(&mut signals, track) {
                signals.record_saved_track(&id);
            }
        }
        for track in &playlist {
            for id in observe_track_artists(&mut signals, track) {
                signals.record_playlist_track(&id);
            }
        }

        debug!(
            "Aggregated {} artists from upstream signals ({} sources degraded)",
            signals.len(),
            signals.sources_failed()
        );
        Ok(signals)
    }
}

/// Degrade a failed source to empty, except for auth failures which abort
/// the aggregation so the token layer can refresh or disconnect.
fn guard<T>(
    source: &str,
    result: Result<Vec<T>, UpstreamError>,
    signals: &mut SignalSet,
) -> Result<Vec<T>, UpstreamError> {
    match result {
        Ok(items) => Ok(items),
        Err(UpstreamError::TokenExpired) => Err(UpstreamError::TokenExpired),
        Err(UpstreamError::TokenRevoked) => Err(UpstreamError::TokenRevoked),
        Err(UpstreamError::Unavailable(e)) => {
            warn!("Signal source {} failed, degrading to empty: {}", source, e);
            signals.record_source_failure();
            Ok(Vec::new())
        }
    }
}

fn observe_artist(signals: &mut SignalSet, artist: &ArtistObject) -> Option<String> {
    let id = artist.id.clone()?;
    let name = artist.name.clone().filter(|n| !n.is_empty())?;
    let image_url = artist
        .images
        .first()
        .and_then(|image| image.url.clone());
    signals.observe(ObservedArtist {
        spotify_id: id.clone(),
        name,
        image_url,
    });
    Some(id)
}

fn observe_track_artists(signals: &mut SignalSet, track: &TrackObject) -> Vec<String> {
    let mut ids = Vec::new();
    for artist in &track.artists {
        let (Some(id), Some(name)) = (artist.id.clone(), artist.name.clone()) else {
            continue;
        };
        signals.observe(ObservedArtist {
            spotify_id: id.clone(),
            name,
            image_url: None,
        });
        ids.push(id);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::models::ArtistRef;
    use async_trait::async_trait;

    /// Upstream fake with per-source canned results.
    #[derive(Default)]
    struct FakeApi {
        top_short: Vec<ArtistObject>,
        top_medium: Vec<ArtistObject>,
        top_long: Vec<ArtistObject>,
        followed: Vec<ArtistObject>,
        recent: Vec<TrackObject>,
        saved: Vec<TrackObject>,
        playlist: Vec<TrackObject>,
        recent_fails: bool,
        all_expired: bool,
    }

    fn artist(id: &str, name: &str) -> ArtistObject {
        ArtistObject {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            images: Vec::new(),
        }
    }

    fn track(artist_ids: &[&str]) -> TrackObject {
        TrackObject {
            artists: artist_ids
                .iter()
                .map(|id| ArtistRef {
                    id: Some(id.to_string()),
                    name: Some(format!("artist {}", id)),
                })
                .collect(),
        }
    }

    #[async_trait]
    impl SpotifyApi for FakeApi {
        async fn top_artists(
            &self,
            _: &str,
            range: TimeRange,
        ) -> Result<Vec<ArtistObject>, UpstreamError> {
            if self.all_expired {
                return Err(UpstreamError::TokenExpired);
            }
            Ok(match range {
                TimeRange::Short => self.top_short.clone(),
                TimeRange::Medium => self.top_medium.clone(),
                TimeRange::Long => self.top_long.clone(),
            })
        }
        async fn followed_artists(&self, _: &str) -> Result<Vec<ArtistObject>, UpstreamError> {
            Ok(self.followed.clone())
        }
        async fn recently_played(&self, _: &str) -> Result<Vec<TrackObject>, UpstreamError> {
            if self.recent_fails {
                return Err(UpstreamError::Unavailable("boom".to_string()));
            }
            Ok(self.recent.clone())
        }
        async fn saved_tracks(&self, _: &str) -> Result<Vec<TrackObject>, UpstreamError> {
            Ok(self.saved.clone())
        }
        async fn playlist_tracks(&self, _: &str) -> Result<Vec<TrackObject>, UpstreamError> {
            Ok(self.playlist.clone())
        }
        async fn refresh_access_token(&self, _: &str) -> Result<String, UpstreamError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_artists_across_sources_are_deduplicated() {
        let api = FakeApi {
            top_short: vec![artist("a1", "Caparezza")],
            recent: vec![track(&["a1"]), track(&["a2"])],
            ..FakeApi::default()
        };
        let aggregator = SignalAggregator::new(Arc::new(api));

        let signals = aggregator.fetch_signals("token").await.unwrap();

        assert_eq!(signals.len(), 2);
        assert_eq!(signals.counts_for("a1").recent_plays, 1);
    }

    #[tokio::test]
    async fn test_failed_source_degrades_to_empty() {
        let api = FakeApi {
            top_short: vec![artist("a1", "Caparezza")],
            recent_fails: true,
            saved: vec![track(&["a1"])],
            ..FakeApi::default()
        };
        let aggregator = SignalAggregator::new(Arc::new(api));

        let signals = aggregator.fetch_signals("token").await.unwrap();

        // The failed recently-played source contributes nothing, the rest
        // of the aggregation still happens.
        assert_eq!(signals.counts_for("a1").recent_plays, 0);
        assert_eq!(signals.counts_for("a1").saved_tracks, 1);
        assert_eq!(signals.sources_failed(), 1);
    }

    #[tokio::test]
    async fn test_expired_token_aborts_the_aggregation() {
        let api = FakeApi {
            all_expired: true,
            ..FakeApi::default()
        };
        let aggregator = SignalAggregator::new(Arc::new(api));

        let result = aggregator.fetch_signals("token").await;
        assert!(matches!(result, Err(UpstreamError::TokenExpired)));
    }

    #[tokio::test]
    async fn test_followed_artists_are_flagged() {
        let api = FakeApi {
            followed: vec![artist("a1", "Caparezza")],
            ..FakeApi::default()
        };
        let aggregator = SignalAggregator::new(Arc::new(api));

        let signals = aggregator.fetch_signals("token").await.unwrap();
        assert!(signals.counts_for("a1").followed);
    }
}
