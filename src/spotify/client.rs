//! HTTP client for the Spotify Web API.
//!
//! Every call carries the client-wide request timeout; page sizes are capped
//! at the platform maximum of 50 items per call.

use super::models::{
    ArtistObject, FollowedArtistsResponse, PagedArtists, PlaylistTracksResponse,
    PlaylistsResponse, RecentlyPlayedResponse, SavedTracksResponse, TimeRange,
    TokenErrorResponse, TokenRefreshResponse, TrackObject,
};
use super::UpstreamError;
use crate::config::SpotifySettings;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Upstream music-platform API surface consumed by the sync pipeline.
///
/// Kept behind a trait so the aggregation and token layers can be exercised
/// against fakes.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn top_artists(
        &self,
        access_token: &str,
        range: TimeRange,
    ) -> Result<Vec<ArtistObject>, UpstreamError>;

    async fn followed_artists(&self, access_token: &str)
        -> Result<Vec<ArtistObject>, UpstreamError>;

    async fn recently_played(&self, access_token: &str)
        -> Result<Vec<TrackObject>, UpstreamError>;

    async fn saved_tracks(&self, access_token: &str) -> Result<Vec<TrackObject>, UpstreamError>;

    /// Tracks gathered from the user's playlists, bounded by the configured
    /// playlist scan cap. A cost/completeness trade-off, not full coverage.
    async fn playlist_tracks(&self, access_token: &str)
        -> Result<Vec<TrackObject>, UpstreamError>;

    /// Exchange the refresh token for a new access token.
    ///
    /// An `invalid_grant` response means the user revoked the grant; that is
    /// terminal and must not be retried.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, UpstreamError>;
}

pub struct SpotifyClient {
    client: reqwest::Client,
    api_base: String,
    accounts_base: String,
    client_id: String,
    client_secret: String,
    page_limit: usize,
    playlist_scan_cap: usize,
}

impl SpotifyClient {
    pub fn new(settings: &SpotifySettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: settings.api_base_url.trim_end_matches('/').to_string(),
            accounts_base: settings.accounts_base_url.trim_end_matches('/').to_string(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            page_limit: settings.page_limit.min(50),
            playlist_scan_cap: settings.playlist_scan_cap,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
    ) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(UpstreamError::TokenExpired),
            status if !status.is_success() => Err(UpstreamError::Unavailable(format!(
                "GET {} failed with status {}",
                url, status
            ))),
            _ => response
                .json()
                .await
                .map_err(|e| UpstreamError::Unavailable(format!("invalid payload: {}", e))),
        }
    }
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn top_artists(
        &self,
        access_token: &str,
        range: TimeRange,
    ) -> Result<Vec<ArtistObject>, UpstreamError> {
        let url = format!(
            "{}/v1/me/top/artists?time_range={}&limit={}",
            self.api_base,
            range.as_str(),
            self.page_limit
        );
        let body: PagedArtists = self.get_json(access_token, &url).await?;
        Ok(body.items)
    }

    async fn followed_artists(
        &self,
        access_token: &str,
    ) -> Result<Vec<ArtistObject>, UpstreamError> {
        let url = format!(
            "{}/v1/me/following?type=artist&limit={}",
            self.api_base, self.page_limit
        );
        let body: FollowedArtistsResponse = self.get_json(access_token, &url).await?;
        Ok(body.artists.items)
    }

    async fn recently_played(
        &self,
        access_token: &str,
    ) -> Result<Vec<TrackObject>, UpstreamError> {
        let url = format!(
            "{}/v1/me/player/recently-played?limit={}",
            self.api_base, self.page_limit
        );
        let body: RecentlyPlayedResponse = self.get_json(access_token, &url).await?;
        Ok(body.items.into_iter().filter_map(|item| item.track).collect())
    }

    async fn saved_tracks(&self, access_token: &str) -> Result<Vec<TrackObject>, UpstreamError> {
        let url = format!("{}/v1/me/tracks?limit={}", self.api_base, self.page_limit);
        let body: SavedTracksResponse = self.get_json(access_token, &url).await?;
        Ok(body.items.into_iter().filter_map(|item| item.track).collect())
    }

    async fn playlist_tracks(
        &self,
        access_token: &str,
    ) -> Result<Vec<TrackObject>, UpstreamError> {
        let url = format!(
            "{}/v1/me/playlists?limit={}",
            self.api_base, self.playlist_scan_cap
        );
        let playlists: PlaylistsResponse = self.get_json(access_token, &url).await?;

        let mut tracks = Vec::new();
        for playlist in playlists.items.into_iter().take(self.playlist_scan_cap) {
            let Some(playlist_id) = playlist.id else {
                continue;
            };
            let url = format!(
                "{}/v1/playlists/{}/tracks?limit={}",
                self.api_base, playlist_id, self.page_limit
            );
            match self.get_json::<PlaylistTracksResponse>(access_token, &url).await {
                Ok(body) => {
                    tracks.extend(body.items.into_iter().filter_map(|item| item.track));
                }
                Err(UpstreamError::TokenExpired) => return Err(UpstreamError::TokenExpired),
                Err(e) => {
                    // One unreadable playlist does not void the rest of the scan.
                    warn!("Skipping playlist {}: {}", playlist_id, e);
                }
            }
        }
        debug!("Collected {} playlist tracks", tracks.len());
        Ok(tracks)
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, UpstreamError> {
        let url = format!("{}/api/token", self.accounts_base);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: TokenRefreshResponse = response
                .json()
                .await
                .map_err(|e| UpstreamError::Unavailable(format!("invalid token payload: {}", e)))?;
            return Ok(body.access_token);
        }

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let body: TokenErrorResponse = response.json().await.unwrap_or(TokenErrorResponse {
                error: None,
            });
            if body.error.as_deref() == Some("invalid_grant") {
                return Err(UpstreamError::TokenRevoked);
            }
            return Err(UpstreamError::Unavailable(format!(
                "token refresh rejected: {}",
                body.error.unwrap_or_else(|| status.to_string())
            )));
        }

        Err(UpstreamError::Unavailable(format!(
            "token refresh failed with status {}",
            status
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_urls_are_trimmed() {
        let settings = SpotifySettings {
            api_base_url: "https://api.spotify.com/".to_string(),
            ..SpotifySettings::for_tests()
        };
        let client = SpotifyClient::new(&settings).unwrap();
        assert_eq!(client.api_base(), "https://api.spotify.com");
    }

    #[test]
    fn test_page_limit_is_capped_at_platform_maximum() {
        let settings = SpotifySettings {
            page_limit: 500,
            ..SpotifySettings::for_tests()
        };
        let client = SpotifyClient::new(&settings).unwrap();
        assert_eq!(client.page_limit, 50);
    }
}
