use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Streaming platform an artist id or connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Spotify,
    AppleMusic,
    Deezer,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Spotify => "spotify",
            Platform::AppleMusic => "apple_music",
            Platform::Deezer => "deezer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spotify" => Some(Platform::Spotify),
            "apple_music" => Some(Platform::AppleMusic),
            "deezer" => Some(Platform::Deezer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Global, platform-agnostic artist record shared across all users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistCatalogEntry {
    pub id: String,
    pub name: String,
    pub spotify_id: Option<String>,
    pub apple_music_id: Option<String>,
    pub deezer_id: Option<String>,
    pub image_url: Option<String>,
}

impl ArtistCatalogEntry {
    /// The entry's id on the given platform, if known.
    pub fn platform_id(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Spotify => self.spotify_id.as_deref(),
            Platform::AppleMusic => self.apple_music_id.as_deref(),
            Platform::Deezer => self.deezer_id.as_deref(),
        }
    }
}

/// A user's relationship with a catalog artist.
///
/// `fanitude_points` and `last_listening_minutes` are rewritten on every
/// sync from the current listening window, never accumulated, so the value
/// stays directly comparable across users (1 point = 1 minute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFollow {
    pub user_id: String,
    pub artist_id: String,
    pub fanitude_points: i64,
    pub last_listening_minutes: i64,
    pub last_sync_at: DateTime<Utc>,
}

/// Streaming-platform credentials owned by a user.
///
/// Destroyed on token revocation or explicit disconnect; its absence makes
/// the whole sync pipeline a no-op for that user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConnection {
    pub user_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_serializes_including_timestamp() {
        let follow = UserFollow {
            user_id: "user-1".to_string(),
            artist_id: "art-1".to_string(),
            fanitude_points: 12,
            last_listening_minutes: 12,
            last_sync_at: Utc::now(),
        };

        let json = serde_json::to_string(&follow).unwrap();
        let back: UserFollow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, follow);
    }

    #[test]
    fn test_platform_wire_names() {
        assert_eq!(
            serde_json::from_str::<Platform>("\"spotify\"").unwrap(),
            Platform::Spotify
        );
        assert_eq!(
            serde_json::to_string(&Platform::AppleMusic).unwrap(),
            "\"apple_music\""
        );
    }
}
