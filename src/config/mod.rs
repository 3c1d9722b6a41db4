//! Configuration resolution.
//!
//! CLI arguments provide the baseline; an optional TOML file overrides them
//! where present. Feature settings come with defaults so a minimal config
//! still runs.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI arguments that participate in config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
}

/// Optional TOML file config. Every field overrides the CLI when present.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,
    pub port: Option<u16>,

    pub cache: Option<CacheConfig>,
    pub spotify: Option<SpotifyConfig>,
    pub sync: Option<SyncConfig>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: Option<u64>,
    pub dead_after_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_base_url: Option<String>,
    pub accounts_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub page_limit: Option<usize>,
    pub playlist_scan_cap: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub deadline_secs: Option<u64>,
}

/// Cache freshness settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Entry time-to-live before it is served as stale.
    pub ttl_secs: u64,
    /// Idle period after which an untouched entry is swept.
    pub dead_after_secs: u64,
    /// Interval between sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3 * 60 * 60,
            dead_after_secs: 6 * 60 * 60,
            sweep_interval_secs: 30 * 60,
        }
    }
}

/// Upstream platform API settings.
#[derive(Debug, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: String,
    pub accounts_base_url: String,
    pub request_timeout_secs: u64,
    /// Items per page, capped by the client at the platform maximum of 50.
    pub page_limit: usize,
    /// Number of playlists inspected per sync.
    pub playlist_scan_cap: usize,
}

impl SpotifySettings {
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            api_base_url: "https://api.spotify.com".to_string(),
            accounts_base_url: "https://accounts.spotify.com".to_string(),
            request_timeout_secs: 10,
            page_limit: 50,
            playlist_scan_cap: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Overall deadline for one per-user sync pipeline run.
    pub deadline_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { deadline_secs: 30 }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub cache: CacheSettings,
    pub spotify: SpotifySettings,
    pub sync: SyncSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present. Spotify
    /// credentials come from the file or from the environment
    /// (`SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET`).
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        let port = file.port.unwrap_or(cli.port);

        let cache_file = file.cache.unwrap_or_default();
        let cache_defaults = CacheSettings::default();
        let cache = CacheSettings {
            ttl_secs: cache_file.ttl_secs.unwrap_or(cache_defaults.ttl_secs),
            dead_after_secs: cache_file
                .dead_after_secs
                .unwrap_or(cache_defaults.dead_after_secs),
            sweep_interval_secs: cache_file
                .sweep_interval_secs
                .unwrap_or(cache_defaults.sweep_interval_secs),
        };
        if cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be greater than zero");
        }

        let spotify_file = file.spotify.unwrap_or_default();
        let client_id = spotify_file
            .client_id
            .or_else(|| std::env::var("SPOTIFY_CLIENT_ID").ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Spotify client id missing: set [spotify].client_id or SPOTIFY_CLIENT_ID"
                )
            })?;
        let client_secret = spotify_file
            .client_secret
            .or_else(|| std::env::var("SPOTIFY_CLIENT_SECRET").ok())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Spotify client secret missing: set [spotify].client_secret or SPOTIFY_CLIENT_SECRET"
                )
            })?;
        let spotify = SpotifySettings {
            client_id,
            client_secret,
            api_base_url: spotify_file
                .api_base_url
                .unwrap_or_else(|| "https://api.spotify.com".to_string()),
            accounts_base_url: spotify_file
                .accounts_base_url
                .unwrap_or_else(|| "https://accounts.spotify.com".to_string()),
            request_timeout_secs: spotify_file.request_timeout_secs.unwrap_or(10),
            page_limit: spotify_file.page_limit.unwrap_or(50),
            playlist_scan_cap: spotify_file.playlist_scan_cap.unwrap_or(10),
        };

        let sync_file = file.sync.unwrap_or_default();
        let sync = SyncSettings {
            deadline_secs: sync_file
                .deadline_secs
                .unwrap_or(SyncSettings::default().deadline_secs),
        };

        Ok(Self {
            db_path,
            port,
            cache,
            spotify,
            sync,
        })
    }
}
