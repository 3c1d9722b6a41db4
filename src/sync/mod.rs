//! Per-user sync pipeline orchestration.
//!
//! A read request probes the cache first; on a miss or stale hit a resync
//! pulls signals upstream, reconciles them against the catalog, scores every
//! candidate and atomically replaces the cache entry. Concurrent cache-miss
//! callers for one user coalesce into a single in-flight resync; the shared
//! resync runs on its own task so it completes and populates the cache even
//! if the caller that started it goes away.

use crate::cache::{ArtistCache, CachePage, ScoredArtist};
use crate::reconcile::CatalogReconciler;
use crate::scoring;
use crate::spotify::{
    DisconnectHook, SignalAggregator, SpotifyApi, TokenError, TokenManager,
};
use crate::store::{
    CatalogStore, ConnectionStore, FollowStore, Platform, PlatformConnection, UserFollow,
};
use chrono::Utc;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("user has no platform connection")]
    NotConnected,
    #[error("platform connection revoked, reconnect required")]
    ReconnectRequired,
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("aggregation returned no signals")]
    EmptyAggregation,
    #[error("unknown artist")]
    UnknownArtist,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for SyncError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::NotConnected => SyncError::NotConnected,
            TokenError::Revoked => SyncError::ReconnectRequired,
            TokenError::Unavailable(e) => SyncError::UpstreamUnavailable(e),
            TokenError::Store(e) => SyncError::Internal(e),
        }
    }
}

/// Disconnect side effect shared by the revocation path and the explicit
/// disconnect operation: drop the connection, drop the cache entry.
struct Disconnector {
    connections: Arc<dyn ConnectionStore>,
    cache: Arc<ArtistCache>,
}

impl Disconnector {
    fn disconnect(&self, user_id: &str) -> bool {
        let deleted = match self.connections.delete(user_id) {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to delete connection for user {}: {}", user_id, e);
                false
            }
        };
        self.cache.invalidate(user_id);
        deleted
    }
}

impl DisconnectHook for Disconnector {
    fn connection_revoked(&self, user_id: &str) {
        info!("Disconnecting user {} after revoked grant", user_id);
        self.disconnect(user_id);
    }
}

type FlightResult = Result<(), SyncError>;
type FlightFuture = Shared<BoxFuture<'static, FlightResult>>;

struct Inner {
    cache: Arc<ArtistCache>,
    catalog: Arc<dyn CatalogStore>,
    follows: Arc<dyn FollowStore>,
    connections: Arc<dyn ConnectionStore>,
    aggregator: SignalAggregator,
    token_manager: TokenManager,
    reconciler: CatalogReconciler,
    disconnector: Arc<Disconnector>,
    sync_deadline: Duration,
    flights: Mutex<HashMap<String, FlightFuture>>,
}

#[derive(Clone)]
pub struct SyncService {
    inner: Arc<Inner>,
}

impl SyncService {
    pub fn new(
        cache: Arc<ArtistCache>,
        catalog: Arc<dyn CatalogStore>,
        follows: Arc<dyn FollowStore>,
        connections: Arc<dyn ConnectionStore>,
        api: Arc<dyn SpotifyApi>,
        sync_deadline: Duration,
    ) -> Self {
        let disconnector = Arc::new(Disconnector {
            connections: connections.clone(),
            cache: cache.clone(),
        });
        let token_manager =
            TokenManager::new(api.clone(), connections.clone(), disconnector.clone());
        let aggregator = SignalAggregator::new(api);
        let reconciler = CatalogReconciler::new(catalog.clone(), follows.clone());

        Self {
            inner: Arc::new(Inner {
                cache,
                catalog,
                follows,
                connections,
                aggregator,
                token_manager,
                reconciler,
                disconnector,
                sync_deadline,
                flights: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The user's scored artist list, paginated.
    ///
    /// Fresh cache hits return immediately. A miss or stale hit triggers (or
    /// joins) a resync; any failure to produce a fresh result falls back to
    /// the existing cache entry before surfacing an error.
    pub async fn artists_page(
        &self,
        user_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<CachePage, SyncError> {
        if let Some(hit) = self.inner.cache.get(user_id, page, limit) {
            if !hit.is_stale {
                return Ok(hit);
            }
        }

        match self.join_flight(user_id).await {
            Ok(()) => self
                .inner
                .cache
                .get(user_id, page, limit)
                .ok_or_else(|| SyncError::Internal("cache entry missing after sync".to_string())),
            Err(SyncError::EmptyAggregation) => {
                // Unknown, not "no artists": prefer whatever the cache still
                // holds; a genuinely signal-less user gets an empty page.
                Ok(self
                    .inner
                    .cache
                    .get(user_id, page, limit)
                    .unwrap_or(CachePage {
                        items: Vec::new(),
                        total: 0,
                        is_stale: false,
                    }))
            }
            Err(err) => {
                if matches!(err, SyncError::UpstreamUnavailable(_)) {
                    self.inner.cache.mark_stale(user_id);
                }
                match self.inner.cache.get(user_id, page, limit) {
                    Some(fallback) => {
                        warn!("Serving stale artist cache for user {}: {}", user_id, err);
                        Ok(fallback)
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Store platform credentials for a user. Any cached list predates the
    /// new connection and is dropped.
    pub fn connect(
        &self,
        user_id: &str,
        platform: Platform,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), SyncError> {
        self.inner
            .connections
            .upsert(&PlatformConnection {
                user_id: user_id.to_string(),
                platform,
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
            })
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        self.inner.cache.invalidate(user_id);
        Ok(())
    }

    /// Explicit disconnect. Returns true if a connection existed.
    pub fn disconnect(&self, user_id: &str) -> bool {
        self.inner.disconnector.disconnect(user_id)
    }

    /// Toggle an artist's selection: creates or deletes the follow row and
    /// mirrors the flag into the cached list without touching its freshness.
    pub fn set_selected(
        &self,
        user_id: &str,
        artist_id: &str,
        selected: bool,
    ) -> Result<(), SyncError> {
        if selected {
            let artist = self
                .inner
                .catalog
                .get_artist(artist_id)
                .map_err(|e| SyncError::Internal(e.to_string()))?
                .ok_or(SyncError::UnknownArtist)?;
            // Points stay at zero until the next sync snapshots them.
            self.inner
                .follows
                .upsert(&UserFollow {
                    user_id: user_id.to_string(),
                    artist_id: artist.id,
                    fanitude_points: 0,
                    last_listening_minutes: 0,
                    last_sync_at: Utc::now(),
                })
                .map_err(|e| SyncError::Internal(e.to_string()))?;
        } else {
            self.inner
                .follows
                .delete(user_id, artist_id)
                .map_err(|e| SyncError::Internal(e.to_string()))?;
        }
        self.inner.cache.update_selected(user_id, artist_id, selected);
        Ok(())
    }

    /// Join the in-flight resync for this user, starting one if none exists.
    fn join_flight(&self, user_id: &str) -> FlightFuture {
        let mut flights = self.inner.flights.lock().unwrap();
        if let Some(flight) = flights.get(user_id) {
            return flight.clone();
        }

        // Spawned so the resync completes and populates the cache even if
        // every waiter is dropped.
        let inner = self.inner.clone();
        let uid = user_id.to_string();
        let handle = tokio::spawn(async move { inner.resync(&uid).await });
        let flight: FlightFuture = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(SyncError::Internal(format!("resync task failed: {}", e))),
            }
        }
        .boxed()
        .shared();
        flights.insert(user_id.to_string(), flight.clone());

        let inner = self.inner.clone();
        let uid = user_id.to_string();
        let done = flight.clone();
        tokio::spawn(async move {
            let _ = done.await;
            inner.flights.lock().unwrap().remove(&uid);
        });

        flight
    }
}

impl Inner {
    async fn resync(&self, user_id: &str) -> FlightResult {
        match tokio::time::timeout(self.sync_deadline, self.resync_pipeline(user_id)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::UpstreamUnavailable(
                "sync deadline exceeded".to_string(),
            )),
        }
    }

    async fn resync_pipeline(&self, user_id: &str) -> FlightResult {
        let signals = self
            .token_manager
            .with_auto_refresh(user_id, |token| {
                let aggregator = self.aggregator.clone();
                async move { aggregator.fetch_signals(&token).await }
            })
            .await?;

        if signals.is_empty() {
            return Err(SyncError::EmptyAggregation);
        }

        let observed: Vec<_> = signals.observed_artists().into_iter().cloned().collect();
        let entries = self
            .reconciler
            .reconcile(user_id, &observed)
            .map_err(|e| SyncError::Internal(e.to_string()))?;

        // Snapshot the persisted score for every surviving follow from the
        // current window only; never accumulated.
        let follows_now = self
            .follows
            .list_by_user(user_id)
            .map_err(|e| SyncError::Internal(e.to_string()))?;
        let spotify_id_by_artist: HashMap<&str, &str> = entries
            .iter()
            .filter_map(|e| e.spotify_id.as_deref().map(|sp| (e.id.as_str(), sp)))
            .collect();
        let now = Utc::now();
        for follow in &follows_now {
            let minutes = spotify_id_by_artist
                .get(follow.artist_id.as_str())
                .map(|sp| scoring::listening_minutes(signals.counts_for(sp).recent_plays))
                .unwrap_or(0);
            self.follows
                .upsert(&UserFollow {
                    user_id: user_id.to_string(),
                    artist_id: follow.artist_id.clone(),
                    fanitude_points: minutes as i64,
                    last_listening_minutes: minutes as i64,
                    last_sync_at: now,
                })
                .map_err(|e| SyncError::Internal(e.to_string()))?;
        }

        let selected_ids: HashSet<&str> =
            follows_now.iter().map(|f| f.artist_id.as_str()).collect();
        let mut scored: Vec<ScoredArtist> = entries
            .iter()
            .map(|entry| {
                let spotify_id = entry.spotify_id.clone().unwrap_or_default();
                let counts = signals.counts_for(&spotify_id);
                ScoredArtist {
                    artist_id: entry.id.clone(),
                    spotify_id,
                    name: entry.name.clone(),
                    image_url: entry.image_url.clone(),
                    score: scoring::rank_score(&counts),
                    selected: selected_ids.contains(entry.id.as_str()),
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.artist_id.cmp(&b.artist_id))
        });

        info!("Synced {} artists for user {}", scored.len(), user_id);
        self.cache.set(user_id, scored);
        Ok(())
    }
}
