//! Access-token lifecycle around upstream requests.
//!
//! A request is attempted with the stored access token; on an expired-token
//! signal exactly one refresh is performed and the request retried once. A
//! revoked grant is terminal: the disconnect hook fires and no further
//! retries happen.

use super::client::SpotifyApi;
use super::UpstreamError;
use crate::store::ConnectionStore;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Invoked when a refresh attempt reports a revoked grant.
///
/// The implementation removes the platform connection and invalidates the
/// user's cache entry; it lives outside the token layer.
pub trait DisconnectHook: Send + Sync {
    fn connection_revoked(&self, user_id: &str);
}

#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("user has no platform connection")]
    NotConnected,
    #[error("platform connection revoked")]
    Revoked,
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error("connection store error: {0}")]
    Store(String),
}

pub struct TokenManager {
    api: Arc<dyn SpotifyApi>,
    connections: Arc<dyn ConnectionStore>,
    disconnect: Arc<dyn DisconnectHook>,
}

impl TokenManager {
    pub fn new(
        api: Arc<dyn SpotifyApi>,
        connections: Arc<dyn ConnectionStore>,
        disconnect: Arc<dyn DisconnectHook>,
    ) -> Self {
        Self {
            api,
            connections,
            disconnect,
        }
    }

    /// Run `request` with the user's access token, refreshing it at most once.
    pub async fn with_auto_refresh<T, F, Fut>(
        &self,
        user_id: &str,
        request: F,
    ) -> Result<T, TokenError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>> + Send,
    {
        let connection = self
            .connections
            .get(user_id)
            .map_err(|e| TokenError::Store(e.to_string()))?
            .ok_or(TokenError::NotConnected)?;

        match request(connection.access_token.clone()).await {
            Ok(value) => Ok(value),
            Err(UpstreamError::TokenExpired) => {
                debug!("Access token expired for user {}, refreshing", user_id);
                match self.api.refresh_access_token(&connection.refresh_token).await {
                    Ok(new_token) => {
                        self.connections
                            .update_access_token(user_id, &new_token)
                            .map_err(|e| TokenError::Store(e.to_string()))?;
                        info!("Refreshed access token for user {}", user_id);
                        match request(new_token).await {
                            Ok(value) => Ok(value),
                            // A freshly minted token being rejected again is
                            // upstream misbehavior, not a retry trigger.
                            Err(UpstreamError::TokenExpired | UpstreamError::TokenRevoked) => {
                                Err(TokenError::Unavailable(
                                    "token rejected immediately after refresh".to_string(),
                                ))
                            }
                            Err(UpstreamError::Unavailable(e)) => Err(TokenError::Unavailable(e)),
                        }
                    }
                    Err(UpstreamError::TokenRevoked) => {
                        warn!("Refresh grant revoked for user {}, disconnecting", user_id);
                        self.disconnect.connection_revoked(user_id);
                        Err(TokenError::Revoked)
                    }
                    Err(e) => Err(TokenError::Unavailable(e.to_string())),
                }
            }
            Err(UpstreamError::TokenRevoked) => {
                warn!("Connection revoked for user {}, disconnecting", user_id);
                self.disconnect.connection_revoked(user_id);
                Err(TokenError::Revoked)
            }
            Err(UpstreamError::Unavailable(e)) => Err(TokenError::Unavailable(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::models::{ArtistObject, TimeRange, TrackObject};
    use crate::store::{Platform, PlatformConnection, SqliteFanStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted upstream: each signal endpoint is unused, only the refresh
    /// endpoint matters here.
    struct ScriptedApi {
        refresh_result: Mutex<Option<Result<String, UpstreamError>>>,
        refresh_calls: AtomicU32,
    }

    impl ScriptedApi {
        fn new(refresh_result: Result<String, UpstreamError>) -> Self {
            Self {
                refresh_result: Mutex::new(Some(refresh_result)),
                refresh_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SpotifyApi for ScriptedApi {
        async fn top_artists(
            &self,
            _: &str,
            _: TimeRange,
        ) -> Result<Vec<ArtistObject>, UpstreamError> {
            unimplemented!()
        }
        async fn followed_artists(&self, _: &str) -> Result<Vec<ArtistObject>, UpstreamError> {
            unimplemented!()
        }
        async fn recently_played(&self, _: &str) -> Result<Vec<TrackObject>, UpstreamError> {
            unimplemented!()
        }
        async fn saved_tracks(&self, _: &str) -> Result<Vec<TrackObject>, UpstreamError> {
            unimplemented!()
        }
        async fn playlist_tracks(&self, _: &str) -> Result<Vec<TrackObject>, UpstreamError> {
            unimplemented!()
        }
        async fn refresh_access_token(&self, _: &str) -> Result<String, UpstreamError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(UpstreamError::Unavailable("exhausted".to_string())))
        }
    }

    #[derive(Default)]
    struct RecordingHook {
        revoked_users: Mutex<Vec<String>>,
    }

    impl DisconnectHook for RecordingHook {
        fn connection_revoked(&self, user_id: &str) {
            self.revoked_users.lock().unwrap().push(user_id.to_string());
        }
    }

    fn store_with_connection(user_id: &str) -> Arc<SqliteFanStore> {
        let store = Arc::new(SqliteFanStore::new_in_memory().unwrap());
        ConnectionStore::upsert(
            store.as_ref(),
            &PlatformConnection {
                user_id: user_id.to_string(),
                platform: Platform::Spotify,
                access_token: "stale-token".to_string(),
                refresh_token: "refresh-token".to_string(),
            },
        )
        .unwrap();
        store
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_retried_once() {
        let store = store_with_connection("user-1");
        let api = Arc::new(ScriptedApi::new(Ok("fresh-token".to_string())));
        let hook = Arc::new(RecordingHook::default());
        let manager = TokenManager::new(api.clone(), store.clone(), hook.clone());

        let attempts = AtomicU32::new(0);
        let result = manager
            .with_auto_refresh("user-1", |token| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        assert_eq!(token, "stale-token");
                        Err(UpstreamError::TokenExpired)
                    } else {
                        assert_eq!(token, "fresh-token");
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        // The new token was persisted.
        let connection = ConnectionStore::get(store.as_ref(), "user-1")
            .unwrap()
            .unwrap();
        assert_eq!(connection.access_token, "fresh-token");
        assert!(hook.revoked_users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_revoked_grant_disconnects_without_retrying() {
        let store = store_with_connection("user-1");
        let api = Arc::new(ScriptedApi::new(Err(UpstreamError::TokenRevoked)));
        let hook = Arc::new(RecordingHook::default());
        let manager = TokenManager::new(api.clone(), store.clone(), hook.clone());

        let attempts = AtomicU32::new(0);
        let result: Result<u32, TokenError> = manager
            .with_auto_refresh("user-1", |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(UpstreamError::TokenExpired) }
            })
            .await;

        assert!(matches!(result, Err(TokenError::Revoked)));
        // One original attempt, no retry after the failed refresh.
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(
            hook.revoked_users.lock().unwrap().as_slice(),
            ["user-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces_as_unavailable() {
        let store = store_with_connection("user-1");
        let api = Arc::new(ScriptedApi::new(Err(UpstreamError::Unavailable(
            "503".to_string(),
        ))));
        let hook = Arc::new(RecordingHook::default());
        let manager = TokenManager::new(api, store, hook.clone());

        let result: Result<u32, TokenError> = manager
            .with_auto_refresh("user-1", |_| async {
                Err(UpstreamError::TokenExpired)
            })
            .await;

        assert!(matches!(result, Err(TokenError::Unavailable(_))));
        assert!(hook.revoked_users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_connection_is_a_noop() {
        let store = Arc::new(SqliteFanStore::new_in_memory().unwrap());
        let api = Arc::new(ScriptedApi::new(Ok("unused".to_string())));
        let hook = Arc::new(RecordingHook::default());
        let manager = TokenManager::new(api, store, hook);

        let result: Result<u32, TokenError> = manager
            .with_auto_refresh("ghost", |_| async { Ok(1u32) })
            .await;

        assert!(matches!(result, Err(TokenError::NotConnected)));
    }
}
