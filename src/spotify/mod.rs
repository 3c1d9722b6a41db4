mod aggregator;
mod client;
mod models;
mod token;

pub use aggregator::SignalAggregator;
pub use client::{SpotifyApi, SpotifyClient};
pub use models::{
    ArtistObject, ArtistRef, ImageObject, ObservedArtist, SignalCounts, SignalSet, TimeRange,
    TrackObject,
};
pub use token::{DisconnectHook, TokenError, TokenManager};

use thiserror::Error;

/// Failure modes of a single upstream call.
///
/// `TokenExpired` is recoverable locally via one refresh and retry and is
/// never surfaced to callers. `TokenRevoked` is terminal for the connection.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("access token expired")]
    TokenExpired,
    #[error("refresh token revoked")]
    TokenRevoked,
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}
