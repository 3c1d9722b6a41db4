//! Thin HTTP surface over the sync pipeline.
//!
//! Only the operations the core owns are exposed here; authentication
//! middleware and the rest of the product API live elsewhere.

use crate::cache::ScoredArtist;
use crate::store::Platform;
use crate::sync::{SyncError, SyncService};
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_PAGE_LIMIT: usize = 50;
const MAX_PAGE_LIMIT: usize = 100;

#[derive(Clone)]
struct AppState {
    sync: SyncService,
}

pub async fn run_server(
    sync: SyncService,
    port: u16,
    cancellation_token: CancellationToken,
) -> Result<()> {
    let app = Router::new()
        .route("/users/{user_id}/artists", get(get_artists))
        .route(
            "/users/{user_id}/artists/{artist_id}/selected",
            put(put_selected),
        )
        .route("/users/{user_id}/connection", post(post_connection))
        .route("/users/{user_id}/connection", delete(delete_connection))
        .with_state(AppState { sync });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ArtistsResponse {
    items: Vec<ScoredArtist>,
    total: usize,
    page: usize,
    limit: usize,
    is_stale: bool,
}

async fn get_artists(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ArtistsResponse>, ApiError> {
    let page = query.page.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);

    let result = state.sync.artists_page(&user_id, page, limit).await?;
    Ok(Json(ArtistsResponse {
        items: result.items,
        total: result.total,
        page,
        limit,
        is_stale: result.is_stale,
    }))
}

#[derive(Debug, Deserialize)]
struct SelectedBody {
    selected: bool,
}

async fn put_selected(
    State(state): State<AppState>,
    Path((user_id, artist_id)): Path<(String, String)>,
    Json(body): Json<SelectedBody>,
) -> Result<StatusCode, ApiError> {
    state.sync.set_selected(&user_id, &artist_id, body.selected)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ConnectionBody {
    platform: Platform,
    access_token: String,
    refresh_token: String,
}

async fn post_connection(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(body): Json<ConnectionBody>,
) -> Result<StatusCode, ApiError> {
    state.sync.connect(
        &user_id,
        body.platform,
        &body.access_token,
        &body.refresh_token,
    )?;
    Ok(StatusCode::CREATED)
}

async fn delete_connection(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sync.disconnect(&user_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

struct ApiError(SyncError);

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SyncError::NotConnected => StatusCode::NOT_FOUND,
            SyncError::UnknownArtist => StatusCode::NOT_FOUND,
            // Actionable for the client: the user has to reconnect.
            SyncError::ReconnectRequired => StatusCode::CONFLICT,
            SyncError::UpstreamUnavailable(_) | SyncError::EmptyAggregation => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}
