//! Request handlers. These are the only place deciding client-visible
//! status codes; the scanner, cache, and resolver below them degrade
//! instead of erroring.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use serde::Deserialize;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::media::IndexedVideo;
use crate::mount::Credentials;
use crate::state::AppState;
use crate::stream;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
}

/// `GET /api/videos?path=<relative>`
///
/// Serves the cached generation filtered to the requested subtree, so a
/// subtree view never reassigns ids.
pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<IndexedVideo>> {
    let subtree = query.path.trim_matches('/');
    let videos = state.index.get_all().await;

    let filtered: Vec<IndexedVideo> = if subtree.is_empty() {
        videos.as_ref().clone()
    } else {
        let prefix = format!("{subtree}/");
        videos
            .iter()
            .filter(|video| video.record.relative_path.starts_with(&prefix))
            .cloned()
            .collect()
    };

    info!(subtree, videos = filtered.len(), "listing videos");
    Json(filtered)
}

/// `GET /api/videos/{id}`
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> AppResult<Json<IndexedVideo>> {
    state
        .index
        .get_by_id(id)
        .map(Json)
        .ok_or_else(|| AppError::not_found("Video not found"))
}

/// `GET /api/videos/stream/{*path}`
///
/// Resolves the relative path against the effective root and hands off
/// to the range streaming responder. Streaming deliberately bypasses the
/// index cache so a stale generation never blocks playback.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(relative_path): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let relative_path = relative_path.trim_start_matches('/');
    if stream::is_traversal(relative_path) {
        return Err(AppError::bad_request("Invalid video path"));
    }

    let full_path = state.root.get().join(relative_path);
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    stream::stream_file(&full_path, range).await
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// `POST /api/credentials`
///
/// Re-resolves the effective root with the new credentials and forces
/// the next listing to rescan. In-flight requests keep the root they
/// already resolved.
pub async fn set_credentials(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> StatusCode {
    info!(username = %request.username, "updating share credentials");
    state
        .resolver
        .set_credentials(Credentials {
            username: request.username,
            password: request.password,
            domain: request.domain,
        })
        .await;
    state.index.invalidate();
    StatusCode::NO_CONTENT
}
