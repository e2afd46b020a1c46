use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::state::AppState;

/// Assemble the API router.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos", get(handlers::list_videos))
        .route("/api/videos/{id}", get(handlers::get_video))
        .route("/api/videos/stream/{*path}", get(handlers::stream_video))
        .route("/api/credentials", post(handlers::set_credentials))
        .with_state(state)
}
