use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use crate::{
    server::AppState,
    transport::routes::{channels, downloads},
};

pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/resolve", get(channels::resolve_channel))
        .route("/refresh", post(channels::refresh_feeds))
        .route("/videos/{video_id}/qualities", get(downloads::get_qualities))
        .route(
            "/videos/{video_id}/download",
            post(downloads::request_download),
        )
        .route(
            "/videos/{video_id}/progress",
            get(downloads::progress_stream),
        )
        .route("/download/{video_id}", get(downloads::download_redirect));

    Router::new()
        .nest("/api", api_routes)
        .route("/version", get(get_version))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
