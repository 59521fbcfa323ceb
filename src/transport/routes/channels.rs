use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};

use crate::api::{ChannelRef, ChannelRefreshResult, RefreshReport, RefreshRequest, ResolveQuery};
use crate::common::ApiError;
use crate::server::AppState;
use crate::sources::youtube::ResolveError;

pub async fn resolve_channel(
    Query(params): Query<ResolveQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChannelRef>, ApiError> {
    tracing::info!("GET /api/resolve url={}", params.url);

    match state.youtube.resolve(&params.url).await {
        Ok(channel) => {
            tracing::debug!("Resolved {} to {} ({})", params.url, channel.id, channel.name);
            Ok(Json(channel))
        }
        Err(e @ ResolveError::NoChannelId(_)) => {
            tracing::warn!("GET /api/resolve: {}", e);
            Err(ApiError::not_found(e.to_string(), "/api/resolve"))
        }
        Err(e) => {
            tracing::warn!("GET /api/resolve: {}", e);
            Err(ApiError::internal(e.to_string(), "/api/resolve"))
        }
    }
}

/// Refresh a batch of channels. Channels are processed independently: one
/// failing to resolve, fetch or persist shows up in its own result slot and
/// never aborts the rest of the batch.
pub async fn refresh_feeds(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshReport>, ApiError> {
    if request.channels.is_empty() {
        return Err(ApiError::bad_request("no channels given", "/api/refresh"));
    }

    let limit = request.limit.unwrap_or(state.config.youtube.default_limit);
    let check_shorts = request
        .check_shorts
        .unwrap_or(state.config.youtube.check_shorts);

    tracing::info!(
        "POST /api/refresh: {} channel(s), limit={}, checkShorts={}",
        request.channels.len(),
        limit,
        check_shorts
    );

    let mut results = Vec::with_capacity(request.channels.len());
    for channel in &request.channels {
        results.push(refresh_one(&state, channel, limit, check_shorts).await);
    }

    Ok(Json(RefreshReport { channels: results }))
}

async fn refresh_one(
    state: &AppState,
    channel: &str,
    limit: usize,
    check_shorts: bool,
) -> ChannelRefreshResult {
    let (channel_ref, videos) = match state
        .youtube
        .refresh_channel(channel, limit, check_shorts)
        .await
    {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::warn!("Refresh failed for {}: {}", channel, e);
            return ChannelRefreshResult {
                channel: channel.to_string(),
                videos_found: 0,
                error: Some(e.to_string()),
            };
        }
    };

    let persisted = async {
        state.storage.upsert_channel(&channel_ref).await?;
        state.storage.upsert_videos(&channel_ref.id, &videos).await
    }
    .await;

    match persisted {
        Ok(_) => {
            tracing::debug!(
                "Refreshed {} ({}): {} video(s)",
                channel_ref.name,
                channel_ref.id,
                videos.len()
            );
            ChannelRefreshResult {
                channel: channel.to_string(),
                videos_found: videos.len(),
                error: None,
            }
        }
        Err(e) => {
            tracing::error!("Failed to persist refresh for {}: {}", channel_ref.id, e);
            ChannelRefreshResult {
                channel: channel.to_string(),
                videos_found: videos.len(),
                error: Some(e.to_string()),
            }
        }
    }
}
