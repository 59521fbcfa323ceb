use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Redirect, Response};
use futures::stream;
use futures::{Stream, StreamExt};
use tokio::sync::broadcast;

use crate::api::{JobStatus, ProgressUpdate, QualityQuery, QualitySnapshot};
use crate::common::ApiError;
use crate::download::DownloadError;
use crate::server::AppState;
use crate::sources::youtube::watch_url;

const DEFAULT_QUALITY: &str = "720";

pub async fn get_qualities(
    Path(video_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<QualitySnapshot> {
    tracing::debug!("GET /api/videos/{}/qualities", video_id);
    Json(state.downloads.get_qualities(&video_id))
}

pub async fn request_download(
    Path(video_id): Path<String>,
    Query(params): Query<QualityQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let quality = params
        .quality
        .unwrap_or_else(|| DEFAULT_QUALITY.to_string());
    let path = format!("/api/videos/{}/download", video_id);
    tracing::info!("POST {} quality={}", path, quality);

    match state.downloads.request_download(&video_id, &quality) {
        // Already cached: nothing to accept, report the finished job.
        Ok(job) if job.status == JobStatus::Complete => (StatusCode::OK, Json(job)).into_response(),
        Ok(job) => (StatusCode::ACCEPTED, Json(job)).into_response(),
        Err(e @ DownloadError::AlreadyActive { .. }) => {
            ApiError::conflict(e.to_string(), path).into_response()
        }
        Err(e @ DownloadError::UnsupportedQuality(_)) => {
            ApiError::bad_request(e.to_string(), path).into_response()
        }
    }
}

/// Live progress stream for one video. Emits named events `progress`
/// (non-terminal) and `status` (terminal) and closes right after the first
/// terminal event. A subscriber arriving mid-job is primed with the current
/// state, so a late attach after completion still gets its `status` event.
pub async fn progress_stream(
    Path(video_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("GET /api/videos/{}/progress", video_id);

    let rx = state.downloads.subscribe(&video_id);
    let primer = state.downloads.current(&video_id);

    let events = stream::unfold(Box::pin(updates(rx, primer)), |mut updates| async move {
        let update = updates.next().await?;
        let name = if update.is_terminal() { "status" } else { "progress" };
        match Event::default().event(name).json_data(&update) {
            Ok(event) => Some((Ok(event), updates)),
            Err(e) => {
                tracing::error!("Failed to serialize progress event: {}", e);
                None
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Ordered updates ending right after the first terminal one. Lagged
/// broadcast slots are skipped; the terminal event itself cannot lag past us
/// because the publisher stops after sending it.
fn updates(
    rx: broadcast::Receiver<ProgressUpdate>,
    primer: Option<ProgressUpdate>,
) -> impl Stream<Item = ProgressUpdate> {
    stream::unfold((rx, primer, false), |(mut rx, primer, done)| async move {
        if done {
            return None;
        }
        let update = match primer {
            Some(update) => update,
            None => loop {
                match rx.recv().await {
                    Ok(update) => break update,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Progress subscriber lagged by {} event(s)", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        };
        let terminal = update.is_terminal();
        Some((update, (rx, None, terminal)))
    })
}

/// Hand the caller a redirect to the direct media URL for ad-hoc playback,
/// bypassing the cache entirely.
pub async fn download_redirect(
    Path(video_id): Path<String>,
    Query(params): Query<QualityQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let quality = params
        .quality
        .unwrap_or_else(|| DEFAULT_QUALITY.to_string());
    let path = format!("/api/download/{}", video_id);
    tracing::info!("GET {} quality={}", path, quality);

    match state
        .ytdlp
        .get_download_url(&watch_url(&video_id), &quality)
        .await
    {
        Ok((url, _ext)) => Redirect::temporary(&url).into_response(),
        Err(e) => {
            tracing::error!("Stream url extraction failed for {}: {}", video_id, e);
            ApiError::internal(e.to_string(), path).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn update(status: JobStatus, percent: f64) -> ProgressUpdate {
        ProgressUpdate {
            quality: "720".to_string(),
            percent,
            status,
            error: None,
        }
    }

    #[tokio::test]
    async fn update_stream_closes_after_terminal() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(update(JobStatus::Queued, 0.0)).unwrap();
        tx.send(update(JobStatus::Downloading, 50.0)).unwrap();
        tx.send(update(JobStatus::Complete, 100.0)).unwrap();
        // Anything after the terminal event must never be seen.
        tx.send(update(JobStatus::Downloading, 10.0)).unwrap();

        let collected: Vec<ProgressUpdate> = updates(rx, None).collect().await;
        let statuses: Vec<JobStatus> = collected.iter().map(|u| u.status).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Queued,
                JobStatus::Downloading,
                JobStatus::Complete
            ]
        );
    }

    #[tokio::test]
    async fn primer_is_emitted_first() {
        let (tx, rx) = broadcast::channel(8);
        tx.send(update(JobStatus::Downloading, 60.0)).unwrap();

        let primer = update(JobStatus::Downloading, 55.0);
        let mut stream = Box::pin(updates(rx, Some(primer)));
        assert_eq!(stream.next().await.map(|u| u.percent), Some(55.0));
        assert_eq!(stream.next().await.map(|u| u.percent), Some(60.0));
    }

    #[tokio::test]
    async fn terminal_primer_closes_immediately() {
        let (_tx, rx) = broadcast::channel::<ProgressUpdate>(8);
        let primer = update(JobStatus::Error, 0.0);

        let collected: Vec<ProgressUpdate> = updates(rx, Some(primer)).collect().await;
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].status, JobStatus::Error);
    }
}
