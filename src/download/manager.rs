use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::broadcast;

use super::cache::{QUALITIES, QualityCache};
use super::tool::{AcquisitionTool, ProgressSink};
use crate::api::{DownloadJob, JobStatus, ProgressUpdate, QualitySnapshot};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("a download for this video is already active ({quality})")]
    AlreadyActive { quality: String },
    #[error("unsupported quality: {0}")]
    UnsupportedQuality(String),
}

/// Orchestrates quality-specific acquisitions. Enforces at most one active
/// job per video, keeps the durable quality registry, and republishes every
/// state change on a per-video broadcast channel.
pub struct DownloadManager {
    tool: Arc<dyn AcquisitionTool>,
    cache: QualityCache,
    /// Most recent job per video. Active jobs gate new requests; a terminal
    /// record sticks around (compacted to one per video) until the next
    /// request replaces it, so its error stays inspectable.
    jobs: DashMap<String, DownloadJob>,
    channels: DashMap<String, broadcast::Sender<ProgressUpdate>>,
    throttle: Duration,
}

impl DownloadManager {
    pub fn new(tool: Arc<dyn AcquisitionTool>, cache: QualityCache, throttle: Duration) -> Self {
        Self {
            tool,
            cache,
            jobs: DashMap::new(),
            channels: DashMap::new(),
            throttle,
        }
    }

    fn sender(&self, video_id: &str) -> broadcast::Sender<ProgressUpdate> {
        self.channels
            .entry(video_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    /// Subscribe to a video's progress events. Events arrive in the order
    /// the manager produced them.
    pub fn subscribe(&self, video_id: &str) -> broadcast::Receiver<ProgressUpdate> {
        self.sender(video_id).subscribe()
    }

    /// Current state of the video's job as an event payload, for priming a
    /// late subscriber.
    pub fn current(&self, video_id: &str) -> Option<ProgressUpdate> {
        self.jobs.get(video_id).map(|job| ProgressUpdate {
            quality: job.quality.clone(),
            percent: job.percent,
            status: job.status,
            error: job.error.clone(),
        })
    }

    /// Request acquisition of (video, quality).
    ///
    /// Already-cached qualities short-circuit to a complete job without
    /// spawning work. A request while any job for the video is queued or
    /// downloading is rejected, including a repeat of the exact same
    /// quality: the existing job is kept. The conflict check and the queued
    /// insert happen under one map entry lock, so the single-active-job
    /// invariant holds against concurrent requests.
    pub fn request_download(
        self: &Arc<Self>,
        video_id: &str,
        quality: &str,
    ) -> Result<DownloadJob, DownloadError> {
        if !QUALITIES.contains(&quality) {
            return Err(DownloadError::UnsupportedQuality(quality.to_string()));
        }

        if self.cache.contains(video_id, quality) {
            return Ok(DownloadJob {
                video_id: video_id.to_string(),
                quality: quality.to_string(),
                status: JobStatus::Complete,
                percent: 100.0,
                error: None,
            });
        }

        let job = DownloadJob {
            video_id: video_id.to_string(),
            quality: quality.to_string(),
            status: JobStatus::Queued,
            percent: 0.0,
            error: None,
        };

        match self.jobs.entry(video_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_active() {
                    return Err(DownloadError::AlreadyActive {
                        quality: occupied.get().quality.clone(),
                    });
                }
                occupied.insert(job.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(job.clone());
            }
        }

        self.publish(
            video_id,
            ProgressUpdate {
                quality: quality.to_string(),
                percent: 0.0,
                status: JobStatus::Queued,
                error: None,
            },
        );

        let manager = Arc::clone(self);
        let video_id = video_id.to_string();
        let quality = quality.to_string();
        tokio::spawn(async move {
            manager.run(video_id, quality).await;
        });

        Ok(job)
    }

    /// Authoritative snapshot over the durable registry plus live job state.
    /// This is what poll-fallback clients converge on when the stream drops.
    pub fn get_qualities(&self, video_id: &str) -> QualitySnapshot {
        let cached = self.cache.cached_qualities(video_id);
        let (downloading, error) = match self.jobs.get(video_id) {
            Some(job) if job.is_active() => (Some(job.quality.clone()), None),
            Some(job) if job.status == JobStatus::Error => (None, job.error.clone()),
            _ => (None, None),
        };

        QualitySnapshot {
            available: QUALITIES.iter().map(|q| q.to_string()).collect(),
            cached,
            downloading,
            error,
        }
    }

    async fn run(self: Arc<Self>, video_id: String, quality: String) {
        tracing::info!("Starting download for {} quality {}", video_id, quality);
        self.transition(&video_id, JobStatus::Downloading, 0.0, None);

        let temp = self.cache.temp_path(&video_id, &quality);

        let relay: ProgressSink = {
            let manager = Arc::clone(&self);
            let video_id = video_id.clone();
            let mut last_broadcast: Option<Instant> = None;
            Box::new(move |percent| {
                // Throttle intermediate updates; terminal transitions happen
                // outside this callback and are never dropped.
                if let Some(last) = last_broadcast
                    && last.elapsed() < manager.throttle
                {
                    return;
                }
                last_broadcast = Some(Instant::now());
                manager.transition(&video_id, JobStatus::Downloading, percent, None);
            })
        };

        match self.tool.acquire(&video_id, &quality, &temp, relay).await {
            Ok(()) => match self.cache.record(&temp, &video_id, &quality) {
                Ok(dest) => {
                    tracing::info!(
                        "Download complete: {} quality {} saved to {}",
                        video_id,
                        quality,
                        dest.display()
                    );
                    self.transition(&video_id, JobStatus::Complete, 100.0, None);
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&temp);
                    self.fail(&video_id, &quality, format!("Failed to save file: {}", e));
                }
            },
            Err(e) => {
                let _ = std::fs::remove_file(&temp);
                self.fail(&video_id, &quality, e.to_string());
            }
        }
    }

    fn fail(&self, video_id: &str, quality: &str, message: String) {
        tracing::warn!(
            "Download error for {} quality {}: {}",
            video_id,
            quality,
            message
        );
        // Keep the last observed percent so the client sees where it died.
        let percent = self
            .jobs
            .get(video_id)
            .map(|job| job.percent)
            .unwrap_or(0.0);
        self.transition(video_id, JobStatus::Error, percent, Some(message));
    }

    /// Apply a state change to the job record and republish it. Terminal
    /// records are kept in place; see the field note on `jobs`.
    fn transition(&self, video_id: &str, status: JobStatus, percent: f64, error: Option<String>) {
        let quality = match self.jobs.get_mut(video_id) {
            Some(mut job) => {
                job.status = status;
                job.percent = percent;
                job.error = error.clone();
                job.quality.clone()
            }
            // Job vanished (compacted); nothing to report.
            None => return,
        };

        self.publish(
            video_id,
            ProgressUpdate {
                quality,
                percent,
                status,
                error,
            },
        );
    }

    fn publish(&self, video_id: &str, update: ProgressUpdate) {
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.sender(video_id).send(update);
    }
}
