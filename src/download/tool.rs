use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Callback receiving mapped percent-complete values (0-100).
pub type ProgressSink = Box<dyn FnMut(f64) + Send>;

/// Terminal failure of an acquisition run. The message is what ends up in
/// the job record and on the progress stream, so it is written for humans.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Seam to the external acquisition tool. The production implementation
/// wraps yt-dlp; tests drive the manager with a scripted fake.
#[async_trait]
pub trait AcquisitionTool: Send + Sync {
    /// Acquire (video, quality) into `dest`, reporting progress as it goes.
    /// `dest` is a scratch path; the caller commits it on success.
    async fn acquire(
        &self,
        video_id: &str,
        quality: &str,
        dest: &Path,
        on_progress: ProgressSink,
    ) -> Result<(), ToolError>;
}
