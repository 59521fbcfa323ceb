use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A resolved channel. Only the resolver creates these, and never partially:
/// a resolution either yields all three fields or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRef {
    /// Stable platform channel identifier (the `UC...` form).
    pub id: String,
    /// Display name derived from the channel feed.
    pub name: String,
    /// Canonical profile URL.
    pub url: String,
}

/// One video from a channel feed refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEntry {
    /// 11-character video identifier.
    pub id: String,
    pub title: String,
    pub channel_name: String,
    pub thumbnail: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published: OffsetDateTime,
    pub url: String,
    /// `None` means no authoritative probe ran. Callers must not read that as
    /// "not a short".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_short: Option<bool>,
}

/// Lifecycle of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// A single acquisition of one (video, quality) pair. At most one job per
/// video may be queued or downloading at any instant, regardless of quality.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub video_id: String,
    pub quality: String,
    pub status: JobStatus,
    /// 0-100.
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadJob {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Payload pushed to progress stream subscribers on every state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub quality: String,
    pub percent: f64,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Authoritative quality snapshot for a video, the poll-fallback source of
/// truth when the live stream is unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySnapshot {
    /// The fixed quality ladder the downloader understands.
    pub available: Vec<String>,
    /// Qualities already acquired and durably recorded.
    pub cached: Vec<String>,
    /// Quality of the active job, if any.
    pub downloading: Option<String>,
    /// Message from the most recent failed job, if its record is still around.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request body for a batch feed refresh.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// Channel URLs or raw channel ids.
    pub channels: Vec<String>,
    /// Surviving entries to collect per channel. Config default when absent.
    pub limit: Option<usize>,
    /// Probe shorts URLs instead of trusting titles alone.
    pub check_shorts: Option<bool>,
}

/// Per-channel outcome of a batch refresh. One channel failing never aborts
/// the others.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRefreshResult {
    pub channel: String,
    pub videos_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub channels: Vec<ChannelRefreshResult>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct QualityQuery {
    pub quality: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_update_serializes_camel_case() {
        let update = ProgressUpdate {
            quality: "720".to_string(),
            percent: 42.5,
            status: JobStatus::Downloading,
            error: None,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"quality": "720", "percent": 42.5, "status": "downloading"})
        );
    }

    #[test]
    fn job_error_field_appears_only_when_set() {
        let mut job = DownloadJob {
            video_id: "abc12345678".to_string(),
            quality: "best".to_string(),
            status: JobStatus::Error,
            percent: 0.0,
            error: Some("boom".to_string()),
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["videoId"], "abc12345678");
        assert_eq!(value["error"], "boom");

        job.error = None;
        job.status = JobStatus::Queued;
        let value = serde_json::to_value(&job).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["status"], "queued");
    }

    #[test]
    fn refresh_request_accepts_camel_case_body() {
        let request: RefreshRequest = serde_json::from_str(
            r#"{"channels": ["@somehandle"], "limit": 5, "checkShorts": true}"#,
        )
        .unwrap();
        assert_eq!(request.channels, vec!["@somehandle"]);
        assert_eq!(request.limit, Some(5));
        assert_eq!(request.check_shorts, Some(true));
    }

    #[test]
    fn terminal_states_are_exactly_complete_and_error() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
    }
}
