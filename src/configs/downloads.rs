use serde::{Deserialize, Serialize};

/// Tuning for the download job manager and its yt-dlp wrapper.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DownloadsConfig {
    /// Path to the yt-dlp binary.
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// Optional cookies file handed to yt-dlp when present on disk.
    pub cookies_path: Option<String>,
    /// Directory holding completed downloads. File presence doubles as the
    /// durable record of which qualities are cached.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Minimum interval between progress broadcasts in milliseconds.
    #[serde(default = "default_throttle")]
    pub progress_throttle_ms: u64,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            cookies_path: None,
            cache_dir: default_cache_dir(),
            progress_throttle_ms: default_throttle(),
        }
    }
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_cache_dir() -> String {
    "/tmp/tubefeed-video-cache".to_string()
}

fn default_throttle() -> u64 {
    250
}
