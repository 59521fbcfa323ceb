use std::sync::Arc;

use crate::configs::Config;
use crate::download::{DownloadManager, YtDlp};
use crate::sources::youtube::YouTubeSource;
use crate::storage::Storage;

/// Top-level application state.
pub struct AppState {
    pub youtube: YouTubeSource,
    pub storage: Arc<dyn Storage>,
    pub downloads: Arc<DownloadManager>,
    /// Kept alongside the manager for direct stream-url extraction.
    pub ytdlp: Arc<YtDlp>,
    pub config: Config,
}
