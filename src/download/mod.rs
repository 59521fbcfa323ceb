pub mod cache;
pub mod manager;
pub mod tool;
pub mod watch;
pub mod ytdlp;

pub use cache::{QUALITIES, QualityCache};
pub use manager::{DownloadError, DownloadManager};
pub use tool::AcquisitionTool;
pub use watch::{ProgressFeed, ProgressWatcher, WatchError, WatchState};
pub use ytdlp::YtDlp;
