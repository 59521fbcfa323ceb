use std::io;
use std::path::{Path, PathBuf};

/// The fixed quality ladder the downloader understands.
pub const QUALITIES: &[&str] = &["best", "1080", "720", "480", "360", "audio"];

/// Durable registry of acquired (video, quality) pairs, backed by the media
/// cache directory itself: one file per record, and the rename into place on
/// completion is the append. Append-only from the manager's point of view.
pub struct QualityCache {
    dir: PathBuf,
}

impl QualityCache {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn key(video_id: &str, quality: &str) -> String {
        format!("{}_{}.mp4", video_id, quality)
    }

    /// Final location of a cached (video, quality) pair.
    pub fn path(&self, video_id: &str, quality: &str) -> PathBuf {
        self.dir.join(Self::key(video_id, quality))
    }

    /// Scratch location in the same directory, so the final rename is atomic.
    pub fn temp_path(&self, video_id: &str, quality: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.tmp.mp4", video_id, quality))
    }

    pub fn contains(&self, video_id: &str, quality: &str) -> bool {
        self.path(video_id, quality).is_file()
    }

    /// Registry hits for one video, in ladder order.
    pub fn cached_qualities(&self, video_id: &str) -> Vec<String> {
        QUALITIES
            .iter()
            .filter(|quality| self.contains(video_id, quality))
            .map(|quality| quality.to_string())
            .collect()
    }

    /// Commit a finished download: move the temp file into its final place,
    /// which durably records the quality as cached.
    pub fn record(&self, temp: &Path, video_id: &str, quality: &str) -> io::Result<PathBuf> {
        let dest = self.path(video_id, quality);
        std::fs::rename(temp, &dest)?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_makes_quality_visible() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QualityCache::new(dir.path()).unwrap();

        assert!(!cache.contains("abc12345678", "720"));

        let temp = cache.temp_path("abc12345678", "720");
        std::fs::write(&temp, b"data").unwrap();
        cache.record(&temp, "abc12345678", "720").unwrap();

        assert!(cache.contains("abc12345678", "720"));
        assert!(!temp.exists());
        assert_eq!(cache.cached_qualities("abc12345678"), vec!["720"]);
        assert!(cache.cached_qualities("other000000").is_empty());
    }

    #[test]
    fn cached_qualities_follow_ladder_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = QualityCache::new(dir.path()).unwrap();
        for quality in ["audio", "best", "480"] {
            std::fs::write(cache.path("abc12345678", quality), b"x").unwrap();
        }
        assert_eq!(
            cache.cached_qualities("abc12345678"),
            vec!["best", "480", "audio"]
        );
    }
}
