use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::tool::{AcquisitionTool, ProgressSink, ToolError};
use crate::sources::youtube::watch_url;

/// One progress record per line: percent, total size, downloaded size.
const PROGRESS_TEMPLATE: &str =
    "%(progress._percent_str)s %(progress._total_bytes_str)s %(progress._downloaded_bytes_str)s";

#[derive(Debug, Error)]
pub enum YtDlpError {
    #[error("failed to start yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("yt-dlp exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
    #[error("yt-dlp io error: {0}")]
    Io(#[source] std::io::Error),
    #[error("yt-dlp returned no stream url")]
    EmptyOutput,
}

/// Wrapper around the yt-dlp binary. Using the tool's own downloader instead
/// of fetching extracted URLs ourselves gets multi-connection transfers and
/// the tool's throttling workarounds for free.
pub struct YtDlp {
    bin: String,
    cookies: Option<PathBuf>,
}

impl YtDlp {
    pub fn new(bin: impl Into<String>, cookies: Option<PathBuf>) -> Self {
        let bin = bin.into();
        let bin = if bin.is_empty() {
            "yt-dlp".to_string()
        } else {
            bin
        };
        Self { bin, cookies }
    }

    /// Cookies are passed through only when the file actually exists, so a
    /// configured-but-absent path degrades to anonymous requests.
    fn cookies_args(&self) -> Vec<String> {
        match &self.cookies {
            Some(path) if path.is_file() => vec![
                "--cookies".to_string(),
                path.to_string_lossy().into_owned(),
            ],
            _ => Vec::new(),
        }
    }

    /// Download a video at the given quality, streaming mapped progress into
    /// the callback. Returns the final file size.
    pub async fn download_with_progress(
        &self,
        video_url: &str,
        quality: &str,
        output: &Path,
        mut on_progress: ProgressSink,
    ) -> Result<u64, YtDlpError> {
        let format = format_for_quality(quality);

        // yt-dlp appends the extension from the merge format, so the output
        // template gets the stem plus a placeholder.
        let stem = output
            .to_string_lossy()
            .trim_end_matches(".mp4")
            .to_string();
        let template = format!("{}.%(ext)s", stem);

        let mut cmd = Command::new(&self.bin);
        cmd.args([
            "--force-ipv4",
            "--format",
            format,
            "--merge-output-format",
            "mp4",
            "--output",
            &template,
            "--no-playlist",
            "--no-warnings",
            "--newline",
            "--progress-template",
            PROGRESS_TEMPLATE,
        ]);
        cmd.args(self.cookies_args());
        cmd.arg(video_url);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(YtDlpError::Spawn)?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            let mut mapper = ProgressMapper::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some((raw_percent, total)) = parse_progress_line(&line) {
                    let mapped = mapper.map(raw_percent, total);
                    tracing::trace!(
                        "yt-dlp progress (phase {}): raw={:.1}% mapped={:.1}%",
                        mapper.phase,
                        raw_percent,
                        mapped
                    );
                    on_progress(mapped);
                }
            }
        }

        let status = child.wait().await.map_err(YtDlpError::Io)?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(YtDlpError::Failed {
                code: status.code(),
                stderr: tail(&stderr, 1000),
            });
        }

        // The tool wrote `<stem>.mp4`; move it if that differs from the
        // requested path.
        let actual = PathBuf::from(format!("{}.mp4", stem));
        if actual != output {
            tokio::fs::rename(&actual, output)
                .await
                .map_err(YtDlpError::Io)?;
        }

        let meta = tokio::fs::metadata(output).await.map_err(YtDlpError::Io)?;
        Ok(meta.len())
    }

    /// Extract the direct media URL for a progressive stream at the given
    /// quality. Returns the URL and the expected file extension.
    pub async fn get_download_url(
        &self,
        video_url: &str,
        quality: &str,
    ) -> Result<(String, &'static str), YtDlpError> {
        let (format, ext) = progressive_format(quality);

        let mut cmd = Command::new(&self.bin);
        cmd.args(["--get-url", "--format", format]);
        cmd.args(self.cookies_args());
        cmd.arg(video_url);
        cmd.stdin(Stdio::null());

        let output = cmd.output().await.map_err(YtDlpError::Spawn)?;
        if !output.status.success() {
            return Err(YtDlpError::Failed {
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), 1000),
            });
        }

        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if url.is_empty() {
            return Err(YtDlpError::EmptyOutput);
        }
        Ok((url, ext))
    }
}

#[async_trait]
impl AcquisitionTool for YtDlp {
    async fn acquire(
        &self,
        video_id: &str,
        quality: &str,
        dest: &Path,
        on_progress: ProgressSink,
    ) -> Result<(), ToolError> {
        let url = watch_url(video_id);
        self.download_with_progress(&url, quality, dest, on_progress)
            .await
            .map(|_| ())
            .map_err(|e| ToolError::new(format!("Download failed: {}", e)))
    }
}

/// Format selector for quality-capped adaptive downloads. H.264 is preferred
/// up to 1080p for playback compatibility; combined streams are the fallback.
pub fn format_for_quality(quality: &str) -> &'static str {
    match quality {
        "best" => "bestvideo+bestaudio/best",
        "audio" => "bestaudio[ext=m4a]/bestaudio",
        "1080" => {
            "bestvideo[height<=1080][vcodec^=avc1]+bestaudio/bestvideo[height<=1080]+bestaudio/best[height<=1080]"
        }
        "480" => {
            "bestvideo[height<=480][vcodec^=avc1]+bestaudio/bestvideo[height<=480]+bestaudio/best[height<=480]"
        }
        "360" => {
            "bestvideo[height<=360][vcodec^=avc1]+bestaudio/bestvideo[height<=360]+bestaudio/best[height<=360]"
        }
        _ => {
            "bestvideo[height<=720][vcodec^=avc1]+bestaudio/bestvideo[height<=720]+bestaudio/best[height<=720]"
        }
    }
}

/// Format selector for single combined streams, used when handing the
/// browser a direct URL. Combined streams rarely exceed 720p.
pub fn progressive_format(quality: &str) -> (&'static str, &'static str) {
    match quality {
        "audio" => ("bestaudio[ext=m4a]/bestaudio", "m4a"),
        "360" => ("best[height<=360][ext=mp4]/best[height<=360]", "mp4"),
        "480" => ("best[height<=480][ext=mp4]/best[height<=480]", "mp4"),
        "720" => ("best[height<=720][ext=mp4]/best[height<=720]", "mp4"),
        _ => ("best[ext=mp4]/best", "mp4"),
    }
}

/// Maps raw per-phase percentages onto one overall scale: video download
/// covers 0-80, audio 80-95, the merge accounts for the rest. The phase flips
/// when the reported total size changes.
struct ProgressMapper {
    phase: u8,
    last_total: i64,
}

impl ProgressMapper {
    fn new() -> Self {
        Self {
            phase: 0,
            last_total: 0,
        }
    }

    fn map(&mut self, raw_percent: f64, total: i64) -> f64 {
        if self.phase == 0 && self.last_total > 0 && total > 0 && total != self.last_total {
            self.phase = 1;
        }
        self.last_total = total;
        match self.phase {
            0 => raw_percent * 0.80,
            _ => 80.0 + raw_percent * 0.15,
        }
    }
}

/// Parse one progress-template line into (percent, total bytes). The line
/// looks like `  42.3%    3.17MiB    1.34MiB` with variable whitespace.
fn parse_progress_line(line: &str) -> Option<(f64, i64)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let percent: f64 = fields[0].strip_suffix('%')?.parse().ok()?;
    Some((percent, parse_size(fields[1])))
}

/// Parse sizes like "10.5MiB", "1.2GiB", "500KiB". Unknown units and "N/A"
/// yield 0.
fn parse_size(s: &str) -> i64 {
    let s = s.trim().trim_start_matches('~').trim();
    if s.is_empty() || s == "N/A" {
        return 0;
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let value: f64 = match s[..split].parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };

    let multiplier: i64 = match s[split..].trim().to_lowercase().as_str() {
        "kib" | "kb" => 1024,
        "mib" | "mb" => 1024 * 1024,
        "gib" | "gb" => 1024 * 1024 * 1024,
        _ => 1,
    };

    (value * multiplier as f64) as i64
}

fn tail(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.len() <= max {
        return s.to_string();
    }
    let start = s.len() - max;
    // Step forward to a char boundary.
    let start = (start..s.len()).find(|&i| s.is_char_boundary(i)).unwrap_or(0);
    s[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("500KiB"), 500 * 1024);
        assert_eq!(parse_size("10.5MiB"), (10.5 * 1024.0 * 1024.0) as i64);
        assert_eq!(parse_size("1.2GiB"), (1.2 * 1024.0 * 1024.0 * 1024.0) as i64);
        assert_eq!(parse_size("~ 3.17MiB"), (3.17 * 1024.0 * 1024.0) as i64);
        assert_eq!(parse_size("N/A"), 0);
        assert_eq!(parse_size(""), 0);
    }

    #[test]
    fn parses_progress_lines() {
        let parsed = parse_progress_line("  42.3%    3.17MiB    1.34MiB");
        assert_eq!(parsed, Some((42.3, (3.17 * 1024.0 * 1024.0) as i64)));

        assert_eq!(parse_progress_line("[download] Destination: x.mp4"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn maps_video_then_audio_phases() {
        let mut mapper = ProgressMapper::new();
        let video_total = 100 * 1024 * 1024;
        let audio_total = 5 * 1024 * 1024;

        assert_eq!(mapper.map(50.0, video_total), 40.0);
        assert_eq!(mapper.map(100.0, video_total), 80.0);
        // Total changes: audio phase begins.
        assert_eq!(mapper.map(0.0, audio_total), 80.0);
        assert_eq!(mapper.map(100.0, audio_total), 95.0);
    }

    #[test]
    fn unknown_quality_falls_back_to_720() {
        assert_eq!(format_for_quality("999"), format_for_quality("720"));
    }

    #[test]
    fn progressive_audio_has_m4a_extension() {
        assert_eq!(progressive_format("audio").1, "m4a");
        assert_eq!(progressive_format("best").1, "mp4");
    }

    #[test]
    fn missing_cookies_file_is_ignored() {
        let ytdlp = YtDlp::new("yt-dlp", Some(PathBuf::from("/nonexistent/cookies.txt")));
        assert!(ytdlp.cookies_args().is_empty());
    }
}
