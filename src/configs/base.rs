use serde::{Deserialize, Serialize};

use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub youtube: YouTubeConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Load `config.toml` from the working directory. A missing or unreadable
    /// file falls back to defaults so the server can run without any config.
    pub fn load() -> Self {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> Self {
        let config_str = std::fs::read_to_string(path).unwrap_or_default();
        if config_str.is_empty() {
            return Self::default();
        }
        match toml::from_str(&config_str) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to parse {}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::load_from("does-not-exist.toml");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.youtube.probe_concurrency, 5);
        assert_eq!(config.downloads.ytdlp_path, "yt-dlp");
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
[server]
host = "127.0.0.1"
port = 9090

[youtube]
default_limit = 10
"#;
        let config: Config = toml::from_str(raw).expect("valid toml");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.youtube.default_limit, 10);
        // Untouched sections keep their defaults.
        assert_eq!(config.youtube.probe_timeout_secs, 5);
        assert_eq!(config.downloads.progress_throttle_ms, 250);
    }
}
