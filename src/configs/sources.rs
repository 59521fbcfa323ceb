use serde::{Deserialize, Serialize};

/// Tuning for the YouTube source (resolver, feed fetcher, shorts classifier).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YouTubeConfig {
    /// Maximum simultaneous shorts probes.
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
    /// Per-probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Timeout for page and feed fetches in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How many surviving entries a feed refresh collects by default.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Probe every entry's shorts URL during refresh. More accurate than the
    /// title heuristic alone, at one extra request per entry.
    #[serde(default)]
    pub check_shorts: bool,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            probe_concurrency: default_probe_concurrency(),
            probe_timeout_secs: default_probe_timeout(),
            request_timeout_secs: default_request_timeout(),
            default_limit: default_limit(),
            check_shorts: false,
        }
    }
}

fn default_probe_concurrency() -> usize {
    5
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    10
}

fn default_limit() -> usize {
    20
}
