use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::common::HttpClient;
use crate::configs::YouTubeConfig;

pub mod feed;
pub mod resolver;
pub mod shorts;

pub use feed::FetchError;
pub use resolver::ResolveError;
pub use shorts::{HttpShortsProbe, ProbeOutcome, ShortsProbe};

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:v=|youtu\.be/|shorts/)([a-zA-Z0-9_-]{11})").unwrap());

/// A fetched HTTP document: where the request ended up after redirects, the
/// response status, and the body text.
pub struct FetchedDoc {
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedDoc {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport failure before any status code arrived.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transport seam for page and feed fetches, so resolution logic can be
/// tested against scripted documents.
#[async_trait]
pub trait DocFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedDoc, TransportError>;
}

/// Production fetcher over the shared redirect-following client.
pub struct HttpDocFetcher {
    client: Client,
}

impl HttpDocFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocFetcher for HttpDocFetcher {
    async fn get(&self, url: &str) -> Result<FetchedDoc, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::new(e.to_string()))?;
        Ok(FetchedDoc {
            final_url,
            status,
            body,
        })
    }
}

/// Service object for all YouTube traffic. Owns the shared HTTP transports
/// and the probe concurrency budget; constructed once and handed to each
/// caller rather than reached for as global state.
pub struct YouTubeSource {
    pub(crate) http: Arc<dyn DocFetcher>,
    pub(crate) probe: Arc<dyn ShortsProbe>,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) config: YouTubeConfig,
}

impl YouTubeSource {
    pub fn new(config: YouTubeConfig) -> Result<Self, reqwest::Error> {
        let probe_client = HttpClient::new_probe(config.probe_timeout_secs)?;
        let probe: Arc<dyn ShortsProbe> = Arc::new(HttpShortsProbe::new(probe_client));
        Self::with_probe(config, probe)
    }

    /// Build with a custom probe transport but the production fetcher.
    pub fn with_probe(
        config: YouTubeConfig,
        probe: Arc<dyn ShortsProbe>,
    ) -> Result<Self, reqwest::Error> {
        let client = HttpClient::new(config.request_timeout_secs)?;
        let http: Arc<dyn DocFetcher> = Arc::new(HttpDocFetcher::new(client));
        Ok(Self::with_transports(config, http, probe))
    }

    /// Build with both transports supplied. The seams exist so tests can
    /// script documents and count in-flight probes without the network.
    pub fn with_transports(
        config: YouTubeConfig,
        http: Arc<dyn DocFetcher>,
        probe: Arc<dyn ShortsProbe>,
    ) -> Self {
        Self {
            http,
            probe,
            limiter: Arc::new(Semaphore::new(config.probe_concurrency)),
            config,
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

pub fn shorts_url(video_id: &str) -> String {
    format!("https://www.youtube.com/shorts/{}", video_id)
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
}

pub fn channel_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/channel/{}", channel_id)
}

pub fn feed_url(channel_id: &str) -> String {
    format!(
        "https://www.youtube.com/feeds/videos.xml?channel_id={}",
        urlencoding::encode(channel_id)
    )
}

/// Extract the 11-character video id from any supported URL shape
/// (`watch?v=`, `youtu.be/`, `shorts/`).
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}
