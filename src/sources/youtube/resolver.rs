use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use super::feed::{self, Feed};
use super::{TransportError, YouTubeSource};
use crate::api::ChannelRef;

static CHANNEL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/channel/([^/?#]+)").unwrap());

/// Ordered extraction patterns applied to a fetched channel page. The page
/// markup is an external moving target, so new patterns slot in here without
/// touching the resolution flow.
static PAGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r#""channelId":"([^"]+)""#).unwrap(),
        Regex::new(r#"/channel/([^"/?]+)"#).unwrap(),
        Regex::new(r#""externalId":"([^"]+)""#).unwrap(),
    ]
});

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to fetch channel page: {0}")]
    PageFetch(#[source] TransportError),
    #[error("channel page returned status {0}")]
    PageStatus(u16),
    #[error("could not find channel id for url: {0}")]
    NoChannelId(String),
    #[error("failed to fetch channel feed: {0}")]
    FeedFetch(#[source] TransportError),
    #[error("channel feed returned status {0}")]
    FeedStatus(u16),
    #[error("failed to parse channel feed: {0}")]
    FeedParse(#[source] quick_xml::DeError),
}

/// Extract a channel id from a URL that carries one directly.
pub fn extract_channel_id(url: &str) -> Option<String> {
    CHANNEL_ID_RE.captures(url).map(|caps| caps[1].to_string())
}

/// Normalize user input into an absolute channel URL. Bare handles and paths
/// are rooted at the platform origin.
pub fn normalize_url(input: &str) -> String {
    let input = input.trim();
    if input.starts_with("http") {
        input.to_string()
    } else {
        format!("https://www.youtube.com/{}", input.trim_start_matches('/'))
    }
}

/// Scan a fetched page body for an embedded channel id, first pattern wins.
pub fn scan_page_body(body: &str) -> Option<String> {
    PAGE_PATTERNS
        .iter()
        .find_map(|re| re.captures(body).map(|caps| caps[1].to_string()))
}

/// Derive the channel display name from its feed: author name, then the
/// first entry's author, then the feed title minus the platform suffix.
pub fn display_name(feed: &Feed) -> String {
    if let Some(author) = &feed.author
        && !author.name.is_empty()
    {
        return author.name.clone();
    }
    if let Some(entry) = feed.entries.first()
        && let Some(author) = &entry.author
        && !author.name.is_empty()
    {
        return author.name.clone();
    }
    feed.title
        .strip_suffix(" - YouTube")
        .unwrap_or(&feed.title)
        .to_string()
}

impl YouTubeSource {
    /// Resolve any channel URL shape (`/channel/<id>`, `@handle`, `/c/name`,
    /// `/user/name`) to a verified [`ChannelRef`]. Every failure mode folds
    /// into a single [`ResolveError`] carrying the root cause; a partially
    /// populated ChannelRef is never returned.
    pub async fn resolve(&self, input_url: &str) -> Result<ChannelRef, ResolveError> {
        let input_url = normalize_url(input_url);

        // A direct /channel/ URL skips straight to feed verification.
        if let Some(channel_id) = extract_channel_id(&input_url) {
            return self.channel_from_feed(&channel_id).await;
        }

        tracing::debug!("Resolving channel page: {}", input_url);
        let doc = self
            .http
            .get(&input_url)
            .await
            .map_err(ResolveError::PageFetch)?;

        if !doc.is_success() {
            return Err(ResolveError::PageStatus(doc.status));
        }

        // Redirects may already have landed us on the canonical /channel/ URL.
        if let Some(channel_id) = extract_channel_id(&doc.final_url) {
            return self.channel_from_feed(&channel_id).await;
        }

        match scan_page_body(&doc.body) {
            Some(channel_id) => self.channel_from_feed(&channel_id).await,
            None => Err(ResolveError::NoChannelId(input_url)),
        }
    }

    /// Verify a candidate id by fetching its feed and derive the display name.
    async fn channel_from_feed(&self, channel_id: &str) -> Result<ChannelRef, ResolveError> {
        let feed = self.fetch_feed(channel_id).await.map_err(|e| match e {
            feed::FetchError::Http(e) => ResolveError::FeedFetch(e),
            feed::FetchError::Status(code) => ResolveError::FeedStatus(code),
            feed::FetchError::Parse(e) => ResolveError::FeedParse(e),
            // fetch_feed takes an id, never a URL needing resolution.
            feed::FetchError::Resolve { source, .. } => *source,
        })?;

        Ok(ChannelRef {
            id: channel_id.to_string(),
            name: display_name(&feed),
            url: super::channel_url(channel_id),
        })
    }
}
