use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::resolver::{self, ResolveError};
use super::{TransportError, YouTubeSource, thumbnail_url, watch_url};
use crate::api::{ChannelRef, VideoEntry};

/// Title substrings marking short-form uploads. Matched case-insensitively.
const SHORTS_INDICATORS: &[&str] = &["#shorts", "#short"];

/// Channel feed document, newest entry first as the platform serves it.
#[derive(Debug, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub title: String,
    pub author: Option<FeedAuthor>,
    #[serde(default, rename = "entry")]
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Deserialize)]
pub struct FeedAuthor {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedEntry {
    #[serde(default, rename = "videoId", alias = "yt:videoId")]
    pub video_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub published: String,
    pub author: Option<FeedAuthor>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not resolve channel url {url}: {source}")]
    Resolve {
        url: String,
        #[source]
        source: Box<ResolveError>,
    },
    #[error("failed to fetch feed: {0}")]
    Http(#[from] TransportError),
    #[error("feed returned status {0}")]
    Status(u16),
    #[error("failed to parse feed: {0}")]
    Parse(#[from] quick_xml::DeError),
}

pub fn has_shorts_hashtag(title: &str) -> bool {
    let title = title.to_lowercase();
    SHORTS_INDICATORS
        .iter()
        .any(|indicator| title.contains(indicator))
}

/// Bare channel ids are accepted next to full URLs; anything with a path or
/// handle marker goes through resolution instead.
fn looks_like_channel_id(input: &str) -> bool {
    input.len() >= 10
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_published(raw: &str) -> OffsetDateTime {
    OffsetDateTime::parse(raw, &Rfc3339).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Walk feed entries in order, dropping shorts, until `limit` survivors are
/// collected. Filtered entries do not count toward the limit. An id absent
/// from `shorts` stays unclassified: unknown is not "not a short".
pub fn select_entries(
    feed: &Feed,
    limit: usize,
    shorts: Option<&HashMap<String, bool>>,
) -> Vec<VideoEntry> {
    let mut videos = Vec::new();
    for entry in &feed.entries {
        if videos.len() >= limit {
            break;
        }

        // The raw id can carry the feed namespace prefix.
        let video_id = entry.video_id.strip_prefix("yt:").unwrap_or(&entry.video_id);
        if video_id.is_empty() {
            continue;
        }

        if has_shorts_hashtag(&entry.title) {
            continue;
        }

        let is_short = shorts.and_then(|map| map.get(video_id).copied());
        if is_short == Some(true) {
            continue;
        }

        videos.push(VideoEntry {
            id: video_id.to_string(),
            title: entry.title.clone(),
            channel_name: entry
                .author
                .as_ref()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            thumbnail: thumbnail_url(video_id),
            published: parse_published(&entry.published),
            url: watch_url(video_id),
            is_short,
        });
    }
    videos
}

impl YouTubeSource {
    pub(crate) async fn fetch_feed(&self, channel_id: &str) -> Result<Feed, FetchError> {
        let url = super::feed_url(channel_id);
        let doc = self.http.get(&url).await?;
        if !doc.is_success() {
            return Err(FetchError::Status(doc.status));
        }
        Ok(quick_xml::de::from_str(&doc.body)?)
    }

    /// Fetch a channel's latest uploads, newest first, shorts filtered out.
    ///
    /// `channel` may be a raw channel id or any supported URL shape; URL
    /// shapes without a direct id go through the resolver. With
    /// `probe_shorts`, entries surviving the title heuristic are batch
    /// probed and authoritative shorts are dropped too.
    pub async fn fetch_latest(
        &self,
        channel: &str,
        limit: usize,
        probe_shorts: bool,
    ) -> Result<Vec<VideoEntry>, FetchError> {
        self.refresh_channel(channel, limit, probe_shorts)
            .await
            .map(|(_, videos)| videos)
    }

    /// Like [`fetch_latest`](Self::fetch_latest), but also returns the
    /// channel identity derived from the same feed document, so a refresh
    /// can persist both without fetching twice.
    pub async fn refresh_channel(
        &self,
        channel: &str,
        limit: usize,
        probe_shorts: bool,
    ) -> Result<(ChannelRef, Vec<VideoEntry>), FetchError> {
        let channel_id = match resolver::extract_channel_id(channel) {
            Some(id) => id,
            None if looks_like_channel_id(channel) => channel.to_string(),
            None => {
                let channel_ref =
                    self.resolve(channel)
                        .await
                        .map_err(|source| FetchError::Resolve {
                            url: channel.to_string(),
                            source: Box::new(source),
                        })?;
                channel_ref.id
            }
        };

        let feed = self.fetch_feed(&channel_id).await?;
        let channel_ref = ChannelRef {
            id: channel_id.clone(),
            name: resolver::display_name(&feed),
            url: super::channel_url(&channel_id),
        };

        let shorts = if probe_shorts {
            let candidates: Vec<String> = feed
                .entries
                .iter()
                .filter(|e| !has_shorts_hashtag(&e.title))
                .map(|e| {
                    e.video_id
                        .strip_prefix("yt:")
                        .unwrap_or(&e.video_id)
                        .to_string()
                })
                .filter(|id| !id.is_empty())
                .collect();
            Some(self.classify(&candidates).await)
        } else {
            None
        };

        Ok((channel_ref, select_entries(&feed, limit, shorts.as_ref())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015" xmlns="http://www.w3.org/2005/Atom">
  <title>Some Channel - YouTube</title>
  <author><name>Some Channel</name></author>
  <entry>
    <id>yt:video:vid00000001</id>
    <yt:videoId>vid00000001</yt:videoId>
    <title>Newest upload</title>
    <published>2024-03-03T12:00:00+00:00</published>
    <author><name>Some Channel</name></author>
  </entry>
  <entry>
    <id>yt:video:vid00000002</id>
    <yt:videoId>vid00000002</yt:videoId>
    <title>Quick clip #Shorts</title>
    <published>2024-03-02T12:00:00+00:00</published>
    <author><name>Some Channel</name></author>
  </entry>
  <entry>
    <id>yt:video:vid00000003</id>
    <yt:videoId>vid00000003</yt:videoId>
    <title>Older upload</title>
    <published>2024-03-01T12:00:00+00:00</published>
    <author><name>Some Channel</name></author>
  </entry>
</feed>"#;

    fn sample_feed() -> Feed {
        quick_xml::de::from_str(SAMPLE_FEED).expect("sample feed parses")
    }

    #[test]
    fn parses_atom_feed() {
        let feed = sample_feed();
        assert_eq!(feed.title, "Some Channel - YouTube");
        assert_eq!(feed.author.as_ref().unwrap().name, "Some Channel");
        assert_eq!(feed.entries.len(), 3);
        assert_eq!(feed.entries[0].video_id, "vid00000001");
        assert_eq!(feed.entries[0].title, "Newest upload");
    }

    #[test]
    fn preserves_feed_order_and_builds_urls() {
        let videos = select_entries(&sample_feed(), 10, None);
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].id, "vid00000001");
        assert_eq!(videos[1].id, "vid00000003");
        assert_eq!(videos[0].url, "https://www.youtube.com/watch?v=vid00000001");
        assert_eq!(
            videos[0].thumbnail,
            "https://i.ytimg.com/vi/vid00000001/hqdefault.jpg"
        );
        assert!(videos[0].published > videos[1].published);
        // No probe ran, so the flag stays unknown.
        assert_eq!(videos[0].is_short, None);
    }

    #[test]
    fn title_filter_is_case_insensitive() {
        for title in ["watch this #shorts", "watch this #SHORTS", "mid #Short tag"] {
            assert!(has_shorts_hashtag(title), "{}", title);
        }
        assert!(!has_shorts_hashtag("a normal title about shorts films"));
    }

    #[test]
    fn filtered_entries_do_not_count_toward_limit() {
        let feed = sample_feed();
        // Limit of 2: the hashtag entry in the middle is skipped, so the
        // third raw entry still makes the cut.
        let videos = select_entries(&feed, 2, None);
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[1].id, "vid00000003");

        let videos = select_entries(&feed, 1, None);
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "vid00000001");
    }

    #[test]
    fn probe_results_exclude_confirmed_shorts_only() {
        let feed = sample_feed();
        let mut shorts = HashMap::new();
        shorts.insert("vid00000001".to_string(), true);
        // vid00000003 was not classified: it must survive as unknown.
        let videos = select_entries(&feed, 10, Some(&shorts));
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "vid00000003");
        assert_eq!(videos[0].is_short, None);
    }

    #[test]
    fn strips_namespace_prefix_from_raw_id() {
        let raw = r#"<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015">
  <title>c</title>
  <entry>
    <yt:videoId>yt:vid00000009</yt:videoId>
    <title>prefixed</title>
    <published>2024-03-01T12:00:00+00:00</published>
  </entry>
</feed>"#;
        let feed: Feed = quick_xml::de::from_str(raw).unwrap();
        let videos = select_entries(&feed, 10, None);
        assert_eq!(videos[0].id, "vid00000009");
    }

    #[test]
    fn bare_channel_ids_are_recognized() {
        assert!(looks_like_channel_id("UC1234567890abcdef"));
        assert!(!looks_like_channel_id("@somehandle"));
        assert!(!looks_like_channel_id("youtube.com/c/name"));
    }
}
