use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::api::{ChannelRef, VideoEntry};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Boundary to the persistence collaborator. The ingestion pipeline only
/// needs these operations; schema and migrations live on the other side.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn upsert_channel(&self, channel: &ChannelRef) -> Result<(), StorageError>;

    /// Idempotent by video id: re-upserting the same entry replaces it.
    async fn upsert_videos(
        &self,
        channel_id: &str,
        videos: &[VideoEntry],
    ) -> Result<usize, StorageError>;

    /// Ids already stored for a channel, for incremental-diff refreshes.
    async fn known_video_ids(&self, channel_id: &str) -> Result<HashSet<String>, StorageError>;
}

/// In-memory storage used for tests and standalone runs without a database.
#[derive(Default)]
pub struct MemoryStorage {
    channels: RwLock<HashMap<String, ChannelRef>>,
    videos: RwLock<HashMap<String, Vec<VideoEntry>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upsert_channel(&self, channel: &ChannelRef) -> Result<(), StorageError> {
        self.channels
            .write()
            .insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    async fn upsert_videos(
        &self,
        channel_id: &str,
        videos: &[VideoEntry],
    ) -> Result<usize, StorageError> {
        let mut store = self.videos.write();
        let existing = store.entry(channel_id.to_string()).or_default();
        for video in videos {
            match existing.iter_mut().find(|v| v.id == video.id) {
                Some(slot) => *slot = video.clone(),
                None => existing.push(video.clone()),
            }
        }
        Ok(videos.len())
    }

    async fn known_video_ids(&self, channel_id: &str) -> Result<HashSet<String>, StorageError> {
        Ok(self
            .videos
            .read()
            .get(channel_id)
            .map(|videos| videos.iter().map(|v| v.id.clone()).collect())
            .unwrap_or_default())
    }
}
