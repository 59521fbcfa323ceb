use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use thiserror::Error;

use super::{YouTubeSource, shorts_url};

/// What a single shorts probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Direct success status: the shorts URL serves the video.
    Short,
    /// Redirect to the canonical watch page: not a short.
    NotShort,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("probe returned status {0}")]
    UnexpectedStatus(u16),
}

/// Transport seam for shorts probes, so classification logic can be tested
/// with an instrumented fake.
#[async_trait]
pub trait ShortsProbe: Send + Sync {
    async fn probe(&self, video_id: &str) -> Result<ProbeOutcome, ProbeError>;
}

/// Production probe: a redirect-suppressed HEAD against the shorts URL.
/// Only the status code is inspected; redirect targets are never followed.
pub struct HttpShortsProbe {
    client: Client,
}

impl HttpShortsProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ShortsProbe for HttpShortsProbe {
    async fn probe(&self, video_id: &str) -> Result<ProbeOutcome, ProbeError> {
        let resp = self.client.head(shorts_url(video_id)).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(ProbeOutcome::Short)
        } else if status.is_redirection() {
            Ok(ProbeOutcome::NotShort)
        } else {
            Err(ProbeError::UnexpectedStatus(status.as_u16()))
        }
    }
}

impl YouTubeSource {
    /// Probe a batch of video ids under the bounded concurrency budget.
    ///
    /// Returns only ids whose probe finished: a timeout or transport error
    /// drops that id from the map rather than failing the batch. The call
    /// returns once every dispatched probe has finished; completion order
    /// across ids is unspecified.
    pub async fn classify(&self, video_ids: &[String]) -> HashMap<String, bool> {
        if video_ids.is_empty() {
            return HashMap::new();
        }

        let probes = video_ids.iter().map(|id| {
            let id = id.clone();
            let probe = Arc::clone(&self.probe);
            let limiter = Arc::clone(&self.limiter);
            async move {
                let _permit = limiter.acquire_owned().await.ok()?;
                match probe.probe(&id).await {
                    Ok(outcome) => Some((id, outcome == ProbeOutcome::Short)),
                    Err(e) => {
                        tracing::debug!("Shorts probe for {} failed: {}", id, e);
                        None
                    }
                }
            }
        });

        join_all(probes).await.into_iter().flatten().collect()
    }
}
