use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::{JobStatus, ProgressUpdate, QualitySnapshot};

/// Client-side view of a progress stream. Terminal is absorbing: once
/// entered, the watcher returns and never touches the feed again, which is
/// what makes duplicate terminal notifications impossible.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchState {
    Connected,
    Reconnecting,
    Polling,
    Terminal(ProgressUpdate),
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FeedError(pub String);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("progress feed gave up after {attempts} recovery attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Transport seam for watching one video's progress. The production feed is
/// an SSE connection plus the qualities endpoint; tests script one.
#[async_trait]
pub trait ProgressFeed: Send {
    /// Next live event. `Ok(None)` means the server closed the stream.
    async fn next_event(&mut self) -> Result<Option<ProgressUpdate>, FeedError>;

    /// Re-establish the live stream after a drop.
    async fn reconnect(&mut self) -> Result<(), FeedError>;

    /// Authoritative snapshot, used when the live stream is unavailable.
    async fn snapshot(&mut self) -> Result<QualitySnapshot, FeedError>;
}

/// Drives a [`ProgressFeed`] to a terminal update for one (video, quality)
/// watch. The stream is the fast path; any transport hiccup falls back to
/// polling the snapshot, which can prove completion or failure on its own
/// when the terminal event was lost in transit.
pub struct ProgressWatcher {
    quality: String,
    max_attempts: u32,
    backoff: Duration,
}

impl ProgressWatcher {
    pub fn new(quality: impl Into<String>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            quality: quality.into(),
            max_attempts,
            backoff,
        }
    }

    /// Run until the job reaches a terminal state. Non-terminal updates are
    /// handed to `on_update` as they arrive.
    pub async fn run<F>(
        &self,
        feed: &mut dyn ProgressFeed,
        mut on_update: F,
    ) -> Result<ProgressUpdate, WatchError>
    where
        F: FnMut(&ProgressUpdate) + Send,
    {
        let mut state = WatchState::Connected;
        let mut attempts: u32 = 0;
        let mut last_error = String::from("stream closed without a terminal event");

        loop {
            state = match state {
                WatchState::Connected => match feed.next_event().await {
                    Ok(Some(update)) if update.is_terminal() => {
                        return Ok(update);
                    }
                    Ok(Some(update)) => {
                        on_update(&update);
                        WatchState::Connected
                    }
                    // Server closes after the terminal event; a close we see
                    // here means we missed it and the snapshot must decide.
                    Ok(None) => WatchState::Polling,
                    Err(e) => {
                        last_error = e.to_string();
                        WatchState::Polling
                    }
                },

                WatchState::Polling => {
                    attempts += 1;
                    if attempts > self.max_attempts {
                        return Err(WatchError::Exhausted {
                            attempts: attempts - 1,
                            last: last_error,
                        });
                    }

                    match feed.snapshot().await {
                        Ok(snapshot) => match self.conclude(&snapshot) {
                            Some(update) => return Ok(update),
                            None if snapshot.downloading.is_some() => WatchState::Reconnecting,
                            None => {
                                // Neither done nor in flight yet (queued job,
                                // or the snapshot raced the rename).
                                tokio::time::sleep(self.backoff).await;
                                WatchState::Polling
                            }
                        },
                        Err(e) => {
                            last_error = e.to_string();
                            tokio::time::sleep(self.backoff).await;
                            WatchState::Polling
                        }
                    }
                }

                WatchState::Reconnecting => match feed.reconnect().await {
                    Ok(()) => WatchState::Connected,
                    Err(e) => {
                        last_error = e.to_string();
                        tokio::time::sleep(self.backoff).await;
                        WatchState::Polling
                    }
                },

                WatchState::Terminal(update) => return Ok(update),
            };
        }
    }

    /// Read a terminal outcome off the snapshot, if it proves one. The
    /// watched quality sitting in `cached` with no job in flight proves
    /// completion even when the `complete` event itself was lost.
    fn conclude(&self, snapshot: &QualitySnapshot) -> Option<ProgressUpdate> {
        if snapshot.downloading.is_some() {
            return None;
        }
        if snapshot.cached.iter().any(|q| *q == self.quality) {
            return Some(ProgressUpdate {
                quality: self.quality.clone(),
                percent: 100.0,
                status: JobStatus::Complete,
                error: None,
            });
        }
        if let Some(message) = &snapshot.error {
            return Some(ProgressUpdate {
                quality: self.quality.clone(),
                percent: 0.0,
                status: JobStatus::Error,
                error: Some(message.clone()),
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    enum Step {
        Event(ProgressUpdate),
        Close,
        StreamError(&'static str),
        ReconnectOk,
        ReconnectFail(&'static str),
        Snapshot(QualitySnapshot),
        SnapshotFail(&'static str),
    }

    /// Feed that replays a script and panics on out-of-order calls, so a
    /// test failure points at the exact transition that went wrong.
    struct ScriptedFeed {
        steps: VecDeque<Step>,
    }

    impl ScriptedFeed {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    #[async_trait]
    impl ProgressFeed for ScriptedFeed {
        async fn next_event(&mut self) -> Result<Option<ProgressUpdate>, FeedError> {
            match self.steps.pop_front() {
                Some(Step::Event(update)) => Ok(Some(update)),
                Some(Step::Close) => Ok(None),
                Some(Step::StreamError(msg)) => Err(FeedError(msg.to_string())),
                _ => panic!("unexpected next_event"),
            }
        }

        async fn reconnect(&mut self) -> Result<(), FeedError> {
            match self.steps.pop_front() {
                Some(Step::ReconnectOk) => Ok(()),
                Some(Step::ReconnectFail(msg)) => Err(FeedError(msg.to_string())),
                _ => panic!("unexpected reconnect"),
            }
        }

        async fn snapshot(&mut self) -> Result<QualitySnapshot, FeedError> {
            match self.steps.pop_front() {
                Some(Step::Snapshot(snapshot)) => Ok(snapshot),
                Some(Step::SnapshotFail(msg)) => Err(FeedError(msg.to_string())),
                _ => panic!("unexpected snapshot"),
            }
        }
    }

    fn update(status: JobStatus, percent: f64) -> ProgressUpdate {
        ProgressUpdate {
            quality: "720".to_string(),
            percent,
            status,
            error: None,
        }
    }

    fn snapshot(cached: &[&str], downloading: Option<&str>, error: Option<&str>) -> QualitySnapshot {
        QualitySnapshot {
            available: vec!["best".into(), "720".into()],
            cached: cached.iter().map(|q| q.to_string()).collect(),
            downloading: downloading.map(|q| q.to_string()),
            error: error.map(|e| e.to_string()),
        }
    }

    fn watcher() -> ProgressWatcher {
        ProgressWatcher::new("720", 3, Duration::ZERO)
    }

    #[tokio::test]
    async fn live_stream_terminal_ends_the_watch() {
        let mut feed = ScriptedFeed::new(vec![
            Step::Event(update(JobStatus::Queued, 0.0)),
            Step::Event(update(JobStatus::Downloading, 40.0)),
            Step::Event(update(JobStatus::Complete, 100.0)),
        ]);

        let mut seen = Vec::new();
        let terminal = watcher()
            .run(&mut feed, |u| seen.push(u.percent))
            .await
            .unwrap();

        assert_eq!(terminal.status, JobStatus::Complete);
        assert_eq!(seen, vec![0.0, 40.0]);
        // Absorbing: nothing left of the script was touched after terminal.
        assert!(feed.steps.is_empty());
    }

    #[tokio::test]
    async fn lost_terminal_is_recovered_from_the_snapshot() {
        let mut feed = ScriptedFeed::new(vec![
            Step::Event(update(JobStatus::Downloading, 90.0)),
            Step::StreamError("connection reset"),
            Step::Snapshot(snapshot(&["720"], None, None)),
        ]);

        let terminal = watcher().run(&mut feed, |_| {}).await.unwrap();
        assert_eq!(terminal, update(JobStatus::Complete, 100.0));
        assert_eq!(
            WatchState::Terminal(terminal),
            WatchState::Terminal(update(JobStatus::Complete, 100.0))
        );
    }

    #[tokio::test]
    async fn snapshot_error_without_active_job_synthesizes_failure() {
        let mut feed = ScriptedFeed::new(vec![
            Step::Close,
            Step::Snapshot(snapshot(&[], None, Some("Download failed: boom"))),
        ]);

        let terminal = watcher().run(&mut feed, |_| {}).await.unwrap();
        assert_eq!(terminal.status, JobStatus::Error);
        assert_eq!(terminal.error.as_deref(), Some("Download failed: boom"));
    }

    #[tokio::test]
    async fn active_job_in_snapshot_triggers_reconnect() {
        let mut feed = ScriptedFeed::new(vec![
            Step::StreamError("timeout"),
            Step::Snapshot(snapshot(&[], Some("720"), None)),
            Step::ReconnectOk,
            Step::Event(update(JobStatus::Downloading, 70.0)),
            Step::Event(update(JobStatus::Complete, 100.0)),
        ]);

        let mut seen = Vec::new();
        let terminal = watcher()
            .run(&mut feed, |u| seen.push(u.percent))
            .await
            .unwrap();
        assert_eq!(terminal.status, JobStatus::Complete);
        assert_eq!(seen, vec![70.0]);
    }

    #[tokio::test]
    async fn failed_reconnect_falls_back_to_polling() {
        let mut feed = ScriptedFeed::new(vec![
            Step::Close,
            Step::Snapshot(snapshot(&[], Some("720"), None)),
            Step::ReconnectFail("still down"),
            Step::Snapshot(snapshot(&["720"], None, None)),
        ]);

        let terminal = watcher().run(&mut feed, |_| {}).await.unwrap();
        assert_eq!(terminal.status, JobStatus::Complete);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let mut feed = ScriptedFeed::new(vec![
            Step::Close,
            Step::SnapshotFail("api down"),
            Step::SnapshotFail("api down"),
            Step::SnapshotFail("api down"),
        ]);

        let err = watcher().run(&mut feed, |_| {}).await.unwrap_err();
        let WatchError::Exhausted { attempts, last } = err;
        assert_eq!(attempts, 3);
        assert!(last.contains("api down"));
    }

    #[tokio::test]
    async fn inconclusive_snapshot_keeps_polling() {
        // Queued job not yet visible as downloading, then it shows up cached.
        let mut feed = ScriptedFeed::new(vec![
            Step::Close,
            Step::Snapshot(snapshot(&[], None, None)),
            Step::Snapshot(snapshot(&["720"], None, None)),
        ]);

        let terminal = watcher().run(&mut feed, |_| {}).await.unwrap();
        assert_eq!(terminal.status, JobStatus::Complete);
    }
}
