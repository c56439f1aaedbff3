use crate::error::UpstreamResult;
use crate::matching::Candidate;

/// Metadata of a single video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub title: String,
    pub channel: String,
    pub thumbnail: Option<String>,
    pub duration_seconds: f64,
}

/// Port trait wrapping video search and metadata.
///
/// Implementations live in `youtube::ytdlp` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    /// Zero results is a valid answer, not an error.
    async fn search(&self, query: &str, limit: usize) -> UpstreamResult<Vec<Candidate>>;

    async fn video_info(&self, url: &str) -> UpstreamResult<VideoInfo>;
}
