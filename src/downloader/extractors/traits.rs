// MetadataSource trait and the raw metadata it yields

use async_trait::async_trait;

use crate::downloader::errors::JobError;
use crate::downloader::models::MediaInfo;

/// Metadata as reported by the source, before any range is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawMetadata {
    Media(MediaInfo),
    Playlist { title: String, entry_count: u32 },
}

/// Fetches metadata for a URL without downloading media
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Name of the source (for logging)
    fn name(&self) -> &'static str;

    /// Fetch metadata. With `playlist` set, playlist URLs are enumerated;
    /// otherwise only the single video is inspected.
    async fn fetch(&self, url: &str, playlist: bool) -> Result<RawMetadata, JobError>;
}
