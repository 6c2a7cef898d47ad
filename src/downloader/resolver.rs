// Metadata resolution: URL -> JobInfo with a validated playlist range

use std::sync::Arc;

use super::errors::JobError;
use super::extractors::{MetadataSource, RawMetadata};
use super::models::{JobInfo, PlaylistInfo};
use super::planner::RangeRequest;

pub struct Resolver {
    source: Arc<dyn MetadataSource>,
}

impl Resolver {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }

    /// Resolve `url`. With a `range`, playlist URLs are enumerated and the
    /// range is checked against the entry count before anything downloads.
    pub async fn resolve(
        &self,
        url: &str,
        range: Option<RangeRequest>,
    ) -> Result<JobInfo, JobError> {
        if let Some(range) = &range {
            range.validate()?;
        }
        tracing::info!("[{}] resolving {}", self.source.name(), url);
        let raw = self.source.fetch(url, range.is_some()).await?;

        match (raw, range) {
            (RawMetadata::Media(info), None) => Ok(JobInfo::Media(info)),
            (RawMetadata::Media(info), Some(_)) => {
                tracing::warn!("{} is not a playlist, downloading it as a single video", url);
                Ok(JobInfo::Media(info))
            }
            (RawMetadata::Playlist { title, entry_count }, range) => {
                let range = range.unwrap_or(RangeRequest {
                    start: 1,
                    end: None,
                });
                let resolved_range = resolve_range(url, range, entry_count)?;
                tracing::info!(
                    "playlist '{}': {} entries, downloading {}..={}",
                    title,
                    entry_count,
                    resolved_range.0,
                    resolved_range.1
                );
                Ok(JobInfo::Playlist(PlaylistInfo {
                    title,
                    entry_count,
                    resolved_range,
                }))
            }
        }
    }
}

/// Clamp a requested range to `entry_count`.
///
/// The end defaults to, and is capped at, the last entry. A start beyond
/// the playlist or an empty playlist cannot be downloaded. A zero start or
/// an end before the start is an invalid request.
pub fn resolve_range(
    url: &str,
    range: RangeRequest,
    entry_count: u32,
) -> Result<(u32, u32), JobError> {
    range.validate()?;
    if entry_count == 0 {
        return Err(JobError::resolution(url, "the playlist has no entries"));
    }

    let start = range.start;
    if start > entry_count {
        return Err(JobError::resolution(
            url,
            format!(
                "start index {} is beyond the playlist's {} entries",
                start, entry_count
            ),
        ));
    }

    let end = range.end.unwrap_or(entry_count).min(entry_count);
    if end < start {
        return Err(JobError::resolution(
            url,
            format!("playlist range {}..={} is empty", start, end),
        ));
    }

    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::MediaInfo;
    use async_trait::async_trait;

    struct Fixed(RawMetadata);

    #[async_trait]
    impl MetadataSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch(&self, _url: &str, _playlist: bool) -> Result<RawMetadata, JobError> {
            Ok(self.0.clone())
        }
    }

    fn range(start: u32, end: Option<u32>) -> RangeRequest {
        RangeRequest { start, end }
    }

    #[test]
    fn end_defaults_to_entry_count() {
        assert_eq!(resolve_range("u", range(1, None), 12).unwrap(), (1, 12));
        assert_eq!(resolve_range("u", range(4, None), 12).unwrap(), (4, 12));
    }

    #[test]
    fn end_is_clamped() {
        assert_eq!(resolve_range("u", range(2, Some(50)), 5).unwrap(), (2, 5));
    }

    #[test]
    fn start_beyond_playlist_fails() {
        assert!(matches!(
            resolve_range("u", range(6, None), 5),
            Err(JobError::Resolution { .. })
        ));
        assert!(matches!(
            resolve_range("u", range(1, None), 0),
            Err(JobError::Resolution { .. })
        ));
    }

    #[tokio::test]
    async fn playlist_info_carries_resolved_range() {
        let resolver = Resolver::new(Arc::new(Fixed(RawMetadata::Playlist {
            title: "List".into(),
            entry_count: 8,
        })));
        let info = resolver
            .resolve("https://youtube.com/playlist?list=x", Some(range(3, Some(20))))
            .await
            .unwrap();
        assert_eq!(
            info,
            JobInfo::Playlist(PlaylistInfo {
                title: "List".into(),
                entry_count: 8,
                resolved_range: (3, 8)
            })
        );
    }

    #[test]
    fn zero_start_is_an_invalid_request() {
        assert!(matches!(
            resolve_range("u", range(0, None), 5),
            Err(JobError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn invalid_range_is_rejected_before_fetching() {
        let resolver = Resolver::new(Arc::new(Fixed(RawMetadata::Playlist {
            title: "List".into(),
            entry_count: 8,
        })));
        for bad in [range(0, None), range(5, Some(2))] {
            assert!(matches!(
                resolver.resolve("https://youtube.com/playlist?list=x", Some(bad)).await,
                Err(JobError::InvalidRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn playlist_request_on_single_video_degrades() {
        let media = MediaInfo {
            title: "clip".into(),
            duration_seconds: 61,
        };
        let resolver = Resolver::new(Arc::new(Fixed(RawMetadata::Media(media.clone()))));
        let info = resolver
            .resolve("https://youtu.be/abc", Some(range(1, None)))
            .await
            .unwrap();
        assert_eq!(info, JobInfo::Media(media));
    }
}
