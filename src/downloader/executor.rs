// Download executor: resolve, then download every item of a job
//
// Runs on the worker task. Every failure is reported as exactly one Error
// event and returned; success ends with exactly one Complete event.

use std::sync::Arc;

use super::errors::JobError;
use super::events::{EventSender, ProgressEvent};
use super::extractors::MetadataSource;
use super::models::JobInfo;
use super::planner::{BoundJob, JobDescriptor};
use super::resolver::Resolver;
use super::traits::{DownloadBackend, ProgressReporter};

/// Result of a finished job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Video title, or playlist title for playlist jobs
    pub title: String,
    pub completed: u32,
    pub skipped: u32,
}

impl JobOutcome {
    fn message(&self, playlist: bool) -> String {
        if !playlist {
            return format!("Downloaded '{}'", self.title);
        }
        let mut msg = format!(
            "Downloaded {} of {} items from '{}'",
            self.completed,
            self.completed + self.skipped,
            self.title
        );
        if self.skipped > 0 {
            msg.push_str(&format!(" ({} skipped)", self.skipped));
        }
        msg
    }
}

pub struct Executor {
    resolver: Resolver,
    backend: Arc<dyn DownloadBackend>,
}

impl Executor {
    pub fn new(source: Arc<dyn MetadataSource>, backend: Arc<dyn DownloadBackend>) -> Self {
        Self {
            resolver: Resolver::new(source),
            backend,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub async fn execute(
        &self,
        descriptor: &JobDescriptor,
        events: &EventSender,
    ) -> Result<JobOutcome, JobError> {
        match self.run(descriptor, events).await {
            Ok((outcome, playlist)) => {
                tracing::info!(
                    "job finished: '{}' ({} done, {} skipped)",
                    outcome.title,
                    outcome.completed,
                    outcome.skipped
                );
                events
                    .emit(ProgressEvent::Complete {
                        message: outcome.message(playlist),
                        completed: outcome.completed,
                        skipped: outcome.skipped,
                    })
                    .await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!("job failed: {}", e);
                events
                    .emit(ProgressEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        descriptor: &JobDescriptor,
        events: &EventSender,
    ) -> Result<(JobOutcome, bool), JobError> {
        let info = self
            .resolver
            .resolve(&descriptor.url, descriptor.playlist)
            .await?;
        events.emit(ProgressEvent::Info { info: info.clone() }).await;

        let job = descriptor.bind(info).await?;
        let playlist = job.is_playlist();
        let outcome = self.download_items(&job, events).await?;
        Ok((outcome, playlist))
    }

    async fn download_items(
        &self,
        job: &BoundJob<'_>,
        events: &EventSender,
    ) -> Result<JobOutcome, JobError> {
        let items = job.items();
        let playlist = job.is_playlist();
        let mut completed = 0;
        let mut skipped = 0;
        let mut last_error = None;

        for item in items.iter().copied() {
            tracing::info!(
                "[{}] item {}/{} into {}",
                self.backend.name(),
                item.position,
                item.total,
                job.output_dir.display()
            );
            let mut reporter = ProgressReporter::new(events.clone(), item);

            match self.backend.download_item(job, item, &mut reporter).await {
                Ok(()) => {
                    completed += 1;
                    if playlist {
                        events.emit(ProgressEvent::VideoComplete { item }).await;
                    }
                }
                Err(e) if playlist && e.is_item_level() => {
                    tracing::warn!(
                        "skipping playlist item {} (index {:?}): {}",
                        item.position,
                        item.playlist_index,
                        e
                    );
                    skipped += 1;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        if completed == 0 && skipped > 0 {
            let reason = match last_error {
                Some(JobError::Download(reason)) => reason,
                _ => "no item could be downloaded".to_string(),
            };
            return Err(JobError::Download(format!(
                "all {} playlist items failed, last error: {}",
                skipped, reason
            )));
        }

        Ok(JobOutcome {
            title: match &job.info {
                JobInfo::Media(m) => m.title.clone(),
                JobInfo::Playlist(p) => p.title.clone(),
            },
            completed,
            skipped,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::downloader::events::{relay, EventReceiver};
    use crate::downloader::extractors::RawMetadata;
    use crate::downloader::models::{ItemPosition, JobRequest, MediaInfo};
    use crate::downloader::planner::Planner;
    use crate::downloader::tools::Toolchain;

    pub(crate) struct FakeSource(pub RawMetadata);

    #[async_trait]
    impl MetadataSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn fetch(&self, url: &str, _playlist: bool) -> Result<RawMetadata, JobError> {
            if url.contains("broken") {
                return Err(JobError::resolution(url, "Video unavailable"));
            }
            Ok(self.0.clone())
        }
    }

    /// Reports a fixed progress script per item and fails the listed
    /// playlist indices.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub fail_indices: HashSet<u32>,
        pub fail_single: bool,
        pub calls: Mutex<Vec<ItemPosition>>,
    }

    #[async_trait]
    impl DownloadBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn download_item(
            &self,
            _job: &BoundJob<'_>,
            item: ItemPosition,
            reporter: &mut ProgressReporter,
        ) -> Result<(), JobError> {
            self.calls.lock().unwrap().push(item);
            for p in [0.0, 35.5, 20.0, 100.0, 4.0, 100.0] {
                reporter.report(p).await;
            }
            let failed = match item.playlist_index {
                Some(i) => self.fail_indices.contains(&i),
                None => self.fail_single,
            };
            if failed {
                return Err(JobError::Download("HTTP Error 403: Forbidden".into()));
            }
            Ok(())
        }
    }

    pub(crate) fn toolchain() -> Toolchain {
        Toolchain {
            ytdlp: Some("/usr/bin/yt-dlp".into()),
            ffmpeg: Some("/usr/bin/ffmpeg".into()),
            ffprobe: None,
        }
    }

    fn playlist(entry_count: u32) -> RawMetadata {
        RawMetadata::Playlist {
            title: "My:Videos/2024".into(),
            entry_count,
        }
    }

    fn media() -> RawMetadata {
        RawMetadata::Media(MediaInfo {
            title: "clip".into(),
            duration_seconds: 42,
        })
    }

    async fn run(
        source: RawMetadata,
        backend: FakeBackend,
        request: JobRequest,
    ) -> (Result<JobOutcome, JobError>, Vec<ProgressEvent>, Arc<FakeBackend>) {
        let tools = toolchain();
        let desc = Planner::new(&tools).plan(&request).unwrap();
        let backend = Arc::new(backend);
        let executor = Executor::new(Arc::new(FakeSource(source)), backend.clone());
        let (tx, mut rx): (EventSender, EventReceiver) = relay(1024);
        let result = executor.execute(&desc, &tx).await;
        (result, rx.drain(), backend)
    }

    fn terminal_count(events: &[ProgressEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    #[tokio::test]
    async fn single_video_event_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (result, events, _) = run(
            media(),
            FakeBackend::default(),
            JobRequest::new("https://youtu.be/abc", dir.path()),
        )
        .await;

        let outcome = result.unwrap();
        assert_eq!(outcome.completed, 1);
        assert!(matches!(events.first(), Some(ProgressEvent::Info { .. })));
        assert!(matches!(events.last(), Some(ProgressEvent::Complete { .. })));
        assert_eq!(terminal_count(&events), 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ProgressEvent::VideoComplete { .. })));

        let percents: Vec<f64> = events[1..events.len() - 1]
            .iter()
            .map(|e| match e {
                ProgressEvent::Progress { percent, .. } => *percent,
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents, vec![0.0, 35.5, 100.0]);
    }

    #[tokio::test]
    async fn playlist_range_emits_one_video_complete_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let (result, events, backend) = run(
            playlist(10),
            FakeBackend::default(),
            JobRequest::new("https://youtube.com/playlist?list=x", dir.path())
                .playlist(3, Some(6)),
        )
        .await;

        assert_eq!(result.unwrap().completed, 4);
        let indices: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::VideoComplete { item } => item.playlist_index,
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![3, 4, 5, 6]);
        assert_eq!(backend.calls.lock().unwrap().len(), 4);
        assert!(dir.path().join("My_Videos_2024").is_dir());
    }

    #[tokio::test]
    async fn failing_playlist_items_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend {
            fail_indices: [2].into_iter().collect(),
            ..Default::default()
        };
        let (result, events, _) = run(
            playlist(3),
            backend,
            JobRequest::new("https://youtube.com/playlist?list=x", dir.path()).playlist(1, None),
        )
        .await;

        let outcome = result.unwrap();
        assert_eq!((outcome.completed, outcome.skipped), (2, 1));
        match events.last() {
            Some(ProgressEvent::Complete { skipped, message, .. }) => {
                assert_eq!(*skipped, 1);
                assert!(message.contains("1 skipped"));
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn playlist_fails_when_every_item_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend {
            fail_indices: [1, 2].into_iter().collect(),
            ..Default::default()
        };
        let (result, events, _) = run(
            playlist(2),
            backend,
            JobRequest::new("https://youtube.com/playlist?list=x", dir.path()).playlist(1, None),
        )
        .await;

        assert!(matches!(result, Err(JobError::Download(_))));
        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
        assert_eq!(terminal_count(&events), 1);
    }

    #[tokio::test]
    async fn single_video_failure_is_one_error_event() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend {
            fail_single: true,
            ..Default::default()
        };
        let (result, events, _) = run(
            media(),
            backend,
            JobRequest::new("https://youtu.be/abc", dir.path()),
        )
        .await;

        assert!(matches!(result, Err(JobError::Download(_))));
        assert_eq!(terminal_count(&events), 1);
        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    }

    #[tokio::test]
    async fn resolution_failure_downloads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (result, events, backend) = run(
            media(),
            FakeBackend::default(),
            JobRequest::new("https://youtu.be/broken", dir.path()),
        )
        .await;

        assert!(matches!(result, Err(JobError::Resolution { .. })));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProgressEvent::Error { .. }));
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_start_is_a_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let (result, events, backend) = run(
            playlist(4),
            FakeBackend::default(),
            JobRequest::new("https://youtube.com/playlist?list=x", dir.path()).playlist(9, None),
        )
        .await;

        assert!(matches!(result, Err(JobError::Resolution { .. })));
        assert_eq!(terminal_count(&events), 1);
        assert!(backend.calls.lock().unwrap().is_empty());
    }
}
