// Orchestrator: accepts jobs and runs them on a worker task
//
// At most one job is active. Planning happens on the caller's side so a bad
// request is rejected before anything is spawned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::errors::JobError;
use super::events::{EventSender, ProgressEvent};
use super::executor::{Executor, JobOutcome};
use super::history::HistoryStore;
use super::models::JobRequest;
use super::planner::Planner;
use super::tools::Toolchain;

/// Handle to a running job
#[derive(Debug)]
pub struct JobHandle {
    task: JoinHandle<Result<JobOutcome, JobError>>,
}

impl JobHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the worker to finish.
    pub async fn wait(self) -> Result<JobOutcome, JobError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(JobError::Download(format!("download worker stopped: {}", e))),
        }
    }
}

/// Clears the active flag when the worker ends, including by panic
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Orchestrator {
    executor: Arc<Executor>,
    toolchain: Toolchain,
    proxy: Option<String>,
    history: Arc<Mutex<HistoryStore>>,
    events: EventSender,
    active: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<Executor>,
        toolchain: Toolchain,
        history: Arc<Mutex<HistoryStore>>,
        events: EventSender,
    ) -> Self {
        Self {
            executor,
            toolchain,
            proxy: None,
            history,
            events,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Plan `request` and start it on a worker task.
    ///
    /// Planning failures are posted as one Error event and returned; no
    /// worker is started for them.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle, JobError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(JobError::Busy);
        }
        let guard = ActiveGuard(self.active.clone());

        let descriptor = match Planner::new(&self.toolchain)
            .with_proxy(self.proxy.clone())
            .plan(&request)
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!("rejected job for {}: {}", request.url, e);
                self.events.try_emit(ProgressEvent::Error {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        tracing::info!(
            "starting {} job ({}) for {}",
            descriptor.format.label(),
            descriptor.quality,
            descriptor.url
        );

        let executor = self.executor.clone();
        let history = self.history.clone();
        let events = self.events.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            let outcome = executor.execute(&descriptor, &events).await?;
            history.lock().await.append(
                &outcome.title,
                descriptor.format.label(),
                descriptor.quality.label(),
            );
            Ok(outcome)
        });

        Ok(JobHandle { task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::events::relay;
    use crate::downloader::executor::tests::{toolchain, FakeBackend, FakeSource};
    use crate::downloader::extractors::RawMetadata;
    use crate::downloader::models::{AudioBitrate, MediaInfo, Quality};

    fn orchestrator(
        toolchain: Toolchain,
        history_path: &std::path::Path,
    ) -> (Orchestrator, crate::downloader::events::EventReceiver, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        let source = Arc::new(FakeSource(RawMetadata::Media(MediaInfo {
            title: "clip".into(),
            duration_seconds: 30,
        })));
        let executor = Arc::new(Executor::new(source, backend.clone()));
        let history = Arc::new(Mutex::new(HistoryStore::open(history_path)));
        let (tx, rx) = relay(256);
        (
            Orchestrator::new(executor, toolchain, history, tx),
            rx,
            backend,
        )
    }

    #[tokio::test]
    async fn audio_without_ffmpeg_starts_no_worker() {
        let dir = tempfile::tempdir().unwrap();
        let no_ffmpeg = Toolchain {
            ffmpeg: None,
            ..toolchain()
        };
        let (orch, mut rx, backend) = orchestrator(no_ffmpeg, &dir.path().join("h.json"));

        let req = JobRequest::new("https://youtu.be/abc", dir.path())
            .with_quality(Quality::Audio(AudioBitrate::Kbps320));
        let err = orch.submit(req).unwrap_err();

        assert!(matches!(err, JobError::MissingDependency { tool: "ffmpeg", .. }));
        assert!(!orch.is_active());
        let events = rx.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProgressEvent::Error { .. }));
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_submit_while_active_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _rx, _) = orchestrator(toolchain(), &dir.path().join("h.json"));

        let first = orch
            .submit(JobRequest::new("https://youtu.be/abc", dir.path()))
            .unwrap();
        let second = orch.submit(JobRequest::new("https://youtu.be/def", dir.path()));
        assert_eq!(second.unwrap_err(), JobError::Busy);

        first.wait().await.unwrap();
        assert!(!orch.is_active());
        assert!(orch
            .submit(JobRequest::new("https://youtu.be/def", dir.path()))
            .is_ok());
    }

    #[tokio::test]
    async fn successful_job_is_recorded_in_history() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("h.json");
        let (orch, mut rx, _) = orchestrator(toolchain(), &history_path);

        let outcome = orch
            .submit(JobRequest::new("https://youtu.be/abc", dir.path()))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(outcome.title, "clip");

        let entries = crate::downloader::history::load(&history_path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "clip");
        assert_eq!(entries[0].format, "mp4");
        assert_eq!(entries[0].quality, "best");
        assert!(matches!(
            rx.drain().last(),
            Some(ProgressEvent::Complete { .. })
        ));
    }

    #[tokio::test]
    async fn failed_job_is_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("h.json");
        let (orch, _rx, _) = orchestrator(toolchain(), &history_path);

        let result = orch
            .submit(JobRequest::new("https://youtu.be/broken", dir.path()))
            .unwrap()
            .wait()
            .await;
        assert!(matches!(result, Err(JobError::Resolution { .. })));
        assert!(crate::downloader::history::load(&history_path).is_empty());
    }
}
