// Download backend trait definition

use async_trait::async_trait;

use super::errors::JobError;
use super::events::{EventSender, ProgressEvent};
use super::models::ItemPosition;
use super::planner::BoundJob;

/// Trait for download backend implementations
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Download one item of `job`, reporting progress through `reporter`.
    ///
    /// `JobError::Download` means this item failed; a playlist job moves on
    /// to the next item. Any other error ends the job.
    async fn download_item(
        &self,
        job: &BoundJob<'_>,
        item: ItemPosition,
        reporter: &mut ProgressReporter,
    ) -> Result<(), JobError>;
}

/// Progress emitter for a single item.
///
/// Clamps to 0..=100 and drops values below the last one sent, so the
/// consumer sees a non-decreasing sequence even when yt-dlp restarts its
/// counter for a second stream.
pub struct ProgressReporter {
    events: EventSender,
    item: ItemPosition,
    last: Option<f64>,
}

impl ProgressReporter {
    pub fn new(events: EventSender, item: ItemPosition) -> Self {
        Self {
            events,
            item,
            last: None,
        }
    }

    /// Highest percentage reported so far
    pub fn last_percent(&self) -> Option<f64> {
        self.last
    }

    pub async fn report(&mut self, percent: f64) {
        if !percent.is_finite() {
            return;
        }
        let percent = percent.clamp(0.0, 100.0);
        if matches!(self.last, Some(last) if percent <= last) {
            return;
        }
        self.last = Some(percent);
        self.events
            .emit(ProgressEvent::Progress {
                percent,
                item: self.item,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::events::relay;

    fn percents(events: Vec<ProgressEvent>) -> Vec<f64> {
        events
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn reporter_is_monotonic_and_clamped() {
        let (tx, mut rx) = relay(32);
        let mut reporter = ProgressReporter::new(tx, ItemPosition::single());

        for p in [0.0, 12.5, 12.5, 80.0, 3.0, f64::NAN, 150.0, 99.0] {
            reporter.report(p).await;
        }

        assert_eq!(percents(rx.drain()), vec![0.0, 12.5, 80.0, 100.0]);
        assert_eq!(reporter.last_percent(), Some(100.0));
    }
}
