// Event relay between the download worker and the presentation layer

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::models::{ItemPosition, JobInfo};

/// Default number of events buffered before the worker waits for the consumer
pub const DEFAULT_RELAY_CAPACITY: usize = 256;

/// Everything the worker reports about a running job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Resolved metadata, sent before any media bytes are fetched
    Info { info: JobInfo },
    /// Completion of the current item, 0..=100
    Progress { percent: f64, item: ItemPosition },
    /// A playlist item finished
    VideoComplete { item: ItemPosition },
    /// Terminal failure
    Error { message: String },
    /// Terminal success
    Complete {
        message: String,
        completed: u32,
        skipped: u32,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Complete { .. })
    }
}

/// Create a bounded FIFO relay.
pub fn relay(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half, held by the worker
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ProgressEvent>,
}

impl EventSender {
    /// Send an event, waiting for room in the relay.
    ///
    /// A dropped receiver is not an error for the job; the event is lost.
    pub async fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("event receiver dropped, discarding event");
        }
    }

    /// Non-waiting send for callers outside the worker.
    pub fn try_emit(&self, event: ProgressEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!("could not queue event: {}", e);
        }
    }
}

/// Consumer half, drained by the presentation layer
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl EventReceiver {
    /// Take every event currently queued without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

/// Per-job state as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Resolving,
    Downloading { item: u32, of: u32 },
    Completed,
    Failed,
}

impl JobState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Resolving | Self::Downloading { .. })
    }

    /// Next state after observing `event`.
    pub fn apply(self, event: &ProgressEvent) -> Self {
        match (self, event) {
            (_, ProgressEvent::Error { .. }) => Self::Failed,
            (Self::Completed | Self::Failed, _) => self,
            (_, ProgressEvent::Complete { .. }) => Self::Completed,
            (_, ProgressEvent::Info { info }) => Self::Downloading {
                item: 1,
                of: info.item_count(),
            },
            (_, ProgressEvent::Progress { item, .. }) => Self::Downloading {
                item: item.position,
                of: item.total,
            },
            (_, ProgressEvent::VideoComplete { item }) => Self::Downloading {
                item: (item.position + 1).min(item.total),
                of: item.total,
            },
        }
    }
}
