//! Broadcast event bus between the core and its collaborators.

use tokio::sync::broadcast;
use tracing::debug;

use vbatch_models::{BatchSummary, CoreEvent, JobId, JobStatus};

/// Default per-subscriber buffer; slow subscribers see a lag error rather
/// than blocking the workers.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out channel for progress, terminal and summary events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; a send with no subscribers is not an error.
    pub fn publish(&self, event: CoreEvent) {
        debug!(?event, "publishing core event");
        let _ = self.tx.send(event);
    }

    pub fn progress(&self, job_id: JobId, percent: f64) {
        self.publish(CoreEvent::progress(job_id, percent));
    }

    pub fn terminal(&self, job_id: JobId, status: JobStatus, error: Option<String>) {
        self.publish(CoreEvent::terminal(job_id, status, error));
    }

    pub fn summary(&self, summary: BatchSummary) {
        self.publish(CoreEvent::summary(summary));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
