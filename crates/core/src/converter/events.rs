//! Events emitted by the job queue.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::trace;

use super::classify::ErrorKind;
use super::types::CodecFamily;

/// Notification about job or batch progress.
///
/// Per-job events for a job always arrive in the order
/// `JobStarted`, `Progress`*, then at most one of `JobCompleted`/`JobFailed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A job's conversion process was spawned.
    JobStarted {
        job_id: String,
        /// 1-based position in the batch.
        index: usize,
        total: usize,
        input_path: PathBuf,
        /// Family actually used, after any fallback.
        codec_family: CodecFamily,
    },
    Progress {
        job_id: String,
        percent: u8,
        eta_secs: f64,
    },
    JobCompleted {
        job_id: String,
        output_path: PathBuf,
    },
    JobFailed {
        job_id: String,
        error_kind: ErrorKind,
        message: String,
    },
    /// The queue moved on to the next job of a batch.
    BatchAdvance {
        /// Jobs finished so far, successfully or not.
        completed: usize,
        /// 1-based position of the job about to start.
        current: usize,
        total: usize,
    },
    /// No job remains to run.
    BatchFinished {
        completed: usize,
        succeeded: usize,
        failed: usize,
        total: usize,
    },
    /// The batch was cancelled by the user.
    BatchCancelled { completed: usize, total: usize },
}

impl EngineEvent {
    /// Event type name as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => "job_started",
            Self::Progress { .. } => "progress",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::BatchAdvance { .. } => "batch_advance",
            Self::BatchFinished { .. } => "batch_finished",
            Self::BatchCancelled { .. } => "batch_cancelled",
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// Whether this event ends a batch.
    pub fn is_batch_terminal(&self) -> bool {
        matches!(self, Self::BatchFinished { .. } | Self::BatchCancelled { .. })
    }
}

/// Fan-out of engine events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Having no subscribers is fine.
    pub fn emit(&self, event: EngineEvent) {
        trace!(kind = event.kind(), job_id = ?event.job_id(), "Emitting event");
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = EngineEvent::Progress {
            job_id: "j1".to_string(),
            percent: 42,
            eta_secs: 12.5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["percent"], 42);

        let event = EngineEvent::JobFailed {
            job_id: "j1".to_string(),
            error_kind: ErrorKind::HardwareEncoderRuntimeError,
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "job_failed");
        assert_eq!(json["error_kind"], "hardware_encoder_runtime_error");
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let event = EngineEvent::BatchCancelled {
            completed: 1,
            total: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert!(event.is_batch_terminal());
        assert_eq!(event.job_id(), None);
    }

    #[tokio::test]
    async fn test_bus_fan_out() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(EngineEvent::BatchAdvance {
            completed: 1,
            current: 2,
            total: 3,
        });

        assert_eq!(a.recv().await.unwrap().kind(), "batch_advance");
        assert_eq!(b.recv().await.unwrap().kind(), "batch_advance");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(1);
        bus.emit(EngineEvent::BatchFinished {
            completed: 0,
            succeeded: 0,
            failed: 0,
            total: 0,
        });
    }
}
