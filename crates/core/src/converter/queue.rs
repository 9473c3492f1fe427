//! Sequential job queue.
//!
//! A submitted batch is driven by one background task that runs its jobs
//! strictly one after another, so at most one conversion process exists at
//! any time. All observers learn about progress through [`EngineEvent`]s.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::capabilities::{CapabilityCache, CapabilityProbe, CapabilityReport};
use super::error::{QueueError, ToolError};
use super::events::{EngineEvent, EventBus};
use super::info::{inspect, MediaInfo};
use super::job::{ConversionJob, JobId, JobRunner, JobSnapshot, JobStatus, RunContext, SharedJob};
use super::tool::MediaTool;
use super::types::ConversionRequest;
use crate::config::Config;
use crate::metrics;

/// Whether the queue stops after the first job or runs every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Run only the first job; the rest stay pending.
    #[default]
    Single,
    /// Run every job in order, continuing past failures.
    Batch,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Batch => "batch",
        }
    }
}

impl From<bool> for BatchMode {
    fn from(batch: bool) -> Self {
        if batch {
            Self::Batch
        } else {
            Self::Single
        }
    }
}

/// Per-submission options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Use the hardware encoder even if the last probe said it is unusable.
    #[serde(default)]
    pub force_hardware: bool,
}

/// Snapshot of the queue for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub active: bool,
    pub mode: BatchMode,
    pub total: usize,
    /// Jobs finished, successfully or not.
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 1-based position of the job being run, while active.
    pub current: Option<usize>,
    pub jobs: Vec<JobSnapshot>,
}

#[derive(Default)]
struct QueueState {
    jobs: Vec<SharedJob>,
    mode: BatchMode,
    cursor: usize,
    completed: usize,
    succeeded: usize,
    failed: usize,
    active: bool,
    cancel: Option<CancellationToken>,
    /// Flips to true once the batch task has cleaned up.
    done: Option<watch::Receiver<bool>>,
}

/// Owns the current batch and serializes its execution.
#[derive(Clone)]
pub struct JobQueue {
    tool: Arc<dyn MediaTool>,
    config: Arc<Config>,
    capability: CapabilityCache,
    events: EventBus,
    state: Arc<RwLock<QueueState>>,
}

impl JobQueue {
    pub fn new(tool: Arc<dyn MediaTool>, config: Arc<Config>) -> Self {
        let events = EventBus::new(config.queue.event_buffer);
        Self {
            tool,
            config,
            capability: CapabilityCache::new(),
            events,
            state: Arc::new(RwLock::new(QueueState::default())),
        }
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn is_active(&self) -> bool {
        self.state.read().await.active
    }

    /// Most recent capability report, if a probe ever ran.
    pub async fn capability(&self) -> Option<CapabilityReport> {
        self.capability.get().await
    }

    /// Runs the capability probe and caches the result.
    ///
    /// Refused while a batch is running, since the synthetic encode would
    /// compete for the encoder.
    pub async fn probe_capability(&self) -> Result<CapabilityReport, QueueError> {
        if self.is_active().await {
            return Err(QueueError::Busy);
        }
        Ok(self.probe_and_store().await)
    }

    async fn probe_and_store(&self) -> CapabilityReport {
        let report =
            CapabilityProbe::new(self.tool.as_ref(), &self.config.tool, &self.config.probe)
                .run()
                .await;
        self.capability.set(report.clone()).await;
        report
    }

    /// Probes once if hardware matters and nothing is cached yet.
    async fn ensure_capability(&self, requests: &[ConversionRequest]) -> bool {
        if !requests.iter().any(|r| r.profile.wants_hardware()) {
            return false;
        }
        if self.capability.get().await.is_none() {
            self.probe_and_store().await;
        }
        self.capability.hardware_available().await
    }

    /// Whether submitting `requests` as-is would silently fall back to
    /// software, so the caller should ask before forcing hardware.
    ///
    /// While a batch runs no probe is started; only a cached report counts.
    pub async fn needs_hardware_confirmation(&self, requests: &[ConversionRequest]) -> bool {
        if !requests.iter().any(|r| r.profile.wants_hardware()) {
            return false;
        }
        if self.is_active().await {
            return matches!(self.capability.get().await, Some(report) if !report.available);
        }
        !self.ensure_capability(requests).await
    }

    /// Starts a new batch. Returns the job ids in execution order.
    pub async fn submit(
        &self,
        requests: Vec<ConversionRequest>,
        mode: BatchMode,
        options: SubmitOptions,
    ) -> Result<Vec<JobId>, QueueError> {
        if requests.is_empty() {
            return Err(QueueError::EmptyBatch);
        }
        if self.is_active().await {
            return Err(QueueError::Busy);
        }
        if !self
            .tool
            .is_installed(self.config.probe.version_timeout())
            .await
        {
            return Err(QueueError::ToolMissing {
                path: self.config.tool.ffmpeg_path.clone(),
            });
        }

        let hardware_available = self.ensure_capability(&requests).await;

        let mut state = self.state.write().await;
        if state.active {
            return Err(QueueError::Busy);
        }

        let jobs: Vec<SharedJob> = requests
            .into_iter()
            .map(|r| Arc::new(RwLock::new(ConversionJob::new(r))))
            .collect();
        let mut ids = Vec::with_capacity(jobs.len());
        for job in &jobs {
            ids.push(job.read().await.id.clone());
        }

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        *state = QueueState {
            jobs: jobs.clone(),
            mode,
            active: true,
            cancel: Some(cancel.clone()),
            done: Some(done_rx),
            ..QueueState::default()
        };

        let sequencer = Sequencer {
            runner: JobRunner {
                tool: Arc::clone(&self.tool),
                config: Arc::clone(&self.config),
                events: self.events.clone(),
            },
            events: self.events.clone(),
            state: Arc::clone(&self.state),
            jobs,
            mode,
            hardware_available,
            force_hardware: options.force_hardware,
            cancel,
            done: done_tx,
        };
        tokio::spawn(sequencer.run());

        metrics::BATCHES_SUBMITTED
            .with_label_values(&[mode.as_str()])
            .inc();
        info!(
            jobs = ids.len(),
            mode = mode.as_str(),
            hardware_available,
            force_hardware = options.force_hardware,
            "Batch submitted"
        );

        Ok(ids)
    }

    /// Cancels the running batch.
    ///
    /// Returns once the running process has been killed and reaped and
    /// `BatchCancelled` has been emitted, for every concurrent caller.
    /// Returns false if nothing was running.
    pub async fn cancel_all(&self) -> bool {
        let (cancel, done, current) = {
            let mut state = self.state.write().await;
            if !state.active {
                return false;
            }
            (
                state.cancel.clone(),
                state.done.clone(),
                state.jobs.get(state.cursor).cloned(),
            )
        };

        if let Some(cancel) = cancel {
            info!("Cancelling batch");
            match current {
                // Hold the job lock so no terminal event can slip in between
                // the runner's cancellation check and its emission.
                Some(job) => {
                    let _guard = job.write().await;
                    cancel.cancel();
                }
                None => cancel.cancel(),
            }
        }

        if let Some(mut done) = done {
            // A dropped sender means the batch task is gone as well.
            if done.wait_for(|finished| *finished).await.is_err() {
                warn!("Batch task ended without signalling completion");
            }
        }
        true
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.read().await;
        let mut jobs = Vec::with_capacity(state.jobs.len());
        for job in &state.jobs {
            jobs.push(job.read().await.snapshot());
        }
        QueueStatus {
            active: state.active,
            mode: state.mode,
            total: state.jobs.len(),
            completed: state.completed,
            succeeded: state.succeeded,
            failed: state.failed,
            current: state.active.then_some(state.cursor + 1),
            jobs,
        }
    }

    /// Captured tool output of a job in the current or last batch.
    pub async fn job_log(&self, id: &str) -> Result<Vec<String>, QueueError> {
        let state = self.state.read().await;
        for job in &state.jobs {
            let job = job.read().await;
            if job.id == id {
                return Ok(job.log().to_vec());
            }
        }
        Err(QueueError::JobNotFound(id.to_string()))
    }

    /// Describes a media file using the configured tool.
    pub async fn inspect(&self, path: &Path) -> Result<MediaInfo, ToolError> {
        inspect(self.tool.as_ref(), &self.config.probe, path).await
    }
}

/// Background task driving one batch.
struct Sequencer {
    runner: JobRunner,
    events: EventBus,
    state: Arc<RwLock<QueueState>>,
    jobs: Vec<SharedJob>,
    mode: BatchMode,
    hardware_available: bool,
    force_hardware: bool,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
}

impl Sequencer {
    async fn run(self) {
        let total = self.jobs.len();
        let mut index = 0;

        let cancelled = loop {
            if self.cancel.is_cancelled() {
                break true;
            }
            self.state.write().await.cursor = index;

            let status = self
                .runner
                .run(
                    &self.jobs[index],
                    RunContext {
                        index,
                        total,
                        hardware_available: self.hardware_available,
                        force_hardware: self.force_hardware,
                        cancel: &self.cancel,
                    },
                )
                .await;

            let (completed, succeeded, failed) = {
                let mut state = self.state.write().await;
                match status {
                    JobStatus::Completed => {
                        state.completed += 1;
                        state.succeeded += 1;
                    }
                    JobStatus::Failed => {
                        state.completed += 1;
                        state.failed += 1;
                    }
                    _ => {}
                }
                (state.completed, state.succeeded, state.failed)
            };

            if status == JobStatus::Cancelled || self.cancel.is_cancelled() {
                break true;
            }

            if self.mode == BatchMode::Batch && index + 1 < total {
                index += 1;
                self.events.emit(EngineEvent::BatchAdvance {
                    completed,
                    current: index + 1,
                    total,
                });
                continue;
            }

            info!(completed, succeeded, failed, total, "Batch finished");
            metrics::BATCHES_FINISHED
                .with_label_values(&["finished"])
                .inc();
            self.events.emit(EngineEvent::BatchFinished {
                completed,
                succeeded,
                failed,
                total,
            });
            break false;
        };

        if cancelled {
            for job in &self.jobs {
                let mut job = job.write().await;
                if job.status() == JobStatus::Pending {
                    job.transition(JobStatus::Cancelled);
                }
            }
            let completed = self.state.read().await.completed;
            info!(completed, total, "Batch cancelled");
            metrics::BATCHES_FINISHED
                .with_label_values(&["cancelled"])
                .inc();
            self.events
                .emit(EngineEvent::BatchCancelled { completed, total });
        }

        let mut state = self.state.write().await;
        state.active = false;
        state.cancel = None;
        state.done = None;
        drop(state);
        self.done.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_mode_from_bool() {
        assert_eq!(BatchMode::from(true), BatchMode::Batch);
        assert_eq!(BatchMode::from(false), BatchMode::Single);
        assert_eq!(BatchMode::default(), BatchMode::Single);
    }

    #[test]
    fn test_submit_options_default() {
        let options: SubmitOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.force_hardware);
    }

    #[test]
    fn test_queue_status_serializes() {
        let status = QueueStatus {
            active: false,
            mode: BatchMode::Batch,
            total: 0,
            completed: 0,
            succeeded: 0,
            failed: 0,
            current: None,
            jobs: Vec::new(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["mode"], "batch");
        assert!(json["current"].is_null());
    }
}
