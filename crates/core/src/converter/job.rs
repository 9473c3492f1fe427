//! A single conversion job and the logic that runs it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::classify::{classify_run_failure, Classification, ErrorKind};
use super::events::{EngineEvent, EventBus};
use super::info::probe_duration;
use super::progress::{parse_elapsed, parse_progress, ProgressSample};
use super::tool::{Invocation, MediaTool, ToolProcess};
use super::types::{CodecFamily, ConversionRequest, EncoderProfile};
use crate::config::Config;
use crate::metrics;

pub type JobId = String;

/// Job lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// A pending job may fail before its process is spawned (duration probe)
    /// or be cancelled before it starts.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One input file to convert, with its runtime state.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub profile: EncoderProfile,
    status: JobStatus,
    /// Total input duration in seconds, known once the job starts.
    pub duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    percent: u8,
    eta_secs: f64,
    /// Family actually used, which may differ from the profile after a
    /// fallback.
    pub codec_family: Option<CodecFamily>,
    /// Tool output. Consecutive status lines collapse into the latest one.
    log: Vec<String>,
    last_line_was_status: bool,
    pub error: Option<Classification>,
}

impl ConversionJob {
    pub fn new(request: ConversionRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input_path: request.input_path,
            output_path: request.output_path,
            profile: request.profile,
            status: JobStatus::Pending,
            duration_secs: 0.0,
            started_at: None,
            finished_at: None,
            percent: 0,
            eta_secs: 0.0,
            codec_family: None,
            log: Vec::new(),
            last_line_was_status: false,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn eta_secs(&self) -> f64 {
        self.eta_secs
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Moves to `next` if allowed. Returns whether the status changed.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            debug!(job_id = %self.id, from = %self.status, to = %next, "Ignoring transition");
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    /// Records a sample unless it would move progress backward.
    pub fn record_progress(&mut self, sample: ProgressSample) -> bool {
        if sample.percent < self.percent {
            return false;
        }
        self.percent = sample.percent;
        self.eta_secs = sample.eta_secs;
        true
    }

    pub fn append_log(&mut self, line: &str) {
        let is_status = parse_elapsed(line).is_some();
        if is_status && self.last_line_was_status {
            if let Some(last) = self.log.last_mut() {
                *last = line.to_string();
                return;
            }
        }
        self.log.push(line.to_string());
        self.last_line_was_status = is_status;
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            profile: self.profile,
            status: self.status,
            percent: self.percent,
            eta_secs: self.eta_secs,
            codec_family: self.codec_family,
            error: self.error.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Serializable view of a job without its log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub profile: EncoderProfile,
    pub status: JobStatus,
    pub percent: u8,
    pub eta_secs: f64,
    pub codec_family: Option<CodecFamily>,
    pub error: Option<Classification>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub type SharedJob = Arc<RwLock<ConversionJob>>;

/// Picks the family a job runs with. Hardware is used only when requested
/// and either the last probe found it usable or the user forced it.
pub fn resolve_family(
    profile: &EncoderProfile,
    hardware_available: bool,
    force_hardware: bool,
) -> CodecFamily {
    if profile.wants_hardware() && (hardware_available || force_hardware) {
        CodecFamily::Hardware
    } else {
        CodecFamily::Software
    }
}

/// Per-run inputs decided by the queue.
pub(crate) struct RunContext<'a> {
    /// 0-based position in the batch.
    pub index: usize,
    pub total: usize,
    pub hardware_available: bool,
    pub force_hardware: bool,
    pub cancel: &'a CancellationToken,
}

enum PumpResult {
    Exited(Option<i32>),
    Cancelled,
    Error(String),
}

/// Runs one job from `Pending` to a terminal state.
///
/// Terminal transitions and their events happen under the job's write lock
/// after checking the cancellation token, so a job observed as cancelled
/// never emits `JobCompleted` or `JobFailed`.
pub(crate) struct JobRunner {
    pub tool: Arc<dyn MediaTool>,
    pub config: Arc<Config>,
    pub events: EventBus,
}

impl JobRunner {
    pub async fn run(&self, job: &SharedJob, ctx: RunContext<'_>) -> JobStatus {
        let (job_id, input_path, output_path, profile) = {
            let j = job.read().await;
            if j.status != JobStatus::Pending {
                warn!(job_id = %j.id, status = %j.status, "Job is not pending, skipping");
                return j.status;
            }
            (j.id.clone(), j.input_path.clone(), j.output_path.clone(), j.profile)
        };

        let duration_secs = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return self.mark_cancelled(job).await,
            secs = probe_duration(self.tool.as_ref(), &self.config.probe, &input_path) => secs,
        };

        if duration_secs <= 0.0 {
            warn!(job_id = %job_id, input = %input_path.display(), "Could not determine duration");
            let classification = Classification {
                kind: ErrorKind::DurationProbeFailed,
                message: "Could not determine video duration.".to_string(),
            };
            return self.mark_failed(job, ctx.cancel, classification).await;
        }

        let family = resolve_family(&profile, ctx.hardware_available, ctx.force_hardware);
        if profile.wants_hardware() && family == CodecFamily::Software {
            warn!(
                job_id = %job_id,
                "Hardware encoding requested but unavailable, using software encoder"
            );
            metrics::HARDWARE_FALLBACKS.inc();
        }

        let invocation =
            Invocation::conversion(&self.config.tool, &input_path, &output_path, &profile, family);
        let started_at = Utc::now();
        {
            let mut j = job.write().await;
            if ctx.cancel.is_cancelled() {
                drop(j);
                return self.mark_cancelled(job).await;
            }
            j.duration_secs = duration_secs;
            j.started_at = Some(started_at);
            j.codec_family = Some(family);
            j.transition(JobStatus::Running);
            j.append_log(&format!("$ {}", invocation));
        }

        info!(
            job_id = %job_id,
            index = ctx.index + 1,
            total = ctx.total,
            family = family.as_str(),
            duration_secs,
            "Starting conversion"
        );
        debug!(job_id = %job_id, command = %invocation, "Spawning");

        let mut process = match self.tool.spawn(&invocation).await {
            Ok(process) => process,
            Err(e) => {
                let classification = Classification {
                    kind: ErrorKind::GenericExitFailure,
                    message: format!("Failed to start conversion: {}", e),
                };
                return self.mark_failed(job, ctx.cancel, classification).await;
            }
        };

        self.events.emit(EngineEvent::JobStarted {
            job_id: job_id.clone(),
            index: ctx.index + 1,
            total: ctx.total,
            input_path: input_path.clone(),
            codec_family: family,
        });

        metrics::JOBS_RUNNING.inc();
        let result = self
            .pump(job, process.as_mut(), duration_secs, started_at, ctx.cancel)
            .await;
        metrics::JOBS_RUNNING.dec();
        metrics::CONVERSION_DURATION
            .with_label_values(&[family.as_str()])
            .observe(((Utc::now() - started_at).num_milliseconds().max(0) as f64) / 1000.0);

        match result {
            PumpResult::Cancelled => self.mark_cancelled(job).await,
            PumpResult::Exited(exit_code) => {
                self.finish(job, ctx.cancel, family, exit_code).await
            }
            PumpResult::Error(reason) => {
                let classification = Classification {
                    kind: ErrorKind::GenericExitFailure,
                    message: format!("Conversion process failed: {}", reason),
                };
                self.mark_failed(job, ctx.cancel, classification).await
            }
        }
    }

    /// Streams output until the process exits or the batch is cancelled.
    async fn pump(
        &self,
        job: &SharedJob,
        process: &mut dyn ToolProcess,
        duration_secs: f64,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> PumpResult {
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return terminate(process).await,
                line = process.next_line() => line,
            };

            match line {
                Ok(Some(line)) => {
                    self.on_line(job, &line, duration_secs, started_at, cancel)
                        .await
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Reading conversion output failed");
                    break;
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => terminate(process).await,
            exit = process.wait() => match exit {
                Ok(code) => PumpResult::Exited(code),
                Err(e) => PumpResult::Error(e.to_string()),
            },
        }
    }

    async fn on_line(
        &self,
        job: &SharedJob,
        line: &str,
        duration_secs: f64,
        started_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) {
        let sample = parse_progress(line, duration_secs, started_at, Utc::now());
        trace!(line, "ffmpeg");

        let mut j = job.write().await;
        j.append_log(line);
        if let Some(sample) = sample {
            if j.record_progress(sample) && !cancel.is_cancelled() {
                self.events.emit(EngineEvent::Progress {
                    job_id: j.id.clone(),
                    percent: sample.percent,
                    eta_secs: sample.eta_secs,
                });
            }
        }
    }

    async fn finish(
        &self,
        job: &SharedJob,
        cancel: &CancellationToken,
        family: CodecFamily,
        exit_code: Option<i32>,
    ) -> JobStatus {
        if exit_code != Some(0) {
            let log = job.read().await.log.join("\n");
            let classification = classify_run_failure(&log, family, exit_code);
            return self.mark_failed(job, cancel, classification).await;
        }

        let mut j = job.write().await;
        if cancel.is_cancelled() {
            j.transition(JobStatus::Cancelled);
            metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
            return j.status;
        }

        let done = ProgressSample::finished();
        j.record_progress(done);
        self.events.emit(EngineEvent::Progress {
            job_id: j.id.clone(),
            percent: done.percent,
            eta_secs: done.eta_secs,
        });

        j.transition(JobStatus::Completed);
        info!(job_id = %j.id, output = %j.output_path.display(), "Conversion completed");
        metrics::JOBS_FINISHED.with_label_values(&["completed"]).inc();
        self.events.emit(EngineEvent::JobCompleted {
            job_id: j.id.clone(),
            output_path: j.output_path.clone(),
        });
        j.status
    }

    async fn mark_failed(
        &self,
        job: &SharedJob,
        cancel: &CancellationToken,
        classification: Classification,
    ) -> JobStatus {
        let mut j = job.write().await;
        if cancel.is_cancelled() {
            j.transition(JobStatus::Cancelled);
            metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
            return j.status;
        }

        if !j.transition(JobStatus::Failed) {
            return j.status;
        }

        warn!(
            job_id = %j.id,
            kind = %classification.kind,
            message = %classification.message,
            "Conversion failed"
        );
        metrics::JOBS_FINISHED.with_label_values(&["failed"]).inc();
        metrics::JOB_FAILURES
            .with_label_values(&[classification.kind.as_str()])
            .inc();

        self.events.emit(EngineEvent::JobFailed {
            job_id: j.id.clone(),
            error_kind: classification.kind,
            message: classification.message.clone(),
        });
        j.error = Some(classification);
        j.status
    }

    async fn mark_cancelled(&self, job: &SharedJob) -> JobStatus {
        let mut j = job.write().await;
        if j.transition(JobStatus::Cancelled) {
            info!(job_id = %j.id, "Conversion cancelled");
            metrics::JOBS_FINISHED.with_label_values(&["cancelled"]).inc();
        }
        j.status
    }
}

/// Kills the process and waits for it to exit.
async fn terminate(process: &mut dyn ToolProcess) -> PumpResult {
    if let Err(e) = process.kill().await {
        warn!(error = %e, "Failed to kill conversion process");
    }
    if let Err(e) = process.wait().await {
        warn!(error = %e, "Failed to reap conversion process");
    }
    PumpResult::Cancelled
}
