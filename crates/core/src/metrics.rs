//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (outcomes, wall-clock conversion time)
//! - Batches (outcomes)
//! - Hardware (capability probes, silent software fallbacks)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Job Metrics
// =============================================================================

/// Jobs reaching a terminal state, by outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_jobs_finished_total", "Total jobs finished"),
        &["outcome"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Job failures by error kind.
pub static JOB_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_job_failures_total", "Job failures by kind"),
        &["kind"],
    )
    .unwrap()
});

/// Wall-clock conversion time in seconds, by codec family.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "convertino_conversion_duration_seconds",
            "Duration of conversion processes",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0]),
        &["family"],
    )
    .unwrap()
});

/// Whether a conversion process is currently running (0 or 1).
pub static JOBS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "convertino_jobs_running",
        "Number of conversion processes running",
    )
    .unwrap()
});

// =============================================================================
// Batch Metrics
// =============================================================================

/// Batches submitted, by mode.
pub static BATCHES_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_batches_submitted_total", "Total batches submitted"),
        &["mode"], // "single", "batch"
    )
    .unwrap()
});

/// Batches ending, by outcome.
pub static BATCHES_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("convertino_batches_finished_total", "Total batches finished"),
        &["outcome"], // "finished", "cancelled"
    )
    .unwrap()
});

// =============================================================================
// Hardware Metrics
// =============================================================================

/// Capability probes by result.
pub static CAPABILITY_PROBES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "convertino_capability_probes_total",
            "Total hardware capability probes",
        ),
        &["result"], // "available", "unavailable"
    )
    .unwrap()
});

/// Jobs that asked for hardware but ran on the software encoder.
pub static HARDWARE_FALLBACKS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "convertino_hardware_fallbacks_total",
        "Jobs silently downgraded to the software encoder",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_FAILURES.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(JOBS_RUNNING.clone()),
        Box::new(BATCHES_SUBMITTED.clone()),
        Box::new(BATCHES_FINISHED.clone()),
        Box::new(CAPABILITY_PROBES.clone()),
        Box::new(HARDWARE_FALLBACKS.clone()),
    ]
}
