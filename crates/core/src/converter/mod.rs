//! Converter module: runs media conversions through an external tool.
//!
//! This module provides the [`JobQueue`], which sequences conversion jobs
//! one at a time, along with the pure pieces it is built from.
//!
//! # Features
//!
//! - Software and hardware (NVENC) H.264 encoding with quality presets
//! - Hardware capability probing with a one-frame synthetic encode
//! - Silent fallback to software when hardware is unusable
//! - Progress and ETA extraction from ffmpeg status lines
//! - Failure classification into actionable kinds
//! - Single or batch execution with cancellation
//!
//! # Example
//!
//! ```ignore
//! use convertino_core::converter::{BatchMode, ConversionRequest, FfmpegTool, JobQueue, SubmitOptions};
//!
//! let tool = Arc::new(FfmpegTool::new(config.tool.clone()));
//! let queue = JobQueue::new(tool, Arc::new(config));
//!
//! let mut events = queue.subscribe();
//! let ids = queue
//!     .submit(requests, BatchMode::Batch, SubmitOptions::default())
//!     .await?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//!     if event.is_batch_terminal() {
//!         break;
//!     }
//! }
//! ```

mod capabilities;
mod classify;
mod error;
mod events;
mod ffmpeg;
mod info;
mod job;
mod progress;
mod queue;
mod tool;
mod types;

pub use capabilities::{CapabilityCache, CapabilityProbe, CapabilityReport, SyntheticOutcome};
pub use classify::{classify, classify_run_failure, generic_failure, Classification, ErrorKind};
pub use error::{QueueError, ToolError};
pub use events::{EngineEvent, EventBus};
pub use ffmpeg::FfmpegTool;
pub use info::{inspect, parse_probe_output, probe_duration, MediaInfo};
pub use job::{resolve_family, ConversionJob, JobId, JobSnapshot, JobStatus};
pub use progress::{
    format_eta, parse_banner_duration, parse_elapsed, parse_progress, ProgressSample,
    MAX_PARSED_PERCENT,
};
pub use queue::{BatchMode, JobQueue, QueueStatus, SubmitOptions};
pub use tool::{Invocation, MediaTool, Program, ToolOutput, ToolProcess, SYNTHETIC_SOURCE};
pub use types::{
    derive_output_path, hardware_preset_for, CodecFamily, Container, ConversionRequest,
    EncoderProfile, QualityPreset, DEFAULT_HARDWARE_PRESET,
};
