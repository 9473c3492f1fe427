//! Error types for the converter module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors talking to the external media tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Binary not found on PATH or at the configured location.
    #[error("{program} not found at path: {path}")]
    NotFound { program: String, path: PathBuf },

    /// A bounded invocation did not finish in time. The child was killed.
    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout { program: String, timeout_secs: u64 },

    /// The tool ran but reported failure.
    #[error("{program} failed: {reason}")]
    Failed { program: String, reason: String },

    /// Failed to parse tool output.
    #[error("Failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// I/O error while spawning or reading the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    pub fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the tool itself is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors returned by the job queue's control surface.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Submission contained no jobs.
    #[error("No jobs submitted")]
    EmptyBatch,

    /// The external media tool is not installed.
    #[error("FFmpeg is not installed or not runnable at {path}")]
    ToolMissing { path: PathBuf },

    /// A batch is already running.
    #[error("A conversion batch is already running")]
    Busy,

    /// No job with this id in the current or last batch.
    #[error("Job not found: {0}")]
    JobNotFound(String),
}
