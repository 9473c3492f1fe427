//! Hardware encoder capability detection.
//!
//! The probe answers one question: can the configured hardware encoder
//! actually encode on this machine right now? Listing the encoder is not
//! enough (the build may include it with no usable device), so a one-frame
//! synthetic encode decides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::classify::{classify, ErrorKind};
use super::error::ToolError;
use super::tool::{Invocation, MediaTool};
use super::types::CodecFamily;
use crate::config::{ProbeConfig, ToolConfig};
use crate::metrics;

/// Outcome of the synthetic one-frame encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticOutcome {
    /// Exit code 0.
    Passed,
    /// Nonzero exit (or signal) with captured stderr.
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
    /// Exceeded its time limit and was killed.
    TimedOut { timeout_secs: u64 },
    /// Could not be run at all.
    Error(String),
}

/// Result of one capability probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityReport {
    /// Whether hardware encoding can be used.
    pub available: bool,
    /// Human-readable explanation of the verdict.
    pub diagnostic: String,
    /// Failure kind when the synthetic encode failed in a recognised way.
    pub error_kind: Option<ErrorKind>,
    /// Hardware encoder that was tested.
    pub encoder: String,
    /// Raw output of the failed test encode.
    pub details: Option<String>,
    /// Output of the device-info utility, if it ran.
    pub device_info: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CapabilityReport {
    /// Combines the individual checks into a verdict.
    ///
    /// `available` is true only when the tool runs, the encoder is listed and
    /// the synthetic encode passed. Later checks are ignored once an earlier
    /// one has failed.
    pub fn from_checks(
        encoder: &str,
        tool_available: bool,
        encoder_listed: bool,
        synthetic: Option<SyntheticOutcome>,
    ) -> Self {
        let mut report = Self {
            available: false,
            diagnostic: String::new(),
            error_kind: None,
            encoder: encoder.to_string(),
            details: None,
            device_info: None,
            checked_at: Utc::now(),
        };

        if !tool_available {
            report.diagnostic = "FFmpeg not found. Install FFmpeg and make sure it is on PATH."
                .to_string();
            return report;
        }

        if !encoder_listed {
            report.diagnostic = format!("Hardware encoder {} is not listed by FFmpeg.", encoder);
            report.error_kind = Some(ErrorKind::EncoderMissing);
            return report;
        }

        match synthetic {
            Some(SyntheticOutcome::Passed) => {
                report.available = true;
                report.diagnostic = format!("Hardware encoder {} is working.", encoder);
            }
            Some(SyntheticOutcome::Failed { exit_code, stderr }) => {
                let classification = classify(&stderr, CodecFamily::Hardware, exit_code);
                report.diagnostic = match classification.kind {
                    ErrorKind::GenericExitFailure => match exit_code {
                        Some(code) => {
                            format!("{} test encode failed with exit code {}.", encoder, code)
                        }
                        None => format!("{} test encode was terminated.", encoder),
                    },
                    _ => classification.message,
                };
                report.error_kind = Some(classification.kind);
                if !stderr.trim().is_empty() {
                    report.details = Some(stderr);
                }
            }
            Some(SyntheticOutcome::TimedOut { timeout_secs }) => {
                report.diagnostic = format!(
                    "{} test encode timed out after {} seconds.",
                    encoder, timeout_secs
                );
            }
            Some(SyntheticOutcome::Error(reason)) => {
                report.diagnostic = format!("{} test encode could not run: {}", encoder, reason);
            }
            None => {
                report.diagnostic = format!("{} test encode was not run.", encoder);
            }
        }

        report
    }

    pub fn with_device_info(mut self, device_info: Option<String>) -> Self {
        self.device_info = device_info;
        self
    }
}

/// Process-wide slot holding the most recent report.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCache {
    inner: Arc<RwLock<Option<CapabilityReport>>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<CapabilityReport> {
        self.inner.read().await.clone()
    }

    pub async fn set(&self, report: CapabilityReport) {
        *self.inner.write().await = Some(report);
    }

    /// Whether the last report said hardware is usable. False if never probed.
    pub async fn hardware_available(&self) -> bool {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|r| r.available)
            .unwrap_or(false)
    }
}

/// Runs the capability checks against a [`MediaTool`].
pub struct CapabilityProbe<'a> {
    tool: &'a dyn MediaTool,
    tool_config: &'a ToolConfig,
    probe_config: &'a ProbeConfig,
}

impl<'a> CapabilityProbe<'a> {
    pub fn new(
        tool: &'a dyn MediaTool,
        tool_config: &'a ToolConfig,
        probe_config: &'a ProbeConfig,
    ) -> Self {
        Self {
            tool,
            tool_config,
            probe_config,
        }
    }

    /// Runs every check and returns the report. Never fails: any error
    /// becomes an unavailable verdict.
    pub async fn run(&self) -> CapabilityReport {
        let encoder = self.tool_config.hardware_encoder.as_str();
        debug!(encoder, "Probing hardware encoder");

        if !self
            .tool
            .is_installed(self.probe_config.version_timeout())
            .await
        {
            return self.finish(CapabilityReport::from_checks(encoder, false, false, None));
        }

        let listed = self.encoder_listed(encoder).await;
        if !listed {
            return self.finish(CapabilityReport::from_checks(encoder, true, false, None));
        }

        let (synthetic, device_info) = tokio::join!(self.synthetic_test(), self.device_info());
        let report = CapabilityReport::from_checks(encoder, true, true, Some(synthetic))
            .with_device_info(device_info);
        self.finish(report)
    }

    async fn encoder_listed(&self, encoder: &str) -> bool {
        match self
            .tool
            .run(
                &Invocation::list_encoders(),
                self.probe_config.encoder_list_timeout(),
            )
            .await
        {
            Ok(output) => output.stdout.contains(encoder),
            Err(e) => {
                debug!(error = %e, "Encoder listing failed");
                false
            }
        }
    }

    async fn synthetic_test(&self) -> SyntheticOutcome {
        let limit = self.probe_config.synthetic_test_timeout();
        match self
            .tool
            .run(&Invocation::synthetic_test(self.tool_config), limit)
            .await
        {
            Ok(output) if output.success() => SyntheticOutcome::Passed,
            Ok(output) => SyntheticOutcome::Failed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            },
            Err(ToolError::Timeout { timeout_secs, .. }) => {
                SyntheticOutcome::TimedOut { timeout_secs }
            }
            Err(e) => SyntheticOutcome::Error(e.to_string()),
        }
    }

    /// Best effort; absence of the utility is not an error.
    async fn device_info(&self) -> Option<String> {
        match self
            .tool
            .run(
                &Invocation::device_info(),
                self.probe_config.device_info_timeout(),
            )
            .await
        {
            Ok(output) if output.success() => {
                let text = output.stdout.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Ok(output) => {
                debug!(exit_code = ?output.exit_code, "Device info utility failed");
                None
            }
            Err(e) => {
                debug!(error = %e, "Device info utility unavailable");
                None
            }
        }
    }

    fn finish(&self, report: CapabilityReport) -> CapabilityReport {
        if report.available {
            info!(encoder = %report.encoder, "Hardware encoding available");
            metrics::CAPABILITY_PROBES
                .with_label_values(&["available"])
                .inc();
        } else {
            warn!(
                encoder = %report.encoder,
                diagnostic = %report.diagnostic,
                "Hardware encoding unavailable"
            );
            metrics::CAPABILITY_PROBES
                .with_label_values(&["unavailable"])
                .inc();
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_missing() {
        let report = CapabilityReport::from_checks("h264_nvenc", false, true, Some(SyntheticOutcome::Passed));
        assert!(!report.available);
        assert!(report.diagnostic.contains("FFmpeg not found"));
    }

    #[test]
    fn test_encoder_not_listed() {
        let report = CapabilityReport::from_checks("h264_nvenc", true, false, None);
        assert!(!report.available);
        assert_eq!(report.error_kind, Some(ErrorKind::EncoderMissing));
        assert!(report.diagnostic.contains("not listed"));
    }

    #[test]
    fn test_synthetic_passed() {
        let report =
            CapabilityReport::from_checks("h264_nvenc", true, true, Some(SyntheticOutcome::Passed));
        assert!(report.available);
        assert_eq!(report.error_kind, None);
    }

    #[test]
    fn test_synthetic_failed_is_classified() {
        let report = CapabilityReport::from_checks(
            "h264_nvenc",
            true,
            true,
            Some(SyntheticOutcome::Failed {
                exit_code: Some(1),
                stderr: "[h264_nvenc @ 0x1] No NVENC capable devices found".to_string(),
            }),
        );
        assert!(!report.available);
        assert_eq!(report.error_kind, Some(ErrorKind::HardwareEncoderUnavailable));
        assert!(report.diagnostic.starts_with("No NVENC capable devices found"));
        assert!(report.details.is_some());
    }

    #[test]
    fn test_synthetic_failed_unrecognised() {
        let report = CapabilityReport::from_checks(
            "h264_nvenc",
            true,
            true,
            Some(SyntheticOutcome::Failed {
                exit_code: Some(187),
                stderr: String::new(),
            }),
        );
        assert!(!report.available);
        assert_eq!(report.error_kind, Some(ErrorKind::GenericExitFailure));
        assert!(report.diagnostic.contains("187"));
        assert!(report.details.is_none());
    }

    #[test]
    fn test_synthetic_timed_out() {
        let report = CapabilityReport::from_checks(
            "h264_nvenc",
            true,
            true,
            Some(SyntheticOutcome::TimedOut { timeout_secs: 10 }),
        );
        assert!(!report.available);
        assert!(report.diagnostic.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cache_defaults_to_unavailable() {
        let cache = CapabilityCache::new();
        assert!(cache.get().await.is_none());
        assert!(!cache.hardware_available().await);

        cache
            .set(CapabilityReport::from_checks(
                "h264_nvenc",
                true,
                true,
                Some(SyntheticOutcome::Passed),
            ))
            .await;
        assert!(cache.hardware_available().await);
    }
}
