//! Maps captured ffmpeg output to an actionable failure kind.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::CodecFamily;

/// Why a job (or a capability probe) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The selected encoder is not compiled into the tool.
    EncoderMissing,
    /// The input duration could not be determined before spawning.
    DurationProbeFailed,
    /// The hardware encoder cannot be used on this machine.
    HardwareEncoderUnavailable,
    /// The hardware encoder failed while encoding.
    HardwareEncoderRuntimeError,
    /// Anything else; carries the raw exit code in its message.
    GenericExitFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EncoderMissing => "encoder_missing",
            Self::DurationProbeFailed => "duration_probe_failed",
            Self::HardwareEncoderUnavailable => "hardware_encoder_unavailable",
            Self::HardwareEncoderRuntimeError => "hardware_encoder_runtime_error",
            Self::GenericExitFailure => "generic_exit_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub message: String,
}

struct Signature {
    needles: &'static [&'static str],
    kind: ErrorKind,
    message: &'static str,
    hardware_only: bool,
}

// Order matters: first match wins.
const SIGNATURES: &[Signature] = &[
    Signature {
        needles: &["unknown encoder", "encoder not found"],
        kind: ErrorKind::EncoderMissing,
        message: "The selected encoder is not available in this ffmpeg build.",
        hardware_only: false,
    },
    Signature {
        needles: &["no nvenc capable devices found", "no capable devices found"],
        kind: ErrorKind::HardwareEncoderUnavailable,
        message: "No NVENC capable devices found. Your GPU may not support NVENC or drivers may be missing.",
        hardware_only: true,
    },
    Signature {
        needles: &["cannot load nvenc", "cannot load library"],
        kind: ErrorKind::HardwareEncoderUnavailable,
        message: "Cannot load NVENC library. Ensure you have the latest NVIDIA drivers installed.",
        hardware_only: true,
    },
    Signature {
        needles: &["is not a nvenc capable device", "not a capable device"],
        kind: ErrorKind::HardwareEncoderUnavailable,
        message: "Your GPU doesn't support NVENC encoding. Check GPU compatibility.",
        hardware_only: true,
    },
    Signature {
        needles: &["generic error in an external library"],
        kind: ErrorKind::HardwareEncoderRuntimeError,
        message: "Generic NVENC error. Try updating your NVIDIA drivers to the latest version.",
        hardware_only: true,
    },
    Signature {
        needles: &["nvenc", "gpu", "error initializing", "cuda", "can't initialize"],
        kind: ErrorKind::HardwareEncoderRuntimeError,
        message: "NVIDIA encoder error. Try disabling hardware acceleration or update your GPU drivers.",
        hardware_only: true,
    },
];

/// Classifies captured output. Matching is case-insensitive; hardware
/// signatures only count when the hardware family was used.
pub fn classify(log: &str, family: CodecFamily, exit_code: Option<i32>) -> Classification {
    let haystack = log.to_lowercase();

    SIGNATURES
        .iter()
        .filter(|sig| !sig.hardware_only || family == CodecFamily::Hardware)
        .find(|sig| sig.needles.iter().any(|needle| haystack.contains(needle)))
        .map(|sig| Classification {
            kind: sig.kind,
            message: sig.message.to_string(),
        })
        .unwrap_or_else(|| generic_failure(exit_code))
}

/// Classifies the failure of a conversion run that already spawned. Any
/// hardware signature is a runtime error at this point.
pub fn classify_run_failure(
    log: &str,
    family: CodecFamily,
    exit_code: Option<i32>,
) -> Classification {
    let mut classification = classify(log, family, exit_code);
    if classification.kind == ErrorKind::HardwareEncoderUnavailable {
        classification.kind = ErrorKind::HardwareEncoderRuntimeError;
    }
    classification
}

/// Fallback classification carrying the raw exit code.
pub fn generic_failure(exit_code: Option<i32>) -> Classification {
    let message = match exit_code {
        Some(code) => format!("Conversion failed with error code {}", code),
        None => "Conversion failed: process terminated by signal".to_string(),
    };
    Classification {
        kind: ErrorKind::GenericExitFailure,
        message,
    }
}
