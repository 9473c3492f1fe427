//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which encoder family drives the video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecFamily {
    /// CPU encoder with x264-style preset tokens.
    Software,
    /// GPU encoder with its own preset vocabulary.
    Hardware,
}

impl CodecFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Hardware => "hardware",
        }
    }
}

/// Speed/quality trade-off selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    /// Fast encode, low quality.
    Fast,
    /// Balanced.
    #[default]
    Medium,
    /// Slow encode, high quality.
    Slow,
}

impl QualityPreset {
    /// Preset token for the software encoder.
    pub fn software_token(&self) -> &'static str {
        match self {
            Self::Fast => "veryfast",
            Self::Medium => "medium",
            Self::Slow => "veryslow",
        }
    }

    /// Preset token for the hardware encoder.
    pub fn hardware_token(&self) -> &'static str {
        hardware_preset_for(self.software_token())
    }

    /// Human readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fast => "Fast (Low Quality)",
            Self::Medium => "Medium Quality",
            Self::Slow => "Slow (High Quality)",
        }
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "veryfast" | "fast (low quality)" => Ok(Self::Fast),
            "medium" | "medium quality" => Ok(Self::Medium),
            "slow" | "veryslow" | "slow (high quality)" => Ok(Self::Slow),
            other => Err(format!("unknown quality preset: {}", other)),
        }
    }
}

/// Hardware preset used when a software token has no mapping.
pub const DEFAULT_HARDWARE_PRESET: &str = "p4";

/// Maps a software preset token to the hardware encoder's preset token.
///
/// Unknown tokens map to the medium hardware preset.
pub fn hardware_preset_for(software_token: &str) -> &'static str {
    match software_token {
        "veryfast" => "p1",
        "medium" => "p4",
        "veryslow" => "p7",
        _ => DEFAULT_HARDWARE_PRESET,
    }
}

/// Output container token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    #[default]
    Mp4,
    Mkv,
    Avi,
    Mov,
    Webm,
}

impl Container {
    /// Returns the file extension for this container.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Webm => "webm",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Immutable description of how a job should be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderProfile {
    pub codec_family: CodecFamily,
    #[serde(default)]
    pub quality_preset: QualityPreset,
    #[serde(default)]
    pub container: Container,
    /// Whether the user asked for the hardware path. Kept for reporting even
    /// when the job falls back to software.
    #[serde(default)]
    pub hardware_requested: bool,
}

impl EncoderProfile {
    pub fn software(quality_preset: QualityPreset, container: Container) -> Self {
        Self {
            codec_family: CodecFamily::Software,
            quality_preset,
            container,
            hardware_requested: false,
        }
    }

    pub fn hardware(quality_preset: QualityPreset, container: Container) -> Self {
        Self {
            codec_family: CodecFamily::Hardware,
            quality_preset,
            container,
            hardware_requested: true,
        }
    }

    /// Whether the hardware path was asked for, by flag or by family.
    pub fn wants_hardware(&self) -> bool {
        self.hardware_requested || self.codec_family == CodecFamily::Hardware
    }

    /// Preset token for the given family.
    pub fn preset_token(&self, family: CodecFamily) -> &'static str {
        match family {
            CodecFamily::Software => self.quality_preset.software_token(),
            CodecFamily::Hardware => self.quality_preset.hardware_token(),
        }
    }
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self::software(QualityPreset::default(), Container::default())
    }
}

/// A conversion request submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub profile: EncoderProfile,
}

impl ConversionRequest {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        profile: EncoderProfile,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            profile,
        }
    }

    /// Builds a request whose output path is derived from the input.
    pub fn derived(
        input_path: impl Into<PathBuf>,
        output_dir: Option<&Path>,
        profile: EncoderProfile,
    ) -> Self {
        let input_path = input_path.into();
        let output_path = derive_output_path(&input_path, output_dir, profile.container);
        Self {
            input_path,
            output_path,
            profile,
        }
    }
}

/// Output path for `input`: same stem with the container extension, placed
/// in `output_dir` when given, otherwise next to the input.
pub fn derive_output_path(input: &Path, output_dir: Option<&Path>, container: Container) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut file_name = stem;
    file_name.push(".");
    file_name.push(container.extension());

    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    }
}
