//! The seam between the engine and the external media tool.
//!
//! The engine never builds `Command`s itself. It describes what to run as an
//! [`Invocation`] and hands it to a [`MediaTool`], which is either the real
//! ffmpeg-backed implementation or a scripted one in tests.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use super::error::ToolError;
use super::types::{CodecFamily, EncoderProfile};
use crate::config::ToolConfig;

/// Generated input for the hardware self-test: 32x32 black, 1 fps, 1 second.
pub const SYNTHETIC_SOURCE: &str = "color=c=black:s=32x32:r=1:d=1";

/// Which binary an invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Program {
    Ffmpeg,
    Ffprobe,
    DeviceInfo,
}

impl Program {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Ffprobe => "ffprobe",
            Self::DeviceInfo => "device-info",
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: Program,
    pub args: Vec<String>,
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

impl Invocation {
    pub fn new(program: Program, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// `ffmpeg -version`, used as the installation check.
    pub fn version() -> Self {
        Self::new(Program::Ffmpeg, vec!["-version".to_string()])
    }

    /// The main conversion command for `family`.
    ///
    /// Software: `-i IN -c:v <sw> -preset <tok> -c:a <audio> -y OUT`.
    /// Hardware: `-i IN -c:v <hw> -preset <tok> -b:v 0 -c:a <audio> -y OUT`.
    /// The output path is always the final argument.
    pub fn conversion(
        tool: &ToolConfig,
        input: &Path,
        output: &Path,
        profile: &EncoderProfile,
        family: CodecFamily,
    ) -> Self {
        let mut args = vec!["-i".to_string(), path_arg(input)];

        match family {
            CodecFamily::Hardware => {
                args.extend([
                    "-c:v".to_string(),
                    tool.hardware_encoder.clone(),
                    "-preset".to_string(),
                    profile.preset_token(family).to_string(),
                    // Variable bitrate
                    "-b:v".to_string(),
                    "0".to_string(),
                ]);
            }
            CodecFamily::Software => {
                args.extend([
                    "-c:v".to_string(),
                    tool.software_encoder.clone(),
                    "-preset".to_string(),
                    profile.preset_token(family).to_string(),
                ]);
            }
        }

        args.extend(["-c:a".to_string(), tool.audio_codec.clone()]);

        // Overwrite output, output last
        args.push("-y".to_string());
        args.push(path_arg(output));

        Self::new(Program::Ffmpeg, args)
    }

    /// Machine-readable single-value duration query.
    pub fn duration_query(input: &Path) -> Self {
        Self::new(
            Program::Ffprobe,
            vec![
                "-v".to_string(),
                "error".to_string(),
                "-show_entries".to_string(),
                "format=duration".to_string(),
                "-of".to_string(),
                "default=noprint_wrappers=1:nokey=1".to_string(),
                path_arg(input),
            ],
        )
    }

    /// `ffmpeg -i IN` with no output: exits nonzero but prints the banner,
    /// including `Duration: HH:MM:SS.ff`, on stderr.
    pub fn banner(input: &Path) -> Self {
        Self::new(Program::Ffmpeg, vec!["-i".to_string(), path_arg(input)])
    }

    /// Full JSON description of an input file.
    pub fn media_info(input: &Path) -> Self {
        Self::new(
            Program::Ffprobe,
            vec![
                "-v".to_string(),
                "quiet".to_string(),
                "-print_format".to_string(),
                "json".to_string(),
                "-show_format".to_string(),
                "-show_streams".to_string(),
                path_arg(input),
            ],
        )
    }

    pub fn list_encoders() -> Self {
        Self::new(
            Program::Ffmpeg,
            vec!["-hide_banner".to_string(), "-encoders".to_string()],
        )
    }

    /// One-frame test encode through the hardware encoder into the null muxer.
    pub fn synthetic_test(tool: &ToolConfig) -> Self {
        let args = [
            "-hide_banner",
            "-y",
            "-f",
            "lavfi",
            "-i",
            SYNTHETIC_SOURCE,
            "-c:v",
            tool.hardware_encoder.as_str(),
            "-preset",
            "p1",
            "-profile:v",
            "baseline",
            "-b:v",
            "250k",
            "-f",
            "null",
            "-",
        ];
        Self::new(Program::Ffmpeg, args.iter().map(|a| a.to_string()).collect())
    }

    /// Hardware device listing; diagnostics only.
    pub fn device_info() -> Self {
        Self::new(Program::DeviceInfo, Vec::new())
    }

    /// The input file of this invocation, if it has one: the argument after
    /// `-i`, or the trailing path for ffprobe.
    pub fn input_path(&self) -> Option<&str> {
        if let Some(pos) = self.args.iter().position(|a| a == "-i") {
            return self.args.get(pos + 1).map(String::as_str);
        }
        match self.program {
            Program::Ffprobe => self.args.last().map(String::as_str),
            _ => None,
        }
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a short, bounded invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A running long-lived process whose combined output is read line by line.
#[async_trait]
pub trait ToolProcess: Send {
    /// Next line of combined stdout/stderr, `None` once both streams closed.
    ///
    /// Must be cancel-safe: dropping the future loses no lines.
    async fn next_line(&mut self) -> Result<Option<String>, ToolError>;

    /// Requests termination. Succeeds if the process already exited.
    async fn kill(&mut self) -> Result<(), ToolError>;

    /// Waits for exit and returns the exit code (`None` if killed by a signal).
    async fn wait(&mut self) -> Result<Option<i32>, ToolError>;
}

/// Runs the external media tool.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Returns the name of this tool implementation.
    fn name(&self) -> &str;

    /// Runs a short invocation to completion, killing it after `limit`.
    async fn run(&self, invocation: &Invocation, limit: Duration) -> Result<ToolOutput, ToolError>;

    /// Spawns a long-running invocation with its output captured as lines.
    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ToolProcess>, ToolError>;

    /// Whether ffmpeg can be executed at all. Any exit status counts as
    /// installed; a missing binary or a timeout does not.
    async fn is_installed(&self, limit: Duration) -> bool {
        self.run(&Invocation::version(), limit).await.is_ok()
    }
}
