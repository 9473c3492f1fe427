//! Testing utilities and mock implementations.
//!
//! This module provides a mock of the external media tool, allowing the
//! queue, the capability probe and the HTTP API to be tested without ffmpeg
//! installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use convertino_core::testing::{fixtures, MockMediaTool, MockRun};
//!
//! let tool = MockMediaTool::new();
//! tool.set_run("/in/a.mp4", MockRun::hang(vec![])).await;
//!
//! let queue = JobQueue::new(Arc::new(tool.clone()), Arc::new(fixtures::config()));
//! ```

mod mock_tool;

pub use mock_tool::{
    progress_lines, MockMediaTool, MockRun, MockSynthetic, DEFAULT_ENCODER_LISTING,
};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use crate::config::Config;
    use crate::converter::{Container, ConversionRequest, EncoderProfile, QualityPreset};

    /// Default configuration with the shortest allowed probe timeouts.
    pub fn config() -> Config {
        let mut config = Config::default();
        config.probe.version_timeout_secs = 1;
        config.probe.duration_timeout_secs = 1;
        config.probe.encoder_list_timeout_secs = 1;
        config.probe.device_info_timeout_secs = 1;
        config.probe.synthetic_test_timeout_secs = 1;
        config
    }

    /// Software request converting `input` to mp4 next to it.
    pub fn software_request(input: &str) -> ConversionRequest {
        ConversionRequest::derived(
            PathBuf::from(input),
            None,
            EncoderProfile::software(QualityPreset::Medium, Container::Mp4),
        )
    }

    /// Hardware request converting `input` to mp4 next to it.
    pub fn hardware_request(input: &str) -> ConversionRequest {
        ConversionRequest::derived(
            PathBuf::from(input),
            None,
            EncoderProfile::hardware(QualityPreset::Fast, Container::Mp4),
        )
    }

    /// ffprobe JSON for a 1080p h264/aac file.
    pub fn probe_json(duration_secs: f64, size_bytes: u64) -> String {
        format!(
            r#"{{
                "format": {{
                    "filename": "input.mp4",
                    "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                    "duration": "{}",
                    "size": "{}",
                    "bit_rate": "4500000"
                }},
                "streams": [
                    {{"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}},
                    {{"codec_type": "audio", "codec_name": "aac"}}
                ]
            }}"#,
            duration_secs, size_bytes
        )
    }
}
