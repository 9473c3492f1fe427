//! Input inspection: duration lookup for progress and a media summary for
//! display.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::error::ToolError;
use super::progress::parse_banner_duration;
use super::tool::{Invocation, MediaTool};
use crate::config::ProbeConfig;

/// Summary of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub file_name: String,
    pub format: String,
    pub size_bytes: u64,
    pub duration_secs: f64,
    /// Overall bitrate in kbit/s.
    pub bitrate_kbps: Option<u64>,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    /// `"1920x1080"`, if the file has a video stream with known dimensions.
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }

    /// Size in GB above one gigabyte, otherwise MB.
    pub fn display_size(&self) -> String {
        const MB: f64 = 1024.0 * 1024.0;
        const GB: f64 = MB * 1024.0;
        let bytes = self.size_bytes as f64;
        if bytes >= GB {
            format!("{:.2} GB", bytes / GB)
        } else {
            format!("{:.2} MB", bytes / MB)
        }
    }

    /// `HH:MM:SS.mmm`.
    pub fn display_duration(&self) -> String {
        let total_ms = (self.duration_secs.max(0.0) * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let seconds = (total_ms % 60_000) / 1000;
        let millis = total_ms % 1000;
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    }

    pub fn display_bitrate(&self) -> Option<String> {
        self.bitrate_kbps.map(|kbps| format!("{} Kbps", kbps))
    }
}

/// Parses `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, ToolError> {
    #[derive(Deserialize)]
    struct ProbeOutput {
        format: ProbeFormat,
        #[serde(default)]
        streams: Vec<ProbeStream>,
    }

    #[derive(Deserialize)]
    struct ProbeFormat {
        format_name: String,
        duration: Option<String>,
        size: Option<String>,
        bit_rate: Option<String>,
    }

    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: String,
        codec_name: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
    }

    let probe: ProbeOutput = serde_json::from_str(output)
        .map_err(|e| ToolError::parse("ffprobe output", e.to_string()))?;

    let duration_secs = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size_bytes = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let bitrate_kbps = probe
        .format
        .bit_rate
        .as_ref()
        .and_then(|b| b.parse::<u64>().ok())
        .map(|b| b / 1000);

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    let format_name = probe
        .format
        .format_name
        .split(',')
        .next()
        .unwrap_or("unknown");

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    Ok(MediaInfo {
        file_name,
        format: format_name.to_string(),
        size_bytes,
        duration_secs,
        bitrate_kbps,
        video_codec: video_stream.and_then(|s| s.codec_name.clone()),
        width: video_stream.and_then(|s| s.width),
        height: video_stream.and_then(|s| s.height),
        audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
    })
}

/// Describes the media file at `path`.
pub async fn inspect(
    tool: &dyn MediaTool,
    probe: &ProbeConfig,
    path: &Path,
) -> Result<MediaInfo, ToolError> {
    let output = tool
        .run(&Invocation::media_info(path), probe.duration_timeout())
        .await?;

    if !output.success() {
        return Err(ToolError::Failed {
            program: "ffprobe".to_string(),
            reason: output.stderr.trim().to_string(),
        });
    }

    parse_probe_output(path, &output.stdout)
}

/// Total duration of `input` in seconds, or 0 when it cannot be determined.
///
/// Tries the machine-readable ffprobe query first, then scans the ffmpeg
/// banner. Both calls are bounded by the duration timeout.
pub async fn probe_duration(tool: &dyn MediaTool, probe: &ProbeConfig, input: &Path) -> f64 {
    let limit = probe.duration_timeout();

    match tool.run(&Invocation::duration_query(input), limit).await {
        Ok(output) if output.success() => match output.stdout.trim().parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs > 0.0 => return secs,
            _ => debug!(stdout = %output.stdout.trim(), "Unusable ffprobe duration"),
        },
        Ok(output) => debug!(exit_code = ?output.exit_code, "ffprobe duration query failed"),
        Err(e) => debug!(error = %e, "ffprobe duration query failed"),
    }

    match tool.run(&Invocation::banner(input), limit).await {
        Ok(output) => {
            // The banner goes to stderr; check both in case of redirection.
            parse_banner_duration(&output.stderr)
                .or_else(|| parse_banner_duration(&output.stdout))
                .filter(|secs| *secs > 0.0)
                .unwrap_or(0.0)
        }
        Err(e) => {
            debug!(error = %e, "ffmpeg banner probe failed");
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(size_bytes: u64, duration_secs: f64) -> MediaInfo {
        MediaInfo {
            file_name: "clip.mp4".to_string(),
            format: "mov".to_string(),
            size_bytes,
            duration_secs,
            bitrate_kbps: Some(4500),
            video_codec: Some("h264".to_string()),
            width: Some(1920),
            height: Some(1080),
            audio_codec: Some("aac".to_string()),
        }
    }

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "/media/movie.mkv",
                "format_name": "matroska,webm",
                "duration": "7200.0",
                "size": "5000000000",
                "bit_rate": "5555555"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac"
                }
            ]
        }"#;

        let info = parse_probe_output(Path::new("/media/movie.mkv"), json).unwrap();
        assert_eq!(info.file_name, "movie.mkv");
        assert_eq!(info.format, "matroska");
        assert_eq!(info.size_bytes, 5_000_000_000);
        assert_eq!(info.bitrate_kbps, Some(5555));
        assert_eq!(info.resolution(), Some("1920x1080".to_string()));
        assert_eq!(info.video_codec, Some("h264".to_string()));
        assert_eq!(info.audio_codec, Some("aac".to_string()));
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let json = r#"{
            "format": {"format_name": "flac", "duration": "180.5"},
            "streams": [{"codec_type": "audio", "codec_name": "flac"}]
        }"#;
        let info = parse_probe_output(Path::new("song.flac"), json).unwrap();
        assert!((info.duration_secs - 180.5).abs() < 1e-9);
        assert_eq!(info.size_bytes, 0);
        assert_eq!(info.resolution(), None);
        assert_eq!(info.display_bitrate(), None);
    }

    #[test]
    fn test_parse_probe_output_invalid() {
        let err = parse_probe_output(Path::new("x"), "not json").unwrap_err();
        assert!(matches!(err, ToolError::Parse { .. }));
    }

    #[test]
    fn test_display_size() {
        assert_eq!(info(512 * 1024 * 1024, 0.0).display_size(), "512.00 MB");
        assert_eq!(info(1610612736, 0.0).display_size(), "1.50 GB");
    }

    #[test]
    fn test_display_duration() {
        assert_eq!(info(0, 5415.52).display_duration(), "01:30:15.520");
        assert_eq!(info(0, 0.0).display_duration(), "00:00:00.000");
    }

    #[test]
    fn test_display_bitrate() {
        assert_eq!(info(0, 0.0).display_bitrate(), Some("4500 Kbps".to_string()));
    }
}
