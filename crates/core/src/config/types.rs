use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// External media tool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Hardware device information tool (best effort diagnostics only).
    #[serde(default = "default_device_info_path")]
    pub device_info_path: PathBuf,

    /// Software (CPU) video encoder.
    #[serde(default = "default_software_encoder")]
    pub software_encoder: String,

    /// Hardware (GPU) video encoder.
    #[serde(default = "default_hardware_encoder")]
    pub hardware_encoder: String,

    /// Audio codec used by both encoder paths.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_device_info_path() -> PathBuf {
    PathBuf::from("nvidia-smi")
}

fn default_software_encoder() -> String {
    "libx264".to_string()
}

fn default_hardware_encoder() -> String {
    "h264_nvenc".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            device_info_path: default_device_info_path(),
            software_encoder: default_software_encoder(),
            hardware_encoder: default_hardware_encoder(),
            audio_codec: default_audio_codec(),
        }
    }
}

/// Timeouts (seconds) for the short diagnostic invocations.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_short_timeout")]
    pub version_timeout_secs: u64,
    #[serde(default = "default_short_timeout")]
    pub duration_timeout_secs: u64,
    #[serde(default = "default_short_timeout")]
    pub encoder_list_timeout_secs: u64,
    #[serde(default = "default_short_timeout")]
    pub device_info_timeout_secs: u64,
    #[serde(default = "default_synthetic_timeout")]
    pub synthetic_test_timeout_secs: u64,
}

fn default_short_timeout() -> u64 {
    5
}

fn default_synthetic_timeout() -> u64 {
    10
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            version_timeout_secs: default_short_timeout(),
            duration_timeout_secs: default_short_timeout(),
            encoder_list_timeout_secs: default_short_timeout(),
            device_info_timeout_secs: default_short_timeout(),
            synthetic_test_timeout_secs: default_synthetic_timeout(),
        }
    }
}

impl ProbeConfig {
    pub fn version_timeout(&self) -> Duration {
        Duration::from_secs(self.version_timeout_secs)
    }

    pub fn duration_timeout(&self) -> Duration {
        Duration::from_secs(self.duration_timeout_secs)
    }

    pub fn encoder_list_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_list_timeout_secs)
    }

    pub fn device_info_timeout(&self) -> Duration {
        Duration::from_secs(self.device_info_timeout_secs)
    }

    pub fn synthetic_test_timeout(&self) -> Duration {
        Duration::from_secs(self.synthetic_test_timeout_secs)
    }

    /// All timeouts with their config key, for validation.
    pub(crate) fn named_timeouts(&self) -> [(&'static str, u64); 5] {
        [
            ("probe.version_timeout_secs", self.version_timeout_secs),
            ("probe.duration_timeout_secs", self.duration_timeout_secs),
            (
                "probe.encoder_list_timeout_secs",
                self.encoder_list_timeout_secs,
            ),
            (
                "probe.device_info_timeout_secs",
                self.device_info_timeout_secs,
            ),
            (
                "probe.synthetic_test_timeout_secs",
                self.synthetic_test_timeout_secs,
            ),
        ]
    }
}

/// Job queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Capacity of the engine event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tool.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.tool.hardware_encoder, "h264_nvenc");
        assert_eq!(config.tool.software_encoder, "libx264");
        assert_eq!(config.tool.audio_codec, "aac");
        assert_eq!(config.probe.synthetic_test_timeout_secs, 10);
        assert_eq!(config.queue.event_buffer, 256);
    }

    #[test]
    fn test_deserialize_partial_tool_section() {
        let toml = r#"
            [tool]
            ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.tool.ffmpeg_path,
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
        assert_eq!(config.tool.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.probe.duration_timeout_secs, 5);
    }

    #[test]
    fn test_probe_timeouts_as_durations() {
        let probe = ProbeConfig::default();
        assert_eq!(probe.synthetic_test_timeout(), Duration::from_secs(10));
        assert_eq!(probe.duration_timeout(), Duration::from_secs(5));
    }
}
