pub mod config;
pub mod converter;
pub mod metrics;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ProbeConfig,
    QueueConfig, ServerConfig, ToolConfig,
};
pub use converter::{
    BatchMode, CapabilityReport, CodecFamily, Container, ConversionRequest, EncoderProfile,
    EngineEvent, ErrorKind, FfmpegTool, JobQueue, JobSnapshot, JobStatus, MediaInfo, MediaTool,
    QualityPreset, QueueError, QueueStatus, SubmitOptions, ToolError,
};
