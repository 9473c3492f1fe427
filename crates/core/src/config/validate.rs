use super::{types::Config, ConfigError};

/// Upper bound for any diagnostic probe; probes must never stall the queue.
const MAX_PROBE_TIMEOUT_SECS: u64 = 30;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Probe timeouts are bounded (1..=30 seconds)
/// - Encoder and codec names are not empty
/// - Event buffer is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    for (key, secs) in config.probe.named_timeouts() {
        if secs == 0 || secs > MAX_PROBE_TIMEOUT_SECS {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between 1 and {} seconds, got {}",
                key, MAX_PROBE_TIMEOUT_SECS, secs
            )));
        }
    }

    for (key, value) in [
        ("tool.software_encoder", &config.tool.software_encoder),
        ("tool.hardware_encoder", &config.tool.hardware_encoder),
        ("tool.audio_codec", &config.tool.audio_codec),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                key
            )));
        }
    }

    if config.queue.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "queue.event_buffer cannot be 0".to_string(),
        ));
    }

    Ok(())
}
