//! Progress extraction from ffmpeg status output.
//!
//! Everything in here is pure: it never spawns processes and never fails
//! loudly. Unparseable input yields `None`.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Elapsed media time marker in status lines, e.g. `time=00:01:02.50`.
static TIME_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=(\d+):(\d+):(\d+(?:\.\d+)?)").expect("valid time regex"));

/// Total duration line in the startup banner, e.g. `Duration: 00:02:00.04,`.
static BANNER_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration: (\d{2}):(\d{2}):(\d{2}\.\d+)").expect("valid duration regex")
});

/// Highest percentage a parsed sample may report. Only a successful exit
/// reports 100.
pub const MAX_PARSED_PERCENT: u8 = 99;

/// A progress reading extracted from one output line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Percentage complete (0-99).
    pub percent: u8,
    /// Estimated seconds remaining.
    pub eta_secs: f64,
}

impl ProgressSample {
    /// The sample reported when the process exits successfully.
    pub fn finished() -> Self {
        Self {
            percent: 100,
            eta_secs: 0.0,
        }
    }
}

fn hms_to_secs(h: &str, m: &str, s: &str) -> Option<f64> {
    let h: u64 = h.parse().ok()?;
    let m: u64 = m.parse().ok()?;
    let s: f64 = s.parse().ok()?;
    let whole = h.checked_mul(3600)?.checked_add(m.checked_mul(60)?)?;
    let total = whole as f64 + s;
    total.is_finite().then_some(total)
}

/// Extracts the elapsed media time (seconds) from a status line.
pub fn parse_elapsed(line: &str) -> Option<f64> {
    let caps = TIME_MARKER.captures(line)?;
    hms_to_secs(caps.get(1)?.as_str(), caps.get(2)?.as_str(), caps.get(3)?.as_str())
}

/// Scans ffmpeg startup banner text for the input duration (seconds).
pub fn parse_banner_duration(text: &str) -> Option<f64> {
    let caps = BANNER_DURATION.captures(text)?;
    hms_to_secs(caps.get(1)?.as_str(), caps.get(2)?.as_str(), caps.get(3)?.as_str())
}

/// Turns one output line into a progress sample.
///
/// `percent = floor(elapsed_media / duration * 100)` clamped to `0..=99`;
/// ETA is a linear extrapolation from wall time spent so far, 0 while the
/// percentage is 0.
pub fn parse_progress(
    line: &str,
    duration_secs: f64,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<ProgressSample> {
    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return None;
    }

    let current = parse_elapsed(line)?;
    let ratio = current / duration_secs * 100.0;
    if !ratio.is_finite() {
        return None;
    }
    let percent = ratio.floor().clamp(0.0, MAX_PARSED_PERCENT as f64) as u8;

    let elapsed_wall = ((now - started_at).num_milliseconds().max(0) as f64) / 1000.0;
    let eta_secs = if percent > 0 {
        elapsed_wall * 100.0 / percent as f64 - elapsed_wall
    } else {
        0.0
    };

    Some(ProgressSample {
        percent,
        eta_secs: eta_secs.max(0.0),
    })
}

/// Formats an ETA for display.
pub fn format_eta(eta_secs: f64) -> String {
    if eta_secs.is_nan() || eta_secs <= 0.0 {
        return "Almost done...".to_string();
    }
    let secs = eta_secs as u64;
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
