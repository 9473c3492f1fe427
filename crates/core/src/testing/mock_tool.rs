//! Mock media tool for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::converter::{Invocation, MediaTool, Program, ToolError, ToolOutput, ToolProcess};

/// Encoder listing returned by default: software and hardware H.264.
pub const DEFAULT_ENCODER_LISTING: &str = "Encoders:\n \
V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10 (codec h264)\n \
V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)\n \
A....D aac                  AAC (Advanced Audio Coding)\n";

/// Scripted behavior of one conversion process.
#[derive(Debug, Clone)]
pub struct MockRun {
    /// Lines produced before the process exits (or hangs).
    pub lines: Vec<String>,
    /// Exit code once lines are exhausted.
    pub exit_code: Option<i32>,
    /// Keep running after the last line until killed.
    pub hang: bool,
    /// Delay before each line.
    pub line_delay: Duration,
    /// Time a killed process takes to exit.
    pub exit_delay: Duration,
}

impl Default for MockRun {
    fn default() -> Self {
        Self::success(progress_lines(60.0, 4))
    }
}

impl MockRun {
    pub fn success(lines: Vec<String>) -> Self {
        Self {
            lines,
            exit_code: Some(0),
            hang: false,
            line_delay: Duration::ZERO,
            exit_delay: Duration::ZERO,
        }
    }

    pub fn failure(lines: Vec<String>, exit_code: i32) -> Self {
        Self {
            lines,
            exit_code: Some(exit_code),
            hang: false,
            line_delay: Duration::ZERO,
            exit_delay: Duration::ZERO,
        }
    }

    /// Prints `lines` then runs until killed.
    pub fn hang(lines: Vec<String>) -> Self {
        Self {
            lines,
            exit_code: None,
            hang: true,
            line_delay: Duration::ZERO,
            exit_delay: Duration::ZERO,
        }
    }

    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    pub fn with_exit_delay(mut self, delay: Duration) -> Self {
        self.exit_delay = delay;
        self
    }
}

/// ffmpeg-style status lines at `steps` even intervals up to (but not
/// including) the end of a `duration_secs` input.
pub fn progress_lines(duration_secs: f64, steps: usize) -> Vec<String> {
    (1..=steps)
        .map(|i| {
            let t = duration_secs * i as f64 / (steps + 1) as f64;
            let h = (t / 3600.0) as u64;
            let m = ((t % 3600.0) / 60.0) as u64;
            let s = t % 60.0;
            format!(
                "frame={:5} fps= 30 q=28.0 size=    1024kB time={:02}:{:02}:{:05.2} bitrate= 512.0kbits/s speed=2.0x",
                i * 30,
                h,
                m,
                s
            )
        })
        .collect()
}

/// Scripted outcome of the hardware self-test encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockSynthetic {
    Pass,
    Fail { exit_code: i32, stderr: String },
    Timeout,
}

#[derive(Debug, Default)]
struct Counters {
    running: usize,
    max_running: usize,
    kills: usize,
}

/// Mock implementation of the [`MediaTool`] trait.
///
/// Provides controllable behavior for testing:
/// - Installed or missing tool
/// - Durations via ffprobe or the ffmpeg banner
/// - Encoder listing and self-test outcome
/// - Per-input conversion scripts, including processes that hang until killed
/// - Recorded invocations, kills and peak concurrency for assertions
///
/// # Example
///
/// ```rust,ignore
/// use convertino_core::testing::{MockMediaTool, MockRun};
///
/// let tool = MockMediaTool::new();
/// tool.set_duration("/in/a.mp4", 120.0).await;
/// tool.set_run("/in/a.mp4", MockRun::failure(vec!["Unknown encoder 'libx264'".into()], 1)).await;
///
/// // Use with JobQueue::new(Arc::new(tool), config)
/// ```
#[derive(Debug, Clone)]
pub struct MockMediaTool {
    installed: Arc<RwLock<bool>>,
    /// ffprobe answers by input; `None` makes ffprobe fail for that input.
    durations: Arc<RwLock<HashMap<PathBuf, Option<f64>>>>,
    default_duration: Arc<RwLock<Option<f64>>>,
    /// ffmpeg banner (stderr of `ffmpeg -i`) by input.
    banners: Arc<RwLock<HashMap<PathBuf, String>>>,
    encoder_listing: Arc<RwLock<String>>,
    synthetic: Arc<RwLock<MockSynthetic>>,
    device_info: Arc<RwLock<Option<String>>>,
    media_info: Arc<RwLock<HashMap<PathBuf, String>>>,
    runs: Arc<RwLock<HashMap<PathBuf, MockRun>>>,
    default_run: Arc<RwLock<MockRun>>,
    invocations: Arc<RwLock<Vec<Invocation>>>,
    spawned: Arc<RwLock<Vec<Invocation>>>,
    counters: Arc<RwLock<Counters>>,
}

impl Default for MockMediaTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaTool {
    /// Create a mock tool that is installed, reports 60 second inputs, lists
    /// the hardware encoder and passes the self-test.
    pub fn new() -> Self {
        Self {
            installed: Arc::new(RwLock::new(true)),
            durations: Arc::new(RwLock::new(HashMap::new())),
            default_duration: Arc::new(RwLock::new(Some(60.0))),
            banners: Arc::new(RwLock::new(HashMap::new())),
            encoder_listing: Arc::new(RwLock::new(DEFAULT_ENCODER_LISTING.to_string())),
            synthetic: Arc::new(RwLock::new(MockSynthetic::Pass)),
            device_info: Arc::new(RwLock::new(None)),
            media_info: Arc::new(RwLock::new(HashMap::new())),
            runs: Arc::new(RwLock::new(HashMap::new())),
            default_run: Arc::new(RwLock::new(MockRun::default())),
            invocations: Arc::new(RwLock::new(Vec::new())),
            spawned: Arc::new(RwLock::new(Vec::new())),
            counters: Arc::new(RwLock::new(Counters::default())),
        }
    }

    pub async fn set_installed(&self, installed: bool) {
        *self.installed.write().await = installed;
    }

    pub async fn set_duration(&self, input: impl AsRef<Path>, secs: f64) {
        self.durations
            .write()
            .await
            .insert(input.as_ref().to_path_buf(), Some(secs));
    }

    /// Make ffprobe fail for `input`.
    pub async fn set_duration_unknown(&self, input: impl AsRef<Path>) {
        self.durations
            .write()
            .await
            .insert(input.as_ref().to_path_buf(), None);
    }

    /// Duration for inputs without an explicit entry; `None` makes ffprobe fail.
    pub async fn set_default_duration(&self, secs: Option<f64>) {
        *self.default_duration.write().await = secs;
    }

    pub async fn set_banner(&self, input: impl AsRef<Path>, banner: impl Into<String>) {
        self.banners
            .write()
            .await
            .insert(input.as_ref().to_path_buf(), banner.into());
    }

    pub async fn set_encoder_listing(&self, listing: impl Into<String>) {
        *self.encoder_listing.write().await = listing.into();
    }

    pub async fn set_synthetic(&self, outcome: MockSynthetic) {
        *self.synthetic.write().await = outcome;
    }

    pub async fn set_device_info(&self, info: Option<String>) {
        *self.device_info.write().await = info;
    }

    /// ffprobe JSON for `input`.
    pub async fn set_media_info(&self, input: impl AsRef<Path>, json: impl Into<String>) {
        self.media_info
            .write()
            .await
            .insert(input.as_ref().to_path_buf(), json.into());
    }

    /// Conversion script for `input`.
    pub async fn set_run(&self, input: impl AsRef<Path>, run: MockRun) {
        self.runs
            .write()
            .await
            .insert(input.as_ref().to_path_buf(), run);
    }

    pub async fn set_default_run(&self, run: MockRun) {
        *self.default_run.write().await = run;
    }

    /// Every invocation passed to `run` or `spawn`, in order.
    pub async fn invocations(&self) -> Vec<Invocation> {
        self.invocations.read().await.clone()
    }

    /// Conversion invocations passed to `spawn`, in order.
    pub async fn spawned(&self) -> Vec<Invocation> {
        self.spawned.read().await.clone()
    }

    pub async fn kill_count(&self) -> usize {
        self.counters.read().await.kills
    }

    /// Highest number of conversion processes alive at once.
    pub async fn max_concurrent(&self) -> usize {
        self.counters.read().await.max_running
    }

    pub async fn running_count(&self) -> usize {
        self.counters.read().await.running
    }

    fn not_found(program: Program) -> ToolError {
        ToolError::NotFound {
            program: program.to_string(),
            path: PathBuf::from(program.as_str()),
        }
    }

    fn output(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> ToolOutput {
        ToolOutput {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    fn input_of(invocation: &Invocation) -> PathBuf {
        invocation
            .input_path()
            .map(PathBuf::from)
            .unwrap_or_default()
    }

    async fn duration_for(&self, input: &Path) -> Option<f64> {
        match self.durations.read().await.get(input) {
            Some(secs) => *secs,
            None => *self.default_duration.read().await,
        }
    }
}

#[async_trait]
impl MediaTool for MockMediaTool {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, invocation: &Invocation, limit: Duration) -> Result<ToolOutput, ToolError> {
        self.invocations.write().await.push(invocation.clone());

        if invocation.program == Program::DeviceInfo {
            return match self.device_info.read().await.clone() {
                Some(info) => Ok(Self::output(0, info, "")),
                None => Err(Self::not_found(Program::DeviceInfo)),
            };
        }

        if !*self.installed.read().await {
            return Err(Self::not_found(invocation.program));
        }

        let input = Self::input_of(invocation);
        match invocation.program {
            Program::Ffmpeg if invocation.has_arg("-version") => Ok(Self::output(
                0,
                "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers",
                "",
            )),
            Program::Ffmpeg if invocation.has_arg("-encoders") => {
                Ok(Self::output(0, self.encoder_listing.read().await.clone(), ""))
            }
            Program::Ffmpeg if invocation.has_arg("lavfi") => {
                match self.synthetic.read().await.clone() {
                    MockSynthetic::Pass => Ok(Self::output(0, "", "")),
                    MockSynthetic::Fail { exit_code, stderr } => {
                        Ok(Self::output(exit_code, "", stderr))
                    }
                    MockSynthetic::Timeout => Err(ToolError::Timeout {
                        program: Program::Ffmpeg.to_string(),
                        timeout_secs: limit.as_secs(),
                    }),
                }
            }
            Program::Ffmpeg => {
                let banner = self
                    .banners
                    .read()
                    .await
                    .get(&input)
                    .cloned()
                    .unwrap_or_default();
                Ok(Self::output(
                    1,
                    "",
                    format!("{}\nAt least one output file must be specified", banner),
                ))
            }
            Program::Ffprobe if invocation.has_arg("format=duration") => {
                match self.duration_for(&input).await {
                    Some(secs) => Ok(Self::output(0, format!("{:.6}\n", secs), "")),
                    None => Ok(Self::output(
                        1,
                        "",
                        format!("{}: Invalid data found when processing input", input.display()),
                    )),
                }
            }
            Program::Ffprobe => match self.media_info.read().await.get(&input) {
                Some(json) => Ok(Self::output(0, json.clone(), "")),
                None => Ok(Self::output(
                    1,
                    "",
                    format!("{}: No such file or directory", input.display()),
                )),
            },
            Program::DeviceInfo => Err(Self::not_found(Program::DeviceInfo)),
        }
    }

    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ToolProcess>, ToolError> {
        self.invocations.write().await.push(invocation.clone());
        if !*self.installed.read().await {
            return Err(Self::not_found(invocation.program));
        }
        self.spawned.write().await.push(invocation.clone());

        let input = Self::input_of(invocation);
        let script = match self.runs.read().await.get(&input) {
            Some(run) => run.clone(),
            None => self.default_run.read().await.clone(),
        };

        {
            let mut counters = self.counters.write().await;
            counters.running += 1;
            counters.max_running = counters.max_running.max(counters.running);
        }

        Ok(Box::new(MockProcess {
            lines: script.lines.into(),
            exit_code: script.exit_code,
            hang: script.hang,
            line_delay: script.line_delay,
            exit_delay: script.exit_delay,
            killed: CancellationToken::new(),
            reaped: false,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MockProcess {
    lines: VecDeque<String>,
    exit_code: Option<i32>,
    hang: bool,
    line_delay: Duration,
    exit_delay: Duration,
    killed: CancellationToken,
    reaped: bool,
    counters: Arc<RwLock<Counters>>,
}

#[async_trait]
impl ToolProcess for MockProcess {
    async fn next_line(&mut self) -> Result<Option<String>, ToolError> {
        if self.killed.is_cancelled() {
            return Ok(None);
        }
        if !self.line_delay.is_zero() && !self.lines.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(self.line_delay) => {}
                _ = self.killed.cancelled() => return Ok(None),
            }
        }
        if let Some(line) = self.lines.pop_front() {
            return Ok(Some(line));
        }
        if self.hang {
            self.killed.cancelled().await;
        }
        Ok(None)
    }

    async fn kill(&mut self) -> Result<(), ToolError> {
        if !self.killed.is_cancelled() {
            self.killed.cancel();
            self.counters.write().await.kills += 1;
        }
        Ok(())
    }

    async fn wait(&mut self) -> Result<Option<i32>, ToolError> {
        if self.hang {
            self.killed.cancelled().await;
        }
        if !self.reaped {
            if self.killed.is_cancelled() && !self.exit_delay.is_zero() {
                tokio::time::sleep(self.exit_delay).await;
            }
            self.reaped = true;
            let mut counters = self.counters.write().await;
            counters.running = counters.running.saturating_sub(1);
        }
        if self.killed.is_cancelled() {
            Ok(None)
        } else {
            Ok(self.exit_code)
        }
    }
}
