//! FFmpeg-backed [`MediaTool`] implementation.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tracing::{debug, trace};

use super::error::ToolError;
use super::tool::{Invocation, MediaTool, Program, ToolOutput, ToolProcess};
use crate::config::ToolConfig;

/// Lines buffered between the pipe readers and the consumer.
const LINE_BUFFER: usize = 1024;

/// Runs ffmpeg, ffprobe and the device-info utility as child processes.
pub struct FfmpegTool {
    config: ToolConfig,
}

impl FfmpegTool {
    /// Creates a new FFmpeg tool with the given configuration.
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Creates a tool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ToolConfig::default())
    }

    fn program_path(&self, program: Program) -> &Path {
        match program {
            Program::Ffmpeg => &self.config.ffmpeg_path,
            Program::Ffprobe => &self.config.ffprobe_path,
            Program::DeviceInfo => &self.config.device_info_path,
        }
    }

    fn command(&self, invocation: &Invocation) -> Command {
        let mut command = Command::new(self.program_path(invocation.program));
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_child(&self, invocation: &Invocation) -> Result<Child, ToolError> {
        debug!(command = %invocation, "Spawning");
        self.command(invocation).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    program: invocation.program.to_string(),
                    path: self.program_path(invocation.program).to_path_buf(),
                }
            } else {
                ToolError::Io(e)
            }
        })
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn run(&self, invocation: &Invocation, limit: Duration) -> Result<ToolOutput, ToolError> {
        let child = self.spawn_child(invocation)?;

        // On timeout the future is dropped with the child, which kills it.
        match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(ToolOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
            Ok(Err(e)) => Err(ToolError::Io(e)),
            Err(_) => {
                debug!(command = %invocation, "Timed out");
                Err(ToolError::Timeout {
                    program: invocation.program.to_string(),
                    timeout_secs: limit.as_secs(),
                })
            }
        }
    }

    async fn spawn(&self, invocation: &Invocation) -> Result<Box<dyn ToolProcess>, ToolError> {
        let mut child = self.spawn_child(invocation)?;

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx));
        }

        Ok(Box::new(FfmpegProcess {
            child,
            lines: rx,
            readers,
        }))
    }
}

/// Forwards one pipe to the shared line channel.
///
/// ffmpeg rewrites its status line with bare carriage returns, so both `\r`
/// and `\n` terminate a line. Empty segments are dropped.
fn forward_lines<R>(pipe: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let codec = AnyDelimiterCodec::new(b"\r\n".to_vec(), Vec::new());
        let mut frames = FramedRead::new(pipe, codec);
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(bytes) => {
                    let line = String::from_utf8_lossy(&bytes);
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    trace!(line, "ffmpeg output");
                    if tx.send(line.to_string()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Output stream read failed");
                    break;
                }
            }
        }
    })
}

struct FfmpegProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
    readers: Vec<JoinHandle<()>>,
}

#[async_trait]
impl ToolProcess for FfmpegProcess {
    async fn next_line(&mut self) -> Result<Option<String>, ToolError> {
        Ok(self.lines.recv().await)
    }

    async fn kill(&mut self) -> Result<(), ToolError> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Already exited and reaped
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(ToolError::Io(e)),
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>, ToolError> {
        let status = self.child.wait().await?;
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        Ok(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn missing_tool() -> FfmpegTool {
        FfmpegTool::new(ToolConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ffprobe_path: PathBuf::from("/nonexistent/ffprobe-binary"),
            ..ToolConfig::default()
        })
    }

    #[test]
    fn test_program_path() {
        let tool = FfmpegTool::with_defaults();
        assert_eq!(tool.program_path(Program::Ffmpeg), Path::new("ffmpeg"));
        assert_eq!(tool.program_path(Program::Ffprobe), Path::new("ffprobe"));
        assert_eq!(tool.program_path(Program::DeviceInfo), Path::new("nvidia-smi"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_found() {
        let tool = missing_tool();
        let err = tool
            .run(&Invocation::version(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!tool.is_installed(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_not_found() {
        let tool = missing_tool();
        let result = tool.spawn(&Invocation::banner(Path::new("in.mp4"))).await;
        assert!(matches!(result, Err(ToolError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_splits_carriage_returns() {
        let tool = FfmpegTool::new(ToolConfig {
            ffmpeg_path: PathBuf::from("/bin/sh"),
            ..ToolConfig::default()
        });
        let invocation = Invocation::new(
            Program::Ffmpeg,
            vec![
                "-c".to_string(),
                r"printf 'a\rb\r\nc\n'; printf 'err\n' 1>&2; exit 3".to_string(),
            ],
        );

        let mut process = tool.spawn(&invocation).await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = process.next_line().await.unwrap() {
            lines.push(line);
        }
        let code = process.wait().await.unwrap();

        lines.sort();
        assert_eq!(lines, vec!["a", "b", "c", "err"]);
        assert_eq!(code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_times_out() {
        let tool = FfmpegTool::new(ToolConfig {
            ffmpeg_path: PathBuf::from("/bin/sh"),
            ..ToolConfig::default()
        });
        let invocation =
            Invocation::new(Program::Ffmpeg, vec!["-c".to_string(), "sleep 5".to_string()]);
        let err = tool
            .run(&invocation, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_terminates_process() {
        let tool = FfmpegTool::new(ToolConfig {
            ffmpeg_path: PathBuf::from("/bin/sh"),
            ..ToolConfig::default()
        });
        let invocation =
            Invocation::new(Program::Ffmpeg, vec!["-c".to_string(), "sleep 30".to_string()]);
        let mut process = tool.spawn(&invocation).await.unwrap();
        process.kill().await.unwrap();
        let code = timeout(Duration::from_secs(5), process.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, None);
    }
}
