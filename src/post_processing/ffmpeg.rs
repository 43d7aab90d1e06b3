//! MP4 container conversion through ffmpeg

use async_trait::async_trait;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{PostProcessOutcome, PostProcessor, PostProgress, resolve_tool};
use crate::config::{PostProcessConfig, ToolsConfig};
use crate::error::{Error, PostProcessError, Result};
use crate::types::TaskStatus;

const TARGET_EXTENSION: &str = "mp4";

/// Bytes of ffmpeg stderr kept for the failure message
const STDERR_TAIL: usize = 2000;

#[allow(clippy::expect_used)]
static OUT_TIME_MICROS_RE: LazyLock<Regex> = LazyLock::new(|| {
    // ffmpeg reports microseconds under both keys
    Regex::new(r"^out_time_(?:ms|us)=(\d+)$").expect("out_time pattern is valid")
});

#[allow(clippy::expect_used)]
static OUT_TIME_CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^out_time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)$").expect("clock pattern is valid")
});

/// Elapsed output time in seconds from one line of `-progress` output.
///
/// ```
/// use media_dl::post_processing::parse_progress_seconds;
///
/// assert_eq!(parse_progress_seconds("out_time_ms=1500000"), Some(1.5));
/// assert_eq!(parse_progress_seconds("out_time=00:01:02.500000"), Some(62.5));
/// assert_eq!(parse_progress_seconds("frame=42"), None);
/// ```
pub fn parse_progress_seconds(line: &str) -> Option<f64> {
    let line = line.trim();
    if let Some(caps) = OUT_TIME_MICROS_RE.captures(line) {
        let micros: u64 = caps[1].parse().ok()?;
        return Some(micros as f64 / 1_000_000.0);
    }
    let caps = OUT_TIME_CLOCK_RE.captures(line)?;
    let hours: f64 = caps[1].parse().ok()?;
    let minutes: f64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Converts output time into percentages, emitting only when the whole percent grows.
#[derive(Debug)]
struct ConversionProgress {
    duration_secs: f64,
    last_whole: i64,
}

impl ConversionProgress {
    fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            last_whole: 0,
        }
    }

    fn observe(&mut self, seconds: f64) -> Option<f64> {
        if self.duration_secs <= 0.0 || seconds <= 0.0 {
            return None;
        }
        let percentage = (seconds * 100.0 / self.duration_secs).clamp(0.0, 100.0);
        let whole = percentage.floor() as i64;
        if whole > self.last_whole {
            self.last_whole = whole;
            Some(percentage)
        } else {
            None
        }
    }
}

/// Re-encodes downloads into MP4 (H.264 video, AAC audio).
///
/// Files that are already `.mp4` are not re-encoded, and an existing target file
/// is never overwritten.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    delete_original: bool,
    hardware_acceleration: bool,
}

impl FfmpegConverter {
    /// Create a converter with explicit binary paths
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            delete_original: true,
            hardware_acceleration: false,
        }
    }

    /// Resolve ffmpeg and ffprobe from configuration or PATH
    ///
    /// Returns `None` if either binary cannot be found.
    pub fn from_config(tools: &ToolsConfig, post: &PostProcessConfig) -> Option<Self> {
        let ffmpeg = resolve_tool(tools.ffmpeg_path.as_ref(), "ffmpeg", tools.search_path)?;
        let ffprobe = resolve_tool(tools.ffprobe_path.as_ref(), "ffprobe", tools.search_path)?;
        Some(
            Self::new(ffmpeg, ffprobe)
                .with_delete_original(post.delete_original)
                .with_hardware_acceleration(post.hardware_acceleration),
        )
    }

    /// Remove the source file after a successful conversion
    pub fn with_delete_original(mut self, delete: bool) -> Self {
        self.delete_original = delete;
        self
    }

    /// Decode with CUDA and encode with NVENC
    pub fn with_hardware_acceleration(mut self, enabled: bool) -> Self {
        self.hardware_acceleration = enabled;
        self
    }

    fn encode_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if self.hardware_acceleration {
            args.extend(["-hwaccel", "cuda"].map(OsString::from));
        }
        args.push("-i".into());
        args.push(input.into());
        if self.hardware_acceleration {
            args.extend(
                ["-c:v", "h264_nvenc", "-preset", "medium", "-tune", "hq", "-cq:v", "23"]
                    .map(OsString::from),
            );
        } else {
            args.extend(
                ["-c:v", "libx264", "-preset", "medium", "-crf", "23"].map(OsString::from),
            );
        }
        args.extend(
            [
                "-c:a", "aac", "-b:a", "128k", "-y", "-nostats", "-progress", "pipe:1",
            ]
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }

    /// Media duration in seconds, 0.0 if ffprobe cannot tell
    async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .output()
            .await
            .map_err(|e| spawn_error("ffprobe", e))?;

        let duration = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .unwrap_or(0.0);
        if !output.status.success() || duration <= 0.0 {
            tracing::warn!(
                path = %input.display(),
                "Could not determine media duration, conversion progress will not be reported"
            );
            return Ok(0.0);
        }
        Ok(duration)
    }
}

fn spawn_error(tool: &str, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        PostProcessError::ToolMissing {
            tool: tool.to_string(),
        }
        .into()
    } else {
        Error::ExternalTool(format!("failed to execute {tool}: {err}"))
    }
}

fn has_target_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(TARGET_EXTENSION))
}

async fn remove_partial(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %output.display(), error = %e, "Failed to remove partial output");
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

#[async_trait]
impl PostProcessor for FfmpegConverter {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn stage(&self) -> TaskStatus {
        TaskStatus::Converting
    }

    async fn process(
        &self,
        input: &Path,
        progress: PostProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<PostProcessOutcome> {
        if !input.is_file() {
            return Err(PostProcessError::ConversionFailed {
                path: input.to_path_buf(),
                reason: "file not found".into(),
            }
            .into());
        }

        if has_target_extension(input) {
            tracing::debug!(path = %input.display(), "Already MP4, skipping re-encode");
            return Ok(PostProcessOutcome::Converted {
                output: input.to_path_buf(),
                message: "Already MP4, no re-conversion needed.".into(),
            });
        }

        let output = input.with_extension(TARGET_EXTENSION);
        if output.exists() {
            return Ok(PostProcessOutcome::Skipped {
                message: format!("Output file already exists: {}", output.display()),
                output,
            });
        }

        let duration = self.probe_duration(input).await?;
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            duration_secs = duration,
            hardware_acceleration = self.hardware_acceleration,
            "Starting conversion"
        );

        let mut child = Command::new(&self.ffmpeg)
            .args(self.encode_args(input, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error("ffmpeg", e))?;

        // Drained concurrently so a chatty encoder cannot fill the pipe and stall
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let stdout = child.stdout.take();
        let run = async {
            if let Some(stdout) = stdout {
                let mut tracker = ConversionProgress::new(duration);
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(pct) =
                        parse_progress_seconds(&line).and_then(|s| tracker.observe(s))
                    {
                        progress(pct);
                    }
                }
            }
            child.wait().await
        };
        let finished = tokio::select! {
            status = run => Some(status),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = finished else {
            tracing::info!(input = %input.display(), "Conversion cancelled, stopping ffmpeg");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill ffmpeg");
            }
            if let Some(task) = stderr_task {
                task.abort();
            }
            remove_partial(&output).await;
            return Err(PostProcessError::Cancelled.into());
        };

        let status = status?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if !status.success() {
            remove_partial(&output).await;
            return Err(PostProcessError::ConversionFailed {
                path: input.to_path_buf(),
                reason: format!("ffmpeg exited with {status}: {}", stderr_tail(&stderr)),
            }
            .into());
        }

        progress(100.0);

        if self.delete_original {
            match tokio::fs::remove_file(input).await {
                Ok(()) => tracing::debug!(path = %input.display(), "Deleted original file"),
                Err(e) => {
                    tracing::warn!(path = %input.display(), error = %e, "Failed to delete original file")
                }
            }
        }

        Ok(PostProcessOutcome::Converted {
            output,
            message: "Converted!".into(),
        })
    }
}
