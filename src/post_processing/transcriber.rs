//! Subtitle generation through an external whisper-style CLI

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{PostProcessOutcome, PostProcessor, PostProgress, resolve_tool};
use crate::config::ToolsConfig;
use crate::error::{Error, PostProcessError, Result};
use crate::types::TaskStatus;

/// Binary searched for on PATH when no explicit path is configured
const DEFAULT_BINARY: &str = "whisper";

/// Runs `<binary> <file> --output_format srt --output_dir <dir>`.
///
/// The subtitle file lands next to the video as `<stem>.srt`; the video itself
/// stays the task's output.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    binary: PathBuf,
    extra_args: Vec<String>,
}

impl CommandTranscriber {
    /// Create a transcriber for an explicit binary
    pub fn new(binary: PathBuf) -> Self {
        Self {
            binary,
            extra_args: Vec::new(),
        }
    }

    /// Resolve the transcriber from configuration or PATH
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        resolve_tool(
            tools.transcriber_path.as_ref(),
            DEFAULT_BINARY,
            tools.search_path,
        )
        .map(Self::new)
    }

    /// Append arguments such as `--model small`
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Where the subtitle file for `input` is written
    pub fn transcript_path(input: &Path) -> PathBuf {
        input.with_extension("srt")
    }
}

#[async_trait]
impl PostProcessor for CommandTranscriber {
    fn name(&self) -> &'static str {
        "transcriber"
    }

    fn stage(&self) -> TaskStatus {
        TaskStatus::Transcribing
    }

    async fn process(
        &self,
        input: &Path,
        progress: PostProgress<'_>,
        cancel: &CancellationToken,
    ) -> Result<PostProcessOutcome> {
        if !input.is_file() {
            return Err(PostProcessError::TranscriptionFailed {
                path: input.to_path_buf(),
                reason: "video file not found".into(),
            }
            .into());
        }

        let output_dir = input.parent().unwrap_or_else(|| Path::new("."));
        tracing::info!(input = %input.display(), binary = %self.binary.display(), "Starting transcription");

        let mut command = Command::new(&self.binary);
        command
            .arg(input)
            .args(["--output_format", "srt", "--output_dir"])
            .arg(output_dir)
            .args(&self.extra_args)
            .kill_on_drop(true);
        // Dropping the pending output kills the child
        let output = tokio::select! {
            output = command.output() => output,
            _ = cancel.cancelled() => {
                tracing::info!(input = %input.display(), "Transcription cancelled, stopping transcriber");
                return Err(PostProcessError::Cancelled.into());
            }
        };
        let output = output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::from(PostProcessError::ToolMissing {
                    tool: self.binary.display().to_string(),
                })
            } else {
                Error::ExternalTool(format!("failed to execute transcriber: {e}"))
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PostProcessError::TranscriptionFailed {
                path: input.to_path_buf(),
                reason: format!("transcriber exited with {}: {}", output.status, stderr.trim()),
            }
            .into());
        }

        progress(100.0);

        let transcript = Self::transcript_path(input);
        if !transcript.exists() {
            tracing::warn!(
                transcript = %transcript.display(),
                "Transcriber succeeded but no subtitle file was found"
            );
        }

        Ok(PostProcessOutcome::Completed {
            output: input.to_path_buf(),
            message: format!(
                "Transcription completed successfully. Subtitles: {}",
                transcript.display()
            ),
        })
    }
}
