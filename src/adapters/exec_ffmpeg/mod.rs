//! FFmpeg execution adapter
//!
//! Runs ffmpeg as a child process. Cancellation kills the child and waits
//! for it to exit so the caller can safely remove the partial output.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::errors::*;
use crate::ports::*;

/// Lines of ffmpeg stderr kept as diagnostic text
const DIAGNOSTIC_TAIL_LINES: usize = 12;

/// FFmpeg-based transcoder adapter
#[derive(Debug, Clone)]
pub struct FfmpegAdapter {
    program: PathBuf,
}

impl FfmpegAdapter {
    /// Create new FFmpeg adapter for the given binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn diagnostic_tail(stderr: &[u8]) -> String {
        let text = String::from_utf8_lossy(stderr);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES);
        lines[start..].join("\n")
    }
}

#[async_trait]
impl TranscoderPort for FfmpegAdapter {
    async fn run(
        &self,
        command: &TranscodeCommand,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError> {
        debug!("Running {} {}", self.program.display(), command);

        let mut child = Command::new(&self.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DomainError::TranscodeFailed(format!(
                    "failed to start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stderr = child.stderr.take();
        let stderr_reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| {
                    DomainError::TranscodeFailed(format!("failed to wait for ffmpeg: {}", e))
                })?;
                let stderr = stderr_reader.await.unwrap_or_default();
                if status.success() {
                    Ok(())
                } else {
                    Err(DomainError::TranscodeFailed(format!(
                        "ffmpeg exited with {}: {}",
                        status,
                        Self::diagnostic_tail(&stderr)
                    )))
                }
            }
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill ffmpeg after cancellation: {}", e);
                }
                stderr_reader.abort();
                Err(DomainError::Cancelled)
            }
        }
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}
