//! FFprobe adapter for media file probing
//!
//! Results are memoized per source path for the life of the adapter.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::debug;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// FFprobe-based probe adapter
pub struct FfprobeAdapter {
    program: PathBuf,
    memo: Mutex<HashMap<PathBuf, MediaInfo>>,
}

impl FfprobeAdapter {
    /// Create new FFprobe adapter for the given binary
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Extract media info from ffprobe's JSON output
    pub(crate) fn parse_output(json: &str) -> Result<MediaInfo, DomainError> {
        let parsed: FfprobeOutput = serde_json::from_str(json).map_err(|e| {
            DomainError::SourceUnavailable(format!("unreadable ffprobe output: {}", e))
        })?;

        let stream = parsed.streams.first().ok_or_else(|| {
            DomainError::SourceUnavailable("no video stream found".to_string())
        })?;

        let parse_duration = |value: Option<&String>| value.and_then(|v| v.parse::<f64>().ok());
        let duration = parse_duration(stream.duration.as_ref())
            .or_else(|| parse_duration(parsed.format.as_ref().and_then(|f| f.duration.as_ref())))
            .ok_or_else(|| DomainError::SourceUnavailable("duration not reported".to_string()))?;

        MediaInfo::new(
            stream.width.unwrap_or(0),
            stream.height.unwrap_or(0),
            duration,
        )
    }

    fn remembered(&self, source: &Path) -> Option<MediaInfo> {
        let memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.get(source).copied()
    }

    fn remember(&self, source: &Path, info: MediaInfo) {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        memo.insert(source.to_path_buf(), info);
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn probe(&self, source: &Path) -> Result<MediaInfo, DomainError> {
        if let Some(info) = self.remembered(source) {
            return Ok(info);
        }

        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(DomainError::SourceUnavailable(format!(
                "{} does not exist",
                source.display()
            )));
        }

        let output = Command::new(&self.program)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,duration",
                "-show_entries",
                "format=duration",
                "-of",
                "json",
            ])
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DomainError::SourceUnavailable(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(DomainError::SourceUnavailable(format!(
                "ffprobe failed on {}: {}",
                source.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let info = Self::parse_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "Probed {}: {}x{}, {:.3}s",
            source.display(),
            info.width,
            info.height,
            info.duration_seconds
        );
        self.remember(source, info);
        Ok(info)
    }
}
