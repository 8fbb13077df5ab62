//! Transcoder gateway
//!
//! Turns an [`Operation`] into a transcoder command and runs it. The gateway
//! owns three guarantees: a missing source is reported before anything runs,
//! a failed or cancelled run never leaves a partial output behind, and a hung
//! transcoder is stopped after a timeout proportional to the source length.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;

/// How operations are carried out in this environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscoderCapability {
    /// Run the external transcoder
    Native,
    /// No transcoder available: hand back the source after `delay`
    PassThrough { delay: Duration },
}

impl TranscoderCapability {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, TranscoderCapability::PassThrough { .. })
    }
}

/// Video encoding parameters for re-encoding operations
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub threads: usize,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            threads: num_cpus::get(),
        }
    }
}

/// Upper bound on a single transcoder run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    base: Duration,
    per_source_second: f64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 10.0)
    }
}

impl TimeoutPolicy {
    pub fn new(base: Duration, per_source_second: f64) -> Self {
        Self {
            base,
            per_source_second: per_source_second.max(0.0),
        }
    }

    /// Time allowed for one run; saturates instead of overflowing
    pub fn limit_for(&self, source_duration: f64) -> Duration {
        let scaled = if source_duration.is_finite() && source_duration > 0.0 {
            Duration::try_from_secs_f64(source_duration * self.per_source_second).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        self.base.saturating_add(scaled)
    }
}

/// Gateway between processing requests and the transcoder port
pub struct TranscoderGateway {
    transcoder: Arc<dyn TranscoderPort>,
    fs: Arc<dyn FsPort>,
    capability: TranscoderCapability,
    settings: EncodeSettings,
    timeouts: TimeoutPolicy,
}

impl TranscoderGateway {
    pub fn new(
        transcoder: Arc<dyn TranscoderPort>,
        fs: Arc<dyn FsPort>,
        capability: TranscoderCapability,
        settings: EncodeSettings,
        timeouts: TimeoutPolicy,
    ) -> Self {
        Self {
            transcoder,
            fs,
            capability,
            settings,
            timeouts,
        }
    }

    pub fn capability(&self) -> TranscoderCapability {
        self.capability
    }

    fn encode_args(&self, crf: u8) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.settings.video_codec.clone(),
            "-preset".to_string(),
            self.settings.preset.clone(),
            "-crf".to_string(),
            crf.to_string(),
            "-threads".to_string(),
            self.settings.threads.to_string(),
        ]
    }

    /// Build the transcoder command for `operation`
    pub fn build_command(&self, source: &Path, operation: &Operation, output: &Path) -> TranscodeCommand {
        let src = source.to_string_lossy().into_owned();
        let mut args: Vec<String> = vec!["-y".to_string()];

        match operation {
            Operation::Crop(region) => {
                args.extend(["-i".to_string(), src]);
                args.extend([
                    "-vf".to_string(),
                    format!("crop={}:{}:{}:{}", region.width, region.height, region.x, region.y),
                ]);
                args.extend(self.encode_args(self.settings.crf));
                args.extend(["-c:a".to_string(), "copy".to_string()]);
            }
            Operation::Trim(range) => {
                args.extend([
                    "-ss".to_string(),
                    TimeSpec::from_seconds(range.start).format_hms(),
                    "-i".to_string(),
                    src,
                    "-t".to_string(),
                    format!("{:.3}", range.duration()),
                ]);
                args.extend(self.encode_args(self.settings.crf));
                args.extend(["-c:a".to_string(), "copy".to_string()]);
            }
            Operation::ExtractThumbnail { at_seconds } => {
                args.extend([
                    "-ss".to_string(),
                    TimeSpec::from_seconds(*at_seconds).format_hms(),
                    "-i".to_string(),
                    src,
                    "-frames:v".to_string(),
                    "1".to_string(),
                    "-q:v".to_string(),
                    "2".to_string(),
                ]);
            }
            Operation::Compress { quality } => {
                args.extend(["-i".to_string(), src]);
                args.extend(self.encode_args(quality.crf()));
                args.extend([
                    "-c:a".to_string(),
                    "aac".to_string(),
                    "-b:a".to_string(),
                    "128k".to_string(),
                ]);
            }
        }

        args.push(output.to_string_lossy().into_owned());
        TranscodeCommand {
            args,
            output: output.to_path_buf(),
        }
    }

    /// Run `operation` against `source`, writing to `output`.
    ///
    /// Returns the path of the produced file. Under pass-through that is the
    /// source itself. On failure or cancellation `output` does not exist.
    pub async fn execute(
        &self,
        source: &Path,
        operation: &Operation,
        output: &Path,
        source_duration: f64,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        if !self.fs.exists(source).await? {
            return Err(DomainError::SourceUnavailable(format!(
                "{} does not exist",
                source.display()
            )));
        }

        match self.capability {
            TranscoderCapability::PassThrough { delay } => {
                info!(
                    "Transcoder unavailable, passing {} through for {}",
                    source.display(),
                    operation.tag()
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(source.to_path_buf()),
                    _ = cancel.cancelled() => Err(DomainError::Cancelled),
                }
            }
            TranscoderCapability::Native => {
                self.run_native(source, operation, output, source_duration, cancel)
                    .await
            }
        }
    }

    async fn run_native(
        &self,
        source: &Path,
        operation: &Operation,
        output: &Path,
        source_duration: f64,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DomainError> {
        if let Some(parent) = output.parent() {
            self.fs.make_directory(parent).await?;
        }
        let command = self.build_command(source, operation, output);
        let limit = self.timeouts.limit_for(source_duration);
        debug!("{} with limit {:?}: {}", operation.tag(), limit, command);

        let run_token = cancel.child_token();
        let run = self.transcoder.run(&command, &run_token);
        tokio::pin!(run);

        let finished = tokio::select! {
            result = &mut run => Some(result),
            _ = tokio::time::sleep(limit) => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                run_token.cancel();
                let _ = run.await;
                Err(DomainError::TranscodeFailed(format!(
                    "{} timed out after {:?}",
                    operation.tag(),
                    limit
                )))
            }
        };

        if let Err(e) = result {
            self.discard_partial(output).await;
            return Err(e);
        }
        if !self.fs.exists(output).await? {
            return Err(DomainError::TranscodeFailed(format!(
                "transcoder reported success but {} was not written",
                output.display()
            )));
        }
        info!("{} of {} finished: {}", operation.tag(), source.display(), output.display());
        Ok(output.to_path_buf())
    }

    async fn discard_partial(&self, output: &Path) {
        if let Err(e) = self.fs.delete(output).await {
            warn!("Failed to delete partial output {}: {}", output.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::LocalFsAdapter;
    use async_trait::async_trait;
    use tempfile::TempDir;

    enum Behavior {
        Succeed,
        FailAfterPartialWrite,
        HangUntilCancelled,
    }

    struct ScriptedTranscoder {
        behavior: Behavior,
    }

    #[async_trait]
    impl TranscoderPort for ScriptedTranscoder {
        async fn run(
            &self,
            command: &TranscodeCommand,
            cancel: &CancellationToken,
        ) -> Result<(), DomainError> {
            match self.behavior {
                Behavior::Succeed => {
                    std::fs::write(&command.output, b"video").unwrap();
                    Ok(())
                }
                Behavior::FailAfterPartialWrite => {
                    std::fs::write(&command.output, b"partial").unwrap();
                    Err(DomainError::TranscodeFailed("exit status 1".to_string()))
                }
                Behavior::HangUntilCancelled => {
                    std::fs::write(&command.output, b"partial").unwrap();
                    cancel.cancelled().await;
                    Err(DomainError::Cancelled)
                }
            }
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn gateway(behavior: Behavior, capability: TranscoderCapability) -> TranscoderGateway {
        TranscoderGateway::new(
            Arc::new(ScriptedTranscoder { behavior }),
            Arc::new(LocalFsAdapter::new()),
            capability,
            EncodeSettings {
                threads: 2,
                ..EncodeSettings::default()
            },
            TimeoutPolicy::new(Duration::from_millis(200), 0.0),
        )
    }

    fn source_in(dir: &TempDir) -> PathBuf {
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"source").unwrap();
        source
    }

    #[test]
    fn test_crop_command() {
        let gw = gateway(Behavior::Succeed, TranscoderCapability::Native);
        let cmd = gw.build_command(
            Path::new("/in/clip.mp4"),
            &Operation::Crop(CropRegion::new(100, 50, 300, 300)),
            Path::new("/out/cropped.mp4"),
        );
        assert_eq!(
            cmd.args.join(" "),
            "-y -i /in/clip.mp4 -vf crop=300:300:100:50 -c:v libx264 -preset medium -crf 23 -threads 2 -c:a copy /out/cropped.mp4"
        );
        assert_eq!(cmd.output, PathBuf::from("/out/cropped.mp4"));
    }

    #[test]
    fn test_trim_command_formats_times() {
        let gw = gateway(Behavior::Succeed, TranscoderCapability::Native);
        let cmd = gw.build_command(
            Path::new("/in/clip.mp4"),
            &Operation::Trim(TimeRange::new(65.5, 72.25).unwrap()),
            Path::new("/out/trimmed.mp4"),
        );
        let line = cmd.args.join(" ");
        assert!(line.starts_with("-y -ss 00:01:05.500 -i /in/clip.mp4 -t 6.750 "));
        assert!(line.ends_with("-c:a copy /out/trimmed.mp4"));
    }

    #[test]
    fn test_thumbnail_and_compress_commands() {
        let gw = gateway(Behavior::Succeed, TranscoderCapability::Native);
        let thumb = gw.build_command(
            Path::new("/in/clip.mp4"),
            &Operation::ExtractThumbnail { at_seconds: 0.0 },
            Path::new("/out/thumb.jpg"),
        );
        assert_eq!(
            thumb.args.join(" "),
            "-y -ss 00:00:00.000 -i /in/clip.mp4 -frames:v 1 -q:v 2 /out/thumb.jpg"
        );

        let compress = gw.build_command(
            Path::new("/in/clip.mp4"),
            &Operation::Compress { quality: CompressQuality::High },
            Path::new("/out/small.mp4"),
        );
        let line = compress.args.join(" ");
        assert!(line.contains("-crf 18"));
        assert!(line.contains("-c:a aac -b:a 128k"));
    }

    #[test]
    fn test_timeout_scales_with_duration() {
        let policy = TimeoutPolicy::new(Duration::from_secs(30), 10.0);
        assert_eq!(policy.limit_for(12.0), Duration::from_secs(150));
        assert_eq!(policy.limit_for(f64::NAN), Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_saturates_for_huge_rates() {
        let policy = TimeoutPolicy::new(Duration::from_secs(30), 1e300);
        assert_eq!(policy.limit_for(12.4), Duration::MAX);

        let policy = TimeoutPolicy::new(Duration::MAX, 10.0);
        assert_eq!(policy.limit_for(12.4), Duration::MAX);

        let policy = TimeoutPolicy::new(Duration::from_secs(30), f64::INFINITY);
        assert_eq!(policy.limit_for(1.0), Duration::MAX);
    }

    #[tokio::test]
    async fn test_native_success_returns_output() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let output = dir.path().join("out").join("cropped.mp4");
        let gw = gateway(Behavior::Succeed, TranscoderCapability::Native);

        let produced = gw
            .execute(
                &source,
                &Operation::Crop(CropRegion::new(0, 0, 100, 100)),
                &output,
                10.0,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(produced, output);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_failure_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let output = dir.path().join("cropped.mp4");
        let gw = gateway(Behavior::FailAfterPartialWrite, TranscoderCapability::Native);

        let err = gw
            .execute(
                &source,
                &Operation::Crop(CropRegion::new(0, 0, 100, 100)),
                &output,
                10.0,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranscodeFailed);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_hung_transcoder_times_out() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let output = dir.path().join("cropped.mp4");
        let gw = gateway(Behavior::HangUntilCancelled, TranscoderCapability::Native);

        let err = gw
            .execute(
                &source,
                &Operation::Crop(CropRegion::new(0, 0, 100, 100)),
                &output,
                10.0,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranscodeFailed);
        assert!(err.to_string().contains("timed out"));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_cancellation_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let output = dir.path().join("cropped.mp4");
        let gw = TranscoderGateway::new(
            Arc::new(ScriptedTranscoder {
                behavior: Behavior::HangUntilCancelled,
            }),
            Arc::new(LocalFsAdapter::new()),
            TranscoderCapability::Native,
            EncodeSettings::default(),
            TimeoutPolicy::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = gw
            .execute(
                &source,
                &Operation::Crop(CropRegion::new(0, 0, 100, 100)),
                &output,
                10.0,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_reported() {
        let dir = TempDir::new().unwrap();
        let gw = gateway(Behavior::Succeed, TranscoderCapability::Native);
        let err = gw
            .execute(
                &dir.path().join("gone.mp4"),
                &Operation::Compress { quality: CompressQuality::Medium },
                &dir.path().join("out.mp4"),
                10.0,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    }

    #[tokio::test]
    async fn test_passthrough_returns_source() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let output = dir.path().join("cropped.mp4");
        let gw = gateway(
            Behavior::FailAfterPartialWrite,
            TranscoderCapability::PassThrough {
                delay: Duration::from_millis(10),
            },
        );

        let produced = gw
            .execute(
                &source,
                &Operation::Crop(CropRegion::new(0, 0, 100, 100)),
                &output,
                10.0,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(produced, source);
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_passthrough_honors_cancellation() {
        let dir = TempDir::new().unwrap();
        let source = source_in(&dir);
        let gw = gateway(
            Behavior::Succeed,
            TranscoderCapability::PassThrough {
                delay: Duration::from_secs(60),
            },
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = gw
            .execute(
                &source,
                &Operation::Crop(CropRegion::new(0, 0, 100, 100)),
                &dir.path().join("out.mp4"),
                10.0,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
