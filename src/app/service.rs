//! Video processing service
//!
//! The one object front ends talk to. It owns the open sessions, keyed by
//! handle, and the shared pipeline (cache store plus transcoder gateway).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::engine::pipeline::{ProcessRequest, ProcessingPipeline};
use crate::engine::progress::{ProgressSnapshot, ProgressTracker};
use crate::engine::session::{CommitOutcome, CropSession, SessionSettings, SessionState};
use crate::ports::ProbePort;

/// Opaque reference to an open session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(Uuid);

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct VideoProcessingService {
    probe: Arc<dyn ProbePort>,
    pipeline: Arc<ProcessingPipeline>,
    settings: SessionSettings,
    sessions: RwLock<HashMap<SessionHandle, Arc<CropSession>>>,
}

impl VideoProcessingService {
    pub fn new(probe: Arc<dyn ProbePort>, pipeline: Arc<ProcessingPipeline>, settings: SessionSettings) -> Self {
        Self {
            probe,
            pipeline,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn session(&self, handle: SessionHandle) -> Result<Arc<CropSession>, DomainError> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .get(&handle)
            .cloned()
            .ok_or_else(|| DomainError::UnknownSession(handle.to_string()))
    }

    /// Open an edit session; returns once the source has been probed
    pub async fn open_session(&self, source: impl Into<PathBuf>, mode: EditMode) -> Result<SessionHandle, DomainError> {
        let session = Arc::new(CropSession::new(
            source,
            mode,
            self.settings,
            Arc::clone(&self.pipeline),
        ));
        session.load(self.probe.as_ref()).await?;

        let handle = SessionHandle(Uuid::new_v4());
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle, session);
        info!("Opened session {}", handle);
        Ok(handle)
    }

    pub fn update_region(&self, handle: SessionHandle, region: CropRegion) -> Result<CropRegion, DomainError> {
        self.session(handle)?.update_region(region)
    }

    pub fn update_region_from_display(
        &self,
        handle: SessionHandle,
        display: DisplayRegion,
        surface: DisplaySize,
    ) -> Result<CropRegion, DomainError> {
        self.session(handle)?.update_region_from_display(display, surface)
    }

    pub fn update_time_range(&self, handle: SessionHandle, start: f64, end: f64) -> Result<TimeRange, DomainError> {
        self.session(handle)?.update_time_range(start, end)
    }

    pub async fn commit(&self, handle: SessionHandle) -> Result<CommitOutcome, DomainError> {
        let session = self.session(handle)?;
        session.commit().await
    }

    /// Cancel the in-flight commit, if any
    pub fn cancel(&self, handle: SessionHandle) -> Result<bool, DomainError> {
        Ok(self.session(handle)?.cancel())
    }

    /// Cancel outstanding work and forget the session
    pub async fn close_session(&self, handle: SessionHandle) -> Result<(), DomainError> {
        let session = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&handle)
            .ok_or_else(|| DomainError::UnknownSession(handle.to_string()))?;
        session.close().await;
        info!("Closed session {}", handle);
        Ok(())
    }

    pub fn progress(&self, handle: SessionHandle) -> Result<ProgressSnapshot, DomainError> {
        Ok(self.session(handle)?.progress())
    }

    pub fn subscribe_progress(&self, handle: SessionHandle) -> Result<watch::Receiver<ProgressSnapshot>, DomainError> {
        Ok(self.session(handle)?.subscribe_progress())
    }

    pub fn state(&self, handle: SessionHandle) -> Result<SessionState, DomainError> {
        Ok(self.session(handle)?.state())
    }

    pub fn subscribe_state(&self, handle: SessionHandle) -> Result<watch::Receiver<SessionState>, DomainError> {
        Ok(self.session(handle)?.subscribe_state())
    }

    pub fn region(&self, handle: SessionHandle) -> Result<Option<CropRegion>, DomainError> {
        Ok(self.session(handle)?.region())
    }

    pub fn time_range(&self, handle: SessionHandle) -> Result<Option<TimeRange>, DomainError> {
        Ok(self.session(handle)?.time_range())
    }

    pub fn last_failure(&self, handle: SessionHandle) -> Result<Option<ProcessingFailure>, DomainError> {
        Ok(self.session(handle)?.last_failure())
    }

    pub fn last_result(&self, handle: SessionHandle) -> Result<Option<ProcessingResult>, DomainError> {
        Ok(self.session(handle)?.last_result())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub async fn probe(&self, source: &Path) -> Result<MediaInfo, DomainError> {
        self.probe.probe(source).await
    }

    /// Run a single operation through the cache without opening a session
    pub async fn transcode(&self, source: &Path, operation: Operation) -> Result<ProcessingResult, DomainError> {
        self.transcode_with_cancel(source, operation, &CancellationToken::new())
            .await
    }

    pub async fn transcode_with_cancel(
        &self,
        source: &Path,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, DomainError> {
        let media = self.probe.probe(source).await?;
        self.validate_operation(&operation, &media)?;

        let request = ProcessRequest {
            source: source.to_path_buf(),
            operation,
            source_duration: media.duration_seconds,
        };
        let progress = ProgressTracker::new();
        progress.start();
        self.pipeline.process(&request, &progress, cancel).await
    }

    fn validate_operation(&self, operation: &Operation, media: &MediaInfo) -> Result<(), DomainError> {
        match operation {
            Operation::Crop(region) => self.settings.region_rules.validate(region, media),
            Operation::Trim(range) => self
                .settings
                .segment_rules
                .validate(range, media.duration_seconds),
            Operation::ExtractThumbnail { at_seconds } => {
                if at_seconds.is_finite() && *at_seconds >= 0.0 && *at_seconds <= media.duration_seconds {
                    Ok(())
                } else {
                    Err(DomainError::InvalidParameters(format!(
                        "Thumbnail time {} is outside 0..{:.3}s",
                        at_seconds, media.duration_seconds
                    )))
                }
            }
            Operation::Compress { .. } => Ok(()),
        }
    }

    /// Delete every cached file
    pub async fn clear_cache(&self) -> Result<usize, DomainError> {
        self.pipeline.cache().clear().await
    }

    pub async fn cache_size_bytes(&self) -> u64 {
        self.pipeline.cache().total_size_bytes().await
    }
}
