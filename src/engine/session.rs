//! Crop session state machine
//!
//! One session per open edit screen. Parameter updates are clamped, recorded
//! in order and debounced; `commit` waits for the last update to settle and
//! then runs the cached pipeline on a background task, so dropping the caller
//! never leaves the session stuck in `Processing`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::{RegionRules, SegmentRules};
use crate::engine::debounce::Debouncer;
use crate::engine::pipeline::{ProcessRequest, ProcessingPipeline};
use crate::engine::progress::{ProgressSnapshot, ProgressTracker};
use crate::ports::ProbePort;

/// Lifecycle of a crop session.
///
/// `Completed`, `Failed` and `Cancelled` behave like `Ready`: the parameters
/// are kept, a new commit is accepted and any edit moves back to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    DimensionsLoading,
    Ready,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// How a commit ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Completed(ProcessingResult),
    Cancelled,
}

/// Tunables shared by every session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub debounce: Duration,
    pub region_rules: RegionRules,
    pub segment_rules: SegmentRules,
    pub default_region_fraction: f64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            region_rules: RegionRules::default(),
            segment_rules: SegmentRules::default(),
            default_region_fraction: 0.8,
        }
    }
}

struct EditParams {
    media: MediaInfo,
    region: Debouncer<CropRegion>,
    range: Debouncer<TimeRange>,
}

#[derive(Default)]
struct SessionInner {
    params: Option<EditParams>,
    in_flight: Option<CancellationToken>,
    last_result: Option<ProcessingResult>,
    last_failure: Option<ProcessingFailure>,
    closed: bool,
}

pub struct CropSession {
    source: PathBuf,
    mode: EditMode,
    settings: SessionSettings,
    pipeline: Arc<ProcessingPipeline>,
    progress: ProgressTracker,
    state: watch::Sender<SessionState>,
    inner: Mutex<SessionInner>,
}

impl CropSession {
    pub fn new(
        source: impl Into<PathBuf>,
        mode: EditMode,
        settings: SessionSettings,
        pipeline: Arc<ProcessingPipeline>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            source: source.into(),
            mode,
            settings,
            pipeline,
            progress: ProgressTracker::new(),
            state,
            inner: Mutex::new(SessionInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Probe the source and seed default parameters.
    ///
    /// On failure the session falls back to `Idle`.
    pub async fn load(&self, probe: &dyn ProbePort) -> Result<MediaInfo, DomainError> {
        self.state.send_replace(SessionState::DimensionsLoading);
        let media = match probe.probe(&self.source).await {
            Ok(media) => media,
            Err(e) => {
                self.state.send_replace(SessionState::Idle);
                return Err(e);
            }
        };

        let region = self
            .settings
            .region_rules
            .default_region(&media, self.settings.default_region_fraction);
        let range = self.settings.segment_rules.default_range(&media);
        self.lock().params = Some(EditParams {
            media,
            region: Debouncer::new(region, self.settings.debounce),
            range: Debouncer::new(range, self.settings.debounce),
        });
        self.state.send_replace(SessionState::Ready);
        info!(
            "Session ready for {} ({}x{}, {:.3}s)",
            self.source.display(),
            media.width,
            media.height,
            media.duration_seconds
        );
        Ok(media)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    pub fn media(&self) -> Option<MediaInfo> {
        self.lock().params.as_ref().map(|p| p.media)
    }

    /// Most recent region, settled or not
    pub fn region(&self) -> Option<CropRegion> {
        self.lock().params.as_ref().map(|p| *p.region.latest())
    }

    /// Most recent time range, settled or not
    pub fn time_range(&self) -> Option<TimeRange> {
        self.lock().params.as_ref().map(|p| *p.range.latest())
    }

    pub fn last_result(&self) -> Option<ProcessingResult> {
        self.lock().last_result.clone()
    }

    pub fn last_failure(&self) -> Option<ProcessingFailure> {
        self.lock().last_failure.clone()
    }

    fn with_params<T>(
        &self,
        f: impl FnOnce(&mut EditParams) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let value = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(DomainError::NotReady("session is closed".to_string()));
            }
            let params = inner.params.as_mut().ok_or_else(|| {
                DomainError::NotReady(format!("{} is still loading", self.source.display()))
            })?;
            f(params)?
        };
        // An edit after a finished commit makes the session ready again
        self.state.send_if_modified(|state| match state {
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled => {
                *state = SessionState::Ready;
                true
            }
            _ => false,
        });
        Ok(value)
    }

    /// Record a region in source pixels, clamped into the frame
    pub fn update_region(&self, requested: CropRegion) -> Result<CropRegion, DomainError> {
        let rules = self.settings.region_rules;
        self.with_params(|params| {
            let region = rules.clamp(requested, &params.media)?;
            params.region.push(region, Instant::now());
            Ok(region)
        })
    }

    /// Record a region given in display coordinates
    pub fn update_region_from_display(
        &self,
        display: DisplayRegion,
        surface: DisplaySize,
    ) -> Result<CropRegion, DomainError> {
        let rules = self.settings.region_rules;
        self.with_params(|params| {
            let region = rules.from_display(display, surface, &params.media)?;
            params.region.push(region, Instant::now());
            Ok(region)
        })
    }

    /// Record a slider update; the untouched endpoint moves to keep the minimum length
    pub fn update_time_range(&self, start: f64, end: f64) -> Result<TimeRange, DomainError> {
        let rules = self.settings.segment_rules;
        self.with_params(|params| {
            let current = *params.range.latest();
            let range = rules.adjust(&current, start, end, params.media.duration_seconds)?;
            params.range.push(range, Instant::now());
            Ok(range)
        })
    }

    /// Produce the output for the settled parameters.
    ///
    /// Rejected with `SessionBusy` while another commit is in flight.
    /// Cancellation is reported as `CommitOutcome::Cancelled`, not as an error.
    pub async fn commit(self: &Arc<Self>) -> Result<CommitOutcome, DomainError> {
        let cancel = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(DomainError::NotReady("session is closed".to_string()));
            }
            let mut rejection = None;
            self.state.send_if_modified(|state| match state {
                SessionState::Processing => {
                    rejection = Some(DomainError::SessionBusy(format!(
                        "a commit for {} is already in flight",
                        self.source.display()
                    )));
                    false
                }
                SessionState::Idle | SessionState::DimensionsLoading => {
                    rejection = Some(DomainError::NotReady(format!(
                        "{} is still loading",
                        self.source.display()
                    )));
                    false
                }
                _ => {
                    *state = SessionState::Processing;
                    true
                }
            });
            if let Some(err) = rejection {
                return Err(err);
            }
            let token = CancellationToken::new();
            inner.in_flight = Some(token.clone());
            token
        };

        let task = tokio::spawn(Arc::clone(self).run_commit(cancel));
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.lock().in_flight = None;
                self.progress.fail();
                self.state.send_replace(SessionState::Failed);
                Err(DomainError::TranscodeFailed(format!("commit task aborted: {}", e)))
            }
        }
    }

    async fn run_commit(self: Arc<Self>, cancel: CancellationToken) -> Result<CommitOutcome, DomainError> {
        self.progress.start();
        let outcome = match self.settled_request(&cancel).await {
            Ok(request) => self.pipeline.process(&request, &self.progress, &cancel).await,
            Err(e) => Err(e),
        };

        let mut inner = self.lock();
        inner.in_flight = None;
        match outcome {
            Ok(result) => {
                inner.last_result = Some(result.clone());
                inner.last_failure = None;
                self.progress.succeed();
                self.state.send_replace(SessionState::Completed);
                info!("Commit completed: {}", result.output_path.display());
                Ok(CommitOutcome::Completed(result))
            }
            Err(e) if e.is_cancelled() => {
                self.progress.reset();
                self.state.send_replace(SessionState::Cancelled);
                info!("Commit for {} cancelled", self.source.display());
                Ok(CommitOutcome::Cancelled)
            }
            Err(e) => {
                inner.last_failure = Some(ProcessingFailure::from(&e));
                self.progress.fail();
                self.state.send_replace(SessionState::Failed);
                warn!("Commit for {} failed: {}", self.source.display(), e);
                Err(e)
            }
        }
    }

    /// Wait for pending updates to settle, then build the request from them
    async fn settled_request(&self, cancel: &CancellationToken) -> Result<ProcessRequest, DomainError> {
        loop {
            let deadline = {
                let mut inner = self.lock();
                let params = inner
                    .params
                    .as_mut()
                    .ok_or_else(|| DomainError::NotReady("no source loaded".to_string()))?;
                let now = Instant::now();
                params.region.poll(now);
                params.range.poll(now);
                let pending = match self.mode {
                    EditMode::Region => params.region.next_deadline(),
                    EditMode::TimeRange => params.range.next_deadline(),
                };
                match pending {
                    Some(deadline) => deadline,
                    None => return self.build_request(params),
                }
            };
            debug!("Waiting for parameters to settle");
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = cancel.cancelled() => return Err(DomainError::Cancelled),
            }
        }
    }

    fn build_request(&self, params: &EditParams) -> Result<ProcessRequest, DomainError> {
        let operation = match self.mode {
            EditMode::Region => {
                let region = *params.region.settled();
                self.settings.region_rules.validate(&region, &params.media)?;
                Operation::Crop(region)
            }
            EditMode::TimeRange => {
                let range = *params.range.settled();
                self.settings
                    .segment_rules
                    .validate(&range, params.media.duration_seconds)?;
                Operation::Trim(range)
            }
        };
        Ok(ProcessRequest {
            source: self.source.clone(),
            operation,
            source_duration: params.media.duration_seconds,
        })
    }

    /// Ask the in-flight commit to stop; returns whether one was running
    pub fn cancel(&self) -> bool {
        match &self.lock().in_flight {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel any in-flight commit and wait until it has wound down
    pub async fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            if let Some(token) = &inner.in_flight {
                token.cancel();
            }
        }
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s != SessionState::Processing).await;
        debug!("Session for {} closed", self.source.display());
    }
}
