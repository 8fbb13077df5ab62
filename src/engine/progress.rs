//! Progress tracking for UI integration

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Coarse status of the active operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Idle,
    Processing,
    Success,
    Error,
}

/// Observed progress: a value in `[0, 1]` plus status
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub value: f64,
    pub status: ProgressStatus,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            value: 0.0,
            status: ProgressStatus::Idle,
        }
    }
}

/// Progress value reported when processing starts
pub const PROGRESS_STARTED: f64 = 0.1;

/// Progress value reported after the primary transcode
pub const PROGRESS_TRANSCODED: f64 = 0.7;

/// Progress tracker with thread-safe updates.
///
/// The value only moves forward while processing; `reset` and `fail` are the
/// only ways back to zero.
#[derive(Clone)]
pub struct ProgressTracker {
    sender: Arc<watch::Sender<ProgressSnapshot>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ProgressSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Begin a new operation
    pub fn start(&self) {
        self.sender.send_replace(ProgressSnapshot {
            value: PROGRESS_STARTED,
            status: ProgressStatus::Processing,
        });
    }

    /// Move forward to `value`; lower values are ignored
    pub fn advance(&self, value: f64) {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        self.sender.send_if_modified(|snapshot| {
            if snapshot.status != ProgressStatus::Processing || value <= snapshot.value {
                return false;
            }
            snapshot.value = value;
            true
        });
    }

    pub fn succeed(&self) {
        self.sender.send_replace(ProgressSnapshot {
            value: 1.0,
            status: ProgressStatus::Success,
        });
    }

    pub fn fail(&self) {
        self.sender.send_replace(ProgressSnapshot {
            value: 0.0,
            status: ProgressStatus::Error,
        });
    }

    pub fn reset(&self) {
        self.sender.send_replace(ProgressSnapshot::default());
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.sender.subscribe()
    }
}
