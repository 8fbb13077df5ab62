//! DiaryCut video processing library
//!
//! Crop, trim, compress and thumbnail operations for a video diary, driven
//! through an external transcoder and memoized in a size-bounded cache.

pub mod adapters;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use adapters::toml_config::AppConfig;
pub use app::{AppContainer, DefaultAppContainer, SessionHandle, VideoProcessingService};
pub use domain::errors::{DomainError, ErrorKind};
pub use domain::model::{
    CacheKey, CropRegion, EditMode, MediaInfo, Operation, ProcessingFailure, ProcessingResult, TimeRange,
};
pub use engine::{CommitOutcome, ProgressSnapshot, ProgressStatus, SessionState, TranscoderCapability};
pub use error::{DiaryCutError, DiaryCutResult};
