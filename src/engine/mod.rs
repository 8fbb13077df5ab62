//! Processing engine: transcoder gateway, progress, debouncing, pipeline, sessions

pub mod debounce;
pub mod gateway;
pub mod pipeline;
pub mod progress;
pub mod session;

pub use gateway::{EncodeSettings, TimeoutPolicy, TranscoderCapability, TranscoderGateway};
pub use pipeline::{ProcessRequest, ProcessingPipeline};
pub use progress::{ProgressSnapshot, ProgressStatus, ProgressTracker};
pub use session::{CommitOutcome, CropSession, SessionSettings, SessionState};
