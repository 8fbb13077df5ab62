// Application layer - Service object and dependency wiring

pub mod container;
pub mod service;

pub use container::{AppContainer, DefaultAppContainer, Ports};
pub use service::{SessionHandle, VideoProcessingService};
