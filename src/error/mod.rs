//! Error handling module for application wiring (config, startup, CLI)

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for DiaryCut setup and front-end operations
#[derive(Error, Debug)]
pub enum DiaryCutError {
    /// Configuration value out of range or unreadable
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// TOML parse error
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Error raised by the processing core
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Result type alias for DiaryCut operations
pub type DiaryCutResult<T> = std::result::Result<T, DiaryCutError>;
