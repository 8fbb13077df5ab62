// Domain errors - Error types for the processing core

use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain-specific error types
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Source media missing or unreadable
    SourceUnavailable(String),
    /// Region or time range violates an invariant
    InvalidParameters(String),
    /// External transcoder reported failure (diagnostic text attached)
    TranscodeFailed(String),
    /// Cache directory or output path could not be read or written
    Io(String),
    /// Operation stopped on request
    Cancelled,
    /// A commit is already in flight for this session
    SessionBusy(String),
    /// Session has not finished loading its source
    NotReady(String),
    /// No session registered under the given handle
    UnknownSession(String),
}

/// Coarse error classification reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    InvalidParameters,
    TranscodeFailed,
    Io,
    Cancelled,
    SessionBusy,
    NotReady,
    UnknownSession,
}

impl DomainError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            DomainError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            DomainError::TranscodeFailed(_) => ErrorKind::TranscodeFailed,
            DomainError::Io(_) => ErrorKind::Io,
            DomainError::Cancelled => ErrorKind::Cancelled,
            DomainError::SessionBusy(_) => ErrorKind::SessionBusy,
            DomainError::NotReady(_) => ErrorKind::NotReady,
            DomainError::UnknownSession(_) => ErrorKind::UnknownSession,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(context: impl fmt::Display, err: std::io::Error) -> Self {
        DomainError::Io(format!("{}: {}", context, err))
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainError::SourceUnavailable(msg) => write!(f, "Source unavailable: {}", msg),
            DomainError::InvalidParameters(msg) => write!(f, "Invalid parameters: {}", msg),
            DomainError::TranscodeFailed(msg) => write!(f, "Transcode failed: {}", msg),
            DomainError::Io(msg) => write!(f, "I/O error: {}", msg),
            DomainError::Cancelled => write!(f, "Operation cancelled"),
            DomainError::SessionBusy(msg) => write!(f, "Session busy: {}", msg),
            DomainError::NotReady(msg) => write!(f, "Session not ready: {}", msg),
            DomainError::UnknownSession(msg) => write!(f, "Unknown session: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}
