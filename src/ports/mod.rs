// Ports - Interface definitions (contracts) for external collaborators

use crate::domain::errors::*;
use crate::domain::model::*;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Command description handed to the external transcoder
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeCommand {
    /// Arguments, excluding the program name
    pub args: Vec<String>,
    /// File the transcoder is expected to produce
    pub output: PathBuf,
}

impl fmt::Display for TranscodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args.join(" "))
    }
}

/// Port for running transcoder commands
#[async_trait]
pub trait TranscoderPort: Send + Sync {
    /// Run `command` to completion.
    ///
    /// Implementations must stop the process and return
    /// `DomainError::Cancelled` once `cancel` fires.
    async fn run(
        &self,
        command: &TranscodeCommand,
        cancel: &CancellationToken,
    ) -> Result<(), DomainError>;

    /// Whether the transcoder binary can be invoked in this environment
    async fn is_available(&self) -> bool;
}

/// Port for media probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Read width, height and duration of the primary video stream
    async fn probe(&self, source: &Path) -> Result<MediaInfo, DomainError>;
}

/// Port for file system operations
#[async_trait]
pub trait FsPort: Send + Sync {
    /// Check if a path exists
    async fn exists(&self, path: &Path) -> Result<bool, DomainError>;

    /// Copy file
    async fn copy(&self, from: &Path, to: &Path) -> Result<(), DomainError>;

    /// Delete file
    async fn delete(&self, path: &Path) -> Result<(), DomainError>;

    /// List the files directly inside a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, DomainError>;

    /// Get file size
    async fn size_of(&self, path: &Path) -> Result<u64, DomainError>;

    /// Create directory (including parent directories)
    async fn make_directory(&self, path: &Path) -> Result<(), DomainError>;

    /// Read a whole file as UTF-8
    async fn read_to_string(&self, path: &Path) -> Result<String, DomainError>;

    /// Replace a file's contents so readers never see a partial write
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), DomainError>;
}

/// Port for persisting diary records
#[async_trait]
pub trait RecordStorePort: Send + Sync {
    /// Save a record and return its identifier
    async fn save_record(&self, record: NewRecord) -> Result<RecordId, DomainError>;
}
