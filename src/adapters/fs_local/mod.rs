// Local filesystem adapter - File system operations on top of tokio::fs

use crate::domain::errors::*;
use crate::ports::*;
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Local filesystem adapter
#[derive(Debug, Clone, Default)]
pub struct LocalFsAdapter;

impl LocalFsAdapter {
    /// Create new local filesystem adapter
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FsPort for LocalFsAdapter {
    async fn exists(&self, path: &Path) -> Result<bool, DomainError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| DomainError::io(path.display(), e))
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<(), DomainError> {
        if let Some(parent) = to.parent() {
            self.make_directory(parent).await?;
        }
        tokio::fs::copy(from, to)
            .await
            .map_err(|e| DomainError::io(format!("copy {} -> {}", from.display(), to.display()), e))?;
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), DomainError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            // Already gone is what the caller wanted
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(DomainError::io(format!("delete {}", path.display()), e)),
        }
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>, DomainError> {
        let root = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1).max_depth(1) {
                let entry = entry.map_err(|e| {
                    DomainError::Io(format!("list {}: {}", root.display(), e))
                })?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            Ok::<_, DomainError>(files)
        })
        .await
        .map_err(|e| DomainError::Io(format!("list {}: {}", path.display(), e)))?
    }

    async fn size_of(&self, path: &Path) -> Result<u64, DomainError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| DomainError::io(format!("stat {}", path.display()), e))?;
        Ok(metadata.len())
    }

    async fn make_directory(&self, path: &Path) -> Result<(), DomainError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| DomainError::io(format!("create directory {}", path.display()), e))
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, DomainError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DomainError::io(format!("read {}", path.display()), e))
    }

    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), DomainError> {
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, contents)
            .await
            .map_err(|e| DomainError::io(format!("write {}", staging.display()), e))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| DomainError::io(format!("rename to {}", path.display()), e))
    }
}
