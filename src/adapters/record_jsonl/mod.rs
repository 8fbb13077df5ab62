// JSON-lines record store - Appends diary records to a local file

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::*;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Serialize)]
struct StoredRecord<'a> {
    id: RecordId,
    #[serde(flatten)]
    record: &'a NewRecord,
}

/// Record store writing one JSON object per line
pub struct JsonlRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl RecordStorePort for JsonlRecordStore {
    async fn save_record(&self, record: NewRecord) -> Result<RecordId, DomainError> {
        let id = RecordId(Uuid::new_v4());
        let mut line = serde_json::to_string(&StoredRecord {
            id,
            record: &record,
        })
        .map_err(|e| DomainError::Io(format!("encode record: {}", e)))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::io(parent.display(), e))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| DomainError::io(self.path.display(), e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| DomainError::io(self.path.display(), e))?;
        file.flush()
            .await
            .map_err(|e| DomainError::io(self.path.display(), e))?;

        tracing::info!("Saved record {} ({})", id, record.name);
        Ok(id)
    }
}
