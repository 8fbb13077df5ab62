//! Cache store: maps cache keys to derived files on disk
//!
//! The store owns a directory of derived files plus an `index.json` that
//! records which key produced which file. Every operation on a key runs
//! under that key's lock; operations on different keys proceed in parallel.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::cache::eviction::EvictionPolicy;
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::ports::FsPort;

const INDEX_FILE: &str = "index.json";
const INDEX_STAGING_FILE: &str = "index.json.tmp";
const MAX_STEM_CHARS: usize = 48;
const DERIVED_PREFIXES: [&str; 6] = [
    "cropped",
    "trimmed",
    "thumb",
    "compressed_high",
    "compressed_medium",
    "compressed_low",
];

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheIndex {
    next_sequence: u64,
    entries: BTreeMap<CacheKey, CacheEntry>,
}

impl CacheIndex {
    fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}

/// Exclusive claim on one cache key
pub struct KeyGuard {
    key: CacheKey,
    _lock: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

/// Disk-backed cache of derived files
pub struct CacheStore {
    root: PathBuf,
    index_path: PathBuf,
    fs: Arc<dyn FsPort>,
    policy: EvictionPolicy,
    index: Mutex<CacheIndex>,
    key_locks: std::sync::Mutex<HashMap<CacheKey, Weak<Mutex<()>>>>,
    file_counter: AtomicU64,
}

/// Whether `path` is named like a file produced by `allocate_output_path`
fn is_derived_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name == INDEX_FILE || name == INDEX_STAGING_FILE {
        return false;
    }
    DERIVED_PREFIXES.iter().any(|prefix| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|rest| rest.split('_').next())
            .map(|millis| !millis.is_empty() && millis.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false)
    })
}

impl CacheStore {
    /// Open (or create) the cache rooted at `root`.
    ///
    /// Index entries whose file has disappeared are dropped, and derived files
    /// in the directory that no entry references are deleted. Other files are
    /// left alone.
    pub async fn open(
        root: impl Into<PathBuf>,
        fs: Arc<dyn FsPort>,
        policy: EvictionPolicy,
    ) -> Result<Self, DomainError> {
        let root = root.into();
        fs.make_directory(&root).await?;
        let index_path = root.join(INDEX_FILE);

        let mut index = if fs.exists(&index_path).await? {
            let text = fs.read_to_string(&index_path).await?;
            match serde_json::from_str::<CacheIndex>(&text) {
                Ok(index) => index,
                Err(e) => {
                    warn!("Discarding unreadable cache index {}: {}", index_path.display(), e);
                    CacheIndex::default()
                }
            }
        } else {
            CacheIndex::default()
        };

        let mut stale = Vec::new();
        for (key, entry) in &index.entries {
            if !fs.exists(&entry.output_path).await? {
                stale.push(key.clone());
            }
        }
        for key in &stale {
            index.entries.remove(key);
        }
        if !stale.is_empty() {
            warn!("Dropped {} cache entries whose files are missing", stale.len());
        }

        let referenced: HashSet<&Path> = index
            .entries
            .values()
            .map(|e| e.output_path.as_path())
            .collect();
        let mut orphans = 0usize;
        for file in fs.list_directory(&root).await? {
            if !is_derived_file(&file) || referenced.contains(file.as_path()) {
                continue;
            }
            match fs.delete(&file).await {
                Ok(()) => orphans += 1,
                Err(e) => warn!("Failed to delete orphaned cache file {}: {}", file.display(), e),
            }
        }
        if orphans > 0 {
            info!("Deleted {} orphaned files from {}", orphans, root.display());
        }

        let store = Self {
            root,
            index_path,
            fs,
            policy,
            index: Mutex::new(index),
            key_locks: std::sync::Mutex::new(HashMap::new()),
            file_counter: AtomicU64::new(0),
        };
        {
            let index = store.index.lock().await;
            store.persist(&index).await?;
        }
        info!(
            "Opened cache at {} ({} entries, {} bytes)",
            store.root.display(),
            store.len().await,
            store.total_size_bytes().await
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_mutex(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = locks.get(key).and_then(Weak::upgrade) {
            return existing;
        }
        locks.retain(|_, weak| weak.strong_count() > 0);
        let mutex = Arc::new(Mutex::new(()));
        locks.insert(key.clone(), Arc::downgrade(&mutex));
        mutex
    }

    /// Wait for exclusive access to `key`
    pub async fn lock_key(&self, key: &CacheKey) -> KeyGuard {
        let lock = self.key_mutex(key).lock_owned().await;
        KeyGuard {
            key: key.clone(),
            _lock: lock,
        }
    }

    /// Claim `key` only if nobody else holds it
    pub fn try_lock_key(&self, key: &CacheKey) -> Option<KeyGuard> {
        let lock = self.key_mutex(key).try_lock_owned().ok()?;
        Some(KeyGuard {
            key: key.clone(),
            _lock: lock,
        })
    }

    /// Look up a key, treating a vanished file as a miss
    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, DomainError> {
        let guard = self.lock_key(key).await;
        self.lookup_claimed(&guard).await
    }

    /// Look up the key held by `guard`
    pub async fn lookup_claimed(&self, guard: &KeyGuard) -> Result<Option<CacheEntry>, DomainError> {
        let key = guard.key();
        let entry = {
            let index = self.index.lock().await;
            index.entries.get(key).cloned()
        };
        let Some(entry) = entry else {
            return Ok(None);
        };

        if self.fs.exists(&entry.output_path).await? {
            debug!("Cache hit for {}", key);
            return Ok(Some(entry));
        }

        warn!(
            "Cache entry {} points at missing file {}; purging",
            key,
            entry.output_path.display()
        );
        let mut index = self.index.lock().await;
        if index.entries.get(key).map(|e| e.sequence) == Some(entry.sequence) {
            index.entries.remove(key);
            self.persist(&index).await?;
        }
        Ok(None)
    }

    /// Record a produced file under `key`, then enforce the size budget
    pub async fn insert(
        &self,
        key: &CacheKey,
        output_path: &Path,
        duration_seconds: Option<f64>,
    ) -> Result<CacheEntry, DomainError> {
        let guard = self.lock_key(key).await;
        self.insert_claimed(&guard, output_path, duration_seconds).await
    }

    /// Record a produced file under the key held by `guard`.
    ///
    /// The file must live inside the cache directory, since the store deletes
    /// it on eviction, and must fit in the budget on its own. On failure
    /// nothing is added to the index and the file is left to the caller.
    pub async fn insert_claimed(
        &self,
        guard: &KeyGuard,
        output_path: &Path,
        duration_seconds: Option<f64>,
    ) -> Result<CacheEntry, DomainError> {
        let key = guard.key();
        if !output_path.starts_with(&self.root) {
            return Err(DomainError::InvalidParameters(format!(
                "{} is outside the cache directory {}",
                output_path.display(),
                self.root.display()
            )));
        }
        let size_bytes = self.fs.size_of(output_path).await?;
        if size_bytes > self.policy.max_bytes() {
            return Err(DomainError::Io(format!(
                "{} is {} bytes, larger than the {} byte cache budget",
                output_path.display(),
                size_bytes,
                self.policy.max_bytes()
            )));
        }

        let (entry, replaced, total) = {
            let mut index = self.index.lock().await;
            let entry = CacheEntry {
                key: key.clone(),
                output_path: output_path.to_path_buf(),
                created_at: Utc::now(),
                sequence: index.next_sequence,
                size_bytes,
                duration_seconds,
            };
            index.next_sequence += 1;
            let replaced = index.entries.insert(key.clone(), entry.clone());

            if let Err(e) = self.persist(&index).await {
                match &replaced {
                    Some(previous) => index.entries.insert(key.clone(), previous.clone()),
                    None => index.entries.remove(key),
                };
                return Err(e);
            }
            (entry, replaced, index.total_size())
        };

        if let Some(previous) = replaced {
            if previous.output_path != entry.output_path {
                if let Err(e) = self.fs.delete(&previous.output_path).await {
                    warn!("Failed to delete replaced cache file {}: {}", previous.output_path.display(), e);
                }
            }
        }
        debug!("Cached {} -> {} ({} bytes)", key, entry.output_path.display(), size_bytes);

        if self.policy.should_evict(total) {
            let target = self.policy.target_bytes();
            match self.evict_until_under(target).await {
                Ok(report) => debug!(
                    "Eviction freed {} bytes across {} entries",
                    report.freed_bytes,
                    report.evicted.len()
                ),
                Err(e) => warn!("Eviction after insert failed: {}", e),
            }
        }
        Ok(entry)
    }

    /// Remove a key and delete its file
    pub async fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>, DomainError> {
        let guard = self.lock_key(key).await;
        self.remove_claimed(&guard).await
    }

    /// Remove the key held by `guard`.
    ///
    /// The index entry is dropped even when deleting the file fails; the
    /// failure is logged. Only a failure to persist the index is returned.
    pub async fn remove_claimed(&self, guard: &KeyGuard) -> Result<Option<CacheEntry>, DomainError> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.entries.remove(guard.key()) else {
            return Ok(None);
        };
        if let Err(e) = self.fs.delete(&entry.output_path).await {
            warn!("Failed to delete cache file {}: {}", entry.output_path.display(), e);
        }
        self.persist(&index).await?;
        Ok(Some(entry))
    }

    /// Bytes used by all tracked files
    pub async fn total_size_bytes(&self) -> u64 {
        self.index.lock().await.total_size()
    }

    /// Number of tracked entries
    pub async fn len(&self) -> usize {
        self.index.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All entries, oldest first
    pub async fn entries_oldest_first(&self) -> Vec<CacheEntry> {
        let index = self.index.lock().await;
        let mut entries: Vec<CacheEntry> = index.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        entries
    }

    /// Delete every tracked file and empty the index
    pub async fn clear(&self) -> Result<usize, DomainError> {
        let keys: Vec<CacheKey> = {
            let index = self.index.lock().await;
            index.entries.keys().cloned().collect()
        };
        let mut removed = 0;
        for key in keys {
            let guard = self.lock_key(&key).await;
            if self.remove_claimed(&guard).await?.is_some() {
                removed += 1;
            }
        }
        info!("Cleared {} cache entries from {}", removed, self.root.display());
        Ok(removed)
    }

    /// Delete a produced file that never made it into the index
    pub async fn discard(&self, path: &Path) {
        if !path.starts_with(&self.root) {
            return;
        }
        if let Err(e) = self.fs.delete(path).await {
            warn!("Failed to discard {}: {}", path.display(), e);
        }
    }

    /// Fresh path inside the cache directory for the output of `operation`
    pub fn allocate_output_path(&self, source: &Path, operation: &Operation) -> PathBuf {
        let stem: String = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(MAX_STEM_CHARS)
            .collect();
        let counter = self.file_counter.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(
            "{}_{}_{}_{}.{}",
            operation.output_prefix(),
            Utc::now().timestamp_millis(),
            counter,
            stem,
            operation.output_extension(source)
        ))
    }

    async fn persist(&self, index: &CacheIndex) -> Result<(), DomainError> {
        let json = serde_json::to_vec_pretty(index)
            .map_err(|e| DomainError::Io(format!("encode cache index: {}", e)))?;
        self.fs.write_atomic(&self.index_path, &json).await
    }
}
