//! Size-budget eviction for the cache store

use tracing::{debug, info, warn};

use crate::cache::store::CacheStore;
use crate::domain::errors::*;
use crate::domain::model::*;

/// When to evict and how far down to go
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionPolicy {
    max_bytes: u64,
    target_ratio: f64,
}

impl EvictionPolicy {
    pub fn new(max_bytes: u64, target_ratio: f64) -> Self {
        Self {
            max_bytes,
            target_ratio: target_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Size the cache is brought down to once the budget is exceeded
    pub fn target_bytes(&self) -> u64 {
        (self.max_bytes as f64 * self.target_ratio).floor() as u64
    }

    pub fn should_evict(&self, total_bytes: u64) -> bool {
        total_bytes > self.max_bytes
    }
}

/// What one eviction pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvictionReport {
    pub evicted: Vec<CacheKey>,
    pub freed_bytes: u64,
    /// Entries left alone because another task held their key
    pub skipped_busy: usize,
    pub remaining_bytes: u64,
}

impl CacheStore {
    /// Remove entries oldest first until the total is at most `target_bytes`.
    ///
    /// Entries whose key is held elsewhere (being produced or read) are
    /// skipped. The total is re-measured after every removal.
    pub async fn evict_until_under(&self, target_bytes: u64) -> Result<EvictionReport, DomainError> {
        let mut report = EvictionReport::default();
        let mut total = self.total_size_bytes().await;

        for candidate in self.entries_oldest_first().await {
            if total <= target_bytes {
                break;
            }
            let Some(guard) = self.try_lock_key(&candidate.key) else {
                debug!("Skipping busy cache entry {}", candidate.key);
                report.skipped_busy += 1;
                continue;
            };
            match self.remove_claimed(&guard).await {
                Ok(Some(removed)) => {
                    report.freed_bytes += removed.size_bytes;
                    report.evicted.push(removed.key);
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to persist eviction of {}: {}", candidate.key, e),
            }
            total = self.total_size_bytes().await;
        }

        report.remaining_bytes = total;
        if !report.evicted.is_empty() {
            info!(
                "Evicted {} cache entries ({} bytes), {} bytes remain",
                report.evicted.len(),
                report.freed_bytes,
                report.remaining_bytes
            );
        }
        if total > target_bytes {
            warn!(
                "Cache still holds {} bytes after eviction (target {}, {} busy)",
                total, target_bytes, report.skipped_busy
            );
        }
        Ok(report)
    }
}
