//! Cached processing pipeline: lookup, transcode, insert, thumbnail

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, KeyGuard};
use crate::domain::errors::*;
use crate::domain::model::*;
use crate::engine::gateway::TranscoderGateway;
use crate::engine::progress::{ProgressTracker, PROGRESS_TRANSCODED};

/// One unit of work for the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    pub source: PathBuf,
    pub operation: Operation,
    pub source_duration: f64,
}

impl ProcessRequest {
    /// Duration of the file the operation produces
    pub fn result_duration(&self) -> f64 {
        match self.operation {
            Operation::Trim(range) => range.duration(),
            Operation::ExtractThumbnail { .. } => 0.0,
            Operation::Crop(_) | Operation::Compress { .. } => self.source_duration,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_operation(&self.source, &self.operation)
    }
}

pub struct ProcessingPipeline {
    cache: Arc<CacheStore>,
    gateway: Arc<TranscoderGateway>,
    generate_thumbnails: bool,
}

impl ProcessingPipeline {
    pub fn new(cache: Arc<CacheStore>, gateway: Arc<TranscoderGateway>, generate_thumbnails: bool) -> Self {
        Self {
            cache,
            gateway,
            generate_thumbnails,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Produce (or fetch) the output for `request`.
    ///
    /// The key stays claimed for the whole run, so a concurrent request for
    /// the same key waits and then hits the cache.
    pub async fn process(
        &self,
        request: &ProcessRequest,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, DomainError> {
        if self.gateway.capability().is_passthrough() {
            return self.pass_through(request, progress, cancel).await;
        }

        let key = request.cache_key();
        let guard = tokio::select! {
            guard = self.cache.lock_key(&key) => guard,
            _ = cancel.cancelled() => return Err(DomainError::Cancelled),
        };

        if let Some(entry) = self.cache.lookup_claimed(&guard).await? {
            info!("Serving {} from cache", key);
            progress.advance(PROGRESS_TRANSCODED);
            let thumbnail_path = self.cached_thumbnail(request, &entry).await;
            return Ok(ProcessingResult {
                output_path: entry.output_path,
                thumbnail_path,
                duration_seconds: entry
                    .duration_seconds
                    .unwrap_or_else(|| request.result_duration()),
                from_cache: true,
            });
        }

        let entry = self.produce(&guard, request, cancel).await?;
        progress.advance(PROGRESS_TRANSCODED);
        let thumbnail_path = match self.thumbnail_step(request, &entry, cancel).await {
            Ok(path) => path,
            Err(e) => {
                // A cancelled run leaves nothing behind under its key
                if let Err(remove_err) = self.cache.remove_claimed(&guard).await {
                    warn!("Failed to drop {} after cancellation: {}", key, remove_err);
                }
                return Err(e);
            }
        };
        drop(guard);

        Ok(ProcessingResult {
            output_path: entry.output_path,
            thumbnail_path,
            duration_seconds: request.result_duration(),
            from_cache: false,
        })
    }

    /// Transcode into a fresh cache file and index it under the claimed key
    async fn produce(
        &self,
        guard: &KeyGuard,
        request: &ProcessRequest,
        cancel: &CancellationToken,
    ) -> Result<CacheEntry, DomainError> {
        let output = self
            .cache
            .allocate_output_path(&request.source, &request.operation);
        debug!("Cache miss for {}, producing {}", guard.key(), output.display());

        let produced = self
            .gateway
            .execute(
                &request.source,
                &request.operation,
                &output,
                request.source_duration,
                cancel,
            )
            .await?;

        if cancel.is_cancelled() {
            self.cache.discard(&produced).await;
            return Err(DomainError::Cancelled);
        }

        match self
            .cache
            .insert_claimed(guard, &produced, Some(request.result_duration()))
            .await
        {
            Ok(entry) => Ok(entry),
            Err(e) => {
                self.cache.discard(&produced).await;
                Err(e)
            }
        }
    }

    fn wants_thumbnail(&self, request: &ProcessRequest) -> bool {
        self.generate_thumbnails && !matches!(request.operation, Operation::ExtractThumbnail { .. })
    }

    /// Thumbnail already cached for a cache hit; never calls the transcoder
    async fn cached_thumbnail(&self, request: &ProcessRequest, primary: &CacheEntry) -> Option<PathBuf> {
        if !self.wants_thumbnail(request) {
            return None;
        }
        let guard = self.cache.lock_key(&primary.key.thumbnail()).await;
        match self.cache.lookup_claimed(&guard).await {
            Ok(entry) => entry.map(|e| e.output_path),
            Err(e) => {
                warn!("Thumbnail lookup for {} failed: {}", primary.key, e);
                None
            }
        }
    }

    /// Thumbnail of the derived output, cached under `<key>#thumb`.
    ///
    /// Failures other than cancellation are logged and yield no thumbnail.
    async fn thumbnail_step(
        &self,
        request: &ProcessRequest,
        primary: &CacheEntry,
        cancel: &CancellationToken,
    ) -> Result<Option<PathBuf>, DomainError> {
        if !self.wants_thumbnail(request) {
            return Ok(None);
        }

        let thumb_request = ProcessRequest {
            source: primary.output_path.clone(),
            operation: Operation::ExtractThumbnail { at_seconds: 0.0 },
            source_duration: request.result_duration(),
        };
        let guard = self.cache.lock_key(&primary.key.thumbnail()).await;

        let outcome = match self.cache.lookup_claimed(&guard).await {
            Ok(Some(entry)) => Ok(entry),
            Ok(None) => self.produce(&guard, &thumb_request, cancel).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(entry) => Ok(Some(entry.output_path)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Thumbnail for {} failed: {}", primary.key, e);
                Ok(None)
            }
        }
    }

    /// Pass-through results are the source file itself and never enter the cache
    async fn pass_through(
        &self,
        request: &ProcessRequest,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, DomainError> {
        let output = self
            .cache
            .allocate_output_path(&request.source, &request.operation);
        let produced = self
            .gateway
            .execute(
                &request.source,
                &request.operation,
                &output,
                request.source_duration,
                cancel,
            )
            .await?;
        progress.advance(PROGRESS_TRANSCODED);
        Ok(ProcessingResult {
            output_path: produced,
            thumbnail_path: None,
            duration_seconds: request.result_duration(),
            from_cache: false,
        })
    }
}
