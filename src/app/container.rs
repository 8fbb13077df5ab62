use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::toml_config::{AppConfig, TranscoderMode};
use crate::adapters::{FfmpegAdapter, FfprobeAdapter, JsonlRecordStore, LocalFsAdapter};
use crate::app::service::VideoProcessingService;
use crate::cache::{CacheStore, EvictionPolicy};
use crate::domain::rules::{RegionRules, SegmentRules};
use crate::engine::gateway::{EncodeSettings, TimeoutPolicy, TranscoderCapability, TranscoderGateway};
use crate::engine::pipeline::ProcessingPipeline;
use crate::engine::session::SessionSettings;
use crate::error::{DiaryCutError, DiaryCutResult};
use crate::ports::{FsPort, ProbePort, RecordStorePort, TranscoderPort};

pub trait AppContainer: Send + Sync {
    fn service(&self) -> Arc<VideoProcessingService>;
    fn records(&self) -> Arc<dyn RecordStorePort>;
    fn capability(&self) -> TranscoderCapability;
}

/// Ports the container wires together
pub struct Ports {
    pub transcoder: Arc<dyn TranscoderPort>,
    pub probe: Arc<dyn ProbePort>,
    pub fs: Arc<dyn FsPort>,
    pub records: Arc<dyn RecordStorePort>,
}

impl Ports {
    /// Production adapters described by `config`
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            transcoder: Arc::new(FfmpegAdapter::new(&config.transcoder.ffmpeg_path)),
            probe: Arc::new(FfprobeAdapter::new(&config.transcoder.ffprobe_path)),
            fs: Arc::new(LocalFsAdapter::new()),
            records: Arc::new(JsonlRecordStore::new(config.records_path())),
        }
    }
}

pub struct DefaultAppContainer {
    service: Arc<VideoProcessingService>,
    records: Arc<dyn RecordStorePort>,
    capability: TranscoderCapability,
}

impl DefaultAppContainer {
    pub async fn new(config: &AppConfig) -> DiaryCutResult<Self> {
        Self::with_ports(config, Ports::from_config(config)).await
    }

    pub async fn with_ports(config: &AppConfig, ports: Ports) -> DiaryCutResult<Self> {
        config.validate()?;
        let capability = select_capability(config, ports.transcoder.as_ref()).await?;

        let cache = CacheStore::open(
            &config.cache.dir,
            Arc::clone(&ports.fs),
            EvictionPolicy::new(config.cache.max_size_bytes, config.cache.eviction_target_ratio),
        )
        .await?;

        let gateway = TranscoderGateway::new(
            Arc::clone(&ports.transcoder),
            Arc::clone(&ports.fs),
            capability,
            EncodeSettings {
                video_codec: config.transcoder.video_codec.clone(),
                preset: config.transcoder.preset.clone(),
                crf: config.transcoder.crf,
                threads: config.transcoder.threads,
            },
            TimeoutPolicy::new(
                Duration::from_secs(config.transcoder.timeout_base_secs),
                config.transcoder.timeout_per_source_second,
            ),
        );

        let pipeline = ProcessingPipeline::new(
            Arc::new(cache),
            Arc::new(gateway),
            config.session.generate_thumbnails,
        );

        let settings = SessionSettings {
            debounce: Duration::from_millis(config.session.debounce_ms),
            region_rules: RegionRules::new(config.session.min_crop_dimension),
            segment_rules: SegmentRules::new(config.session.min_segment_seconds),
            default_region_fraction: config.session.default_region_fraction,
        };

        let service = VideoProcessingService::new(Arc::clone(&ports.probe), Arc::new(pipeline), settings);

        Ok(Self {
            service: Arc::new(service),
            records: ports.records,
            capability,
        })
    }
}

impl AppContainer for DefaultAppContainer {
    fn service(&self) -> Arc<VideoProcessingService> {
        Arc::clone(&self.service)
    }

    fn records(&self) -> Arc<dyn RecordStorePort> {
        Arc::clone(&self.records)
    }

    fn capability(&self) -> TranscoderCapability {
        self.capability
    }
}

/// Decide once, at startup, how operations will run
async fn select_capability(
    config: &AppConfig,
    transcoder: &dyn TranscoderPort,
) -> DiaryCutResult<TranscoderCapability> {
    let passthrough = TranscoderCapability::PassThrough {
        delay: config.transcoder.passthrough_delay(),
    };
    let capability = match config.transcoder.mode {
        TranscoderMode::Passthrough => passthrough,
        TranscoderMode::Ffmpeg => {
            if !transcoder.is_available().await {
                return Err(DiaryCutError::InvalidConfig {
                    message: format!(
                        "transcoder mode is ffmpeg but {} cannot be run",
                        config.transcoder.ffmpeg_path.display()
                    ),
                });
            }
            TranscoderCapability::Native
        }
        TranscoderMode::Auto => {
            if transcoder.is_available().await {
                TranscoderCapability::Native
            } else {
                warn!(
                    "{} is not available; outputs will be the unmodified source",
                    config.transcoder.ffmpeg_path.display()
                );
                passthrough
            }
        }
    };
    info!("Transcoder capability: {:?}", capability);
    Ok(capability)
}
