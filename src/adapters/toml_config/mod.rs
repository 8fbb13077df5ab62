// TOML config adapter - Typed configuration loaded from TOML files

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::model::{MIN_CROP_DIMENSION, MIN_SEGMENT_SECONDS};
use crate::error::{DiaryCutError, DiaryCutResult};

/// Default on-disk budget for derived files
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 500 * 1024 * 1024;

/// Fraction of the budget eviction shrinks the cache to
pub const DEFAULT_EVICTION_TARGET_RATIO: f64 = 0.7;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "diarycut.toml";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub transcoder: TranscoderConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub records: RecordsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub max_size_bytes: u64,
    pub eviction_target_ratio: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("diarycut").join("video-processing"),
            max_size_bytes: DEFAULT_MAX_CACHE_BYTES,
            eviction_target_ratio: DEFAULT_EVICTION_TARGET_RATIO,
        }
    }
}

/// How the transcoder capability is chosen at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscoderMode {
    /// Use ffmpeg when it can be launched, otherwise pass through
    Auto,
    Ffmpeg,
    Passthrough,
}

impl TranscoderMode {
    pub fn parse(value: &str) -> DiaryCutResult<Self> {
        match value.to_lowercase().as_str() {
            "auto" => Ok(TranscoderMode::Auto),
            "ffmpeg" => Ok(TranscoderMode::Ffmpeg),
            "passthrough" => Ok(TranscoderMode::Passthrough),
            other => Err(DiaryCutError::InvalidConfig {
                message: format!(
                    "Invalid transcoder mode: {}. Valid modes: auto, ffmpeg, passthrough",
                    other
                ),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub mode: TranscoderMode,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub threads: usize,
    pub passthrough_delay_ms: u64,
    pub timeout_base_secs: u64,
    pub timeout_per_source_second: f64,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            mode: TranscoderMode::Auto,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            threads: num_cpus::get(),
            passthrough_delay_ms: 1000,
            timeout_base_secs: 30,
            timeout_per_source_second: 10.0,
        }
    }
}

impl TranscoderConfig {
    pub fn passthrough_delay(&self) -> Duration {
        Duration::from_millis(self.passthrough_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub debounce_ms: u64,
    pub min_crop_dimension: u32,
    pub min_segment_seconds: f64,
    pub default_region_fraction: f64,
    pub generate_thumbnails: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            min_crop_dimension: MIN_CROP_DIMENSION,
            min_segment_seconds: MIN_SEGMENT_SECONDS,
            default_region_fraction: 0.8,
            generate_thumbnails: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    /// Defaults to `records.jsonl` next to the cache directory
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Parse configuration from a TOML document; missing keys keep defaults
    pub fn from_toml_str(content: &str) -> DiaryCutResult<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> DiaryCutResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DiaryCutError::InvalidConfig {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Location of the diary record file
    pub fn records_path(&self) -> PathBuf {
        match &self.records.path {
            Some(path) => path.clone(),
            None => self
                .cache
                .dir
                .parent()
                .unwrap_or(&self.cache.dir)
                .join("records.jsonl"),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> DiaryCutResult<()> {
        let invalid = |message: String| Err(DiaryCutError::InvalidConfig { message });

        if self.cache.max_size_bytes == 0 {
            return invalid("cache.max_size_bytes must be positive".to_string());
        }
        let ratio = self.cache.eviction_target_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return invalid(format!(
                "cache.eviction_target_ratio must be in (0, 1], got {}",
                ratio
            ));
        }
        if self.transcoder.crf > 51 {
            return invalid("transcoder.crf cannot exceed 51".to_string());
        }
        if self.transcoder.timeout_per_source_second < 0.0
            || !self.transcoder.timeout_per_source_second.is_finite()
        {
            return invalid("transcoder.timeout_per_source_second must be non-negative".to_string());
        }
        if self.session.min_crop_dimension == 0 {
            return invalid("session.min_crop_dimension must be positive".to_string());
        }
        if !(self.session.min_segment_seconds > 0.0) {
            return invalid("session.min_segment_seconds must be positive".to_string());
        }
        let fraction = self.session.default_region_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return invalid(format!(
                "session.default_region_fraction must be in (0, 1], got {}",
                fraction
            ));
        }
        tracing_subscriber::EnvFilter::try_new(&self.logging.level).map_err(|e| {
            DiaryCutError::InvalidConfig {
                message: format!("Invalid log level {}: {}", self.logging.level, e),
            }
        })?;
        Ok(())
    }
}
