// Domain models - Core types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::errors::{DomainError, ErrorKind};


/// Smallest width/height a crop region may have, in source pixels
pub const MIN_CROP_DIMENSION: u32 = 100;

/// Shortest segment a trim may produce, in seconds
pub const MIN_SEGMENT_SECONDS: f64 = 5.0;

/// Time specification with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeSpec {
    pub seconds: f64,
}

impl TimeSpec {
    /// Create a new TimeSpec from seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Parse time string in various formats
    pub fn parse(time_str: &str) -> Result<Self, DomainError> {
        let trimmed = time_str.trim();

        if let Ok(seconds) = trimmed.parse::<f64>() {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(DomainError::InvalidParameters(format!(
                    "Time must be a non-negative number: {}",
                    time_str
                )));
            }
            return Ok(Self::from_seconds(seconds));
        }

        let bad = |what: &str| DomainError::InvalidParameters(format!("Invalid {} in {}", what, time_str));

        let parts: Vec<&str> = trimmed.split(':').collect();
        match parts.as_slice() {
            [minutes, seconds] => {
                let minutes = minutes.parse::<u32>().map_err(|_| bad("minutes"))?;
                let seconds = seconds.parse::<f64>().map_err(|_| bad("seconds"))?;
                if !(0.0..60.0).contains(&seconds) {
                    return Err(bad("seconds"));
                }
                Ok(Self::from_seconds(minutes as f64 * 60.0 + seconds))
            }
            [hours, minutes, seconds] => {
                let hours = hours.parse::<u32>().map_err(|_| bad("hours"))?;
                let minutes = minutes.parse::<u32>().map_err(|_| bad("minutes"))?;
                let seconds = seconds.parse::<f64>().map_err(|_| bad("seconds"))?;
                if minutes >= 60 {
                    return Err(bad("minutes"));
                }
                if !(0.0..60.0).contains(&seconds) {
                    return Err(bad("seconds"));
                }
                Ok(Self::from_seconds(
                    hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds,
                ))
            }
            _ => Err(DomainError::InvalidParameters(format!(
                "Invalid time format: {}. Supported formats: seconds (e.g., 12.5), MM:SS.ms, HH:MM:SS.ms",
                time_str
            ))),
        }
    }

    /// Format as HH:MM:SS.mmm, the form ffmpeg accepts for seek positions
    pub fn format_hms(&self) -> String {
        let total_ms = (self.seconds.max(0.0) * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let seconds = (total_ms % 60_000) / 1000;
        let millis = total_ms % 1000;
        format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hms())
    }
}

/// Source media properties reported by the probe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
}

impl MediaInfo {
    /// Create new media info with validation
    pub fn new(width: u32, height: u32, duration_seconds: f64) -> Result<Self, DomainError> {
        if width == 0 || height == 0 {
            return Err(DomainError::SourceUnavailable(
                "Video dimensions cannot be zero".to_string(),
            ));
        }
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(DomainError::SourceUnavailable(format!(
                "Video duration must be positive, got {}",
                duration_seconds
            )));
        }
        Ok(Self {
            width,
            height,
            duration_seconds,
        })
    }
}

/// Crop rectangle in source-video pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Whether the region lies fully inside the source frame
    pub fn fits_within(&self, media: &MediaInfo) -> bool {
        self.right() <= media.width as u64 && self.bottom() <= media.height as u64
    }
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Crop rectangle in display (UI) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Size of the surface the video is displayed on
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

/// Time range in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Create a time range, requiring `0 <= start < end`
    pub fn new(start: f64, end: f64) -> Result<Self, DomainError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(DomainError::InvalidParameters(
                "Time range bounds must be finite".to_string(),
            ));
        }
        if start < 0.0 {
            return Err(DomainError::InvalidParameters(format!(
                "Start time cannot be negative: {}",
                start
            )));
        }
        if end <= start {
            return Err(DomainError::InvalidParameters(format!(
                "End ({:.3}s) must be after start ({:.3}s)",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3},{:.3}", self.start, self.end)
    }
}

/// What a session commits: a spatial crop or a temporal trim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    Region,
    TimeRange,
}

/// Compression quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressQuality {
    High,
    Medium,
    Low,
}

impl CompressQuality {
    /// Constant rate factor for the preset (lower is better quality)
    pub fn crf(&self) -> u8 {
        match self {
            CompressQuality::High => 18,
            CompressQuality::Medium => 23,
            CompressQuality::Low => 28,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressQuality::High => "high",
            CompressQuality::Medium => "medium",
            CompressQuality::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.to_lowercase().as_str() {
            "high" => Ok(CompressQuality::High),
            "medium" => Ok(CompressQuality::Medium),
            "low" => Ok(CompressQuality::Low),
            other => Err(DomainError::InvalidParameters(format!(
                "Invalid quality: {}. Valid values: high, medium, low",
                other
            ))),
        }
    }
}

/// Operation the transcoder gateway can perform on a source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Crop(CropRegion),
    Trim(TimeRange),
    ExtractThumbnail { at_seconds: f64 },
    Compress { quality: CompressQuality },
}

impl Operation {
    /// Short tag used in cache keys and log lines
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::Crop(_) => "crop",
            Operation::Trim(_) => "trim",
            Operation::ExtractThumbnail { .. } => "thumb",
            Operation::Compress { .. } => "compress",
        }
    }

    /// Prefix for derived file names
    pub fn output_prefix(&self) -> String {
        match self {
            Operation::Crop(_) => "cropped".to_string(),
            Operation::Trim(_) => "trimmed".to_string(),
            Operation::ExtractThumbnail { .. } => "thumb".to_string(),
            Operation::Compress { quality } => format!("compressed_{}", quality.as_str()),
        }
    }

    /// Extension of the derived file; video operations keep the source container
    pub fn output_extension(&self, source: &Path) -> String {
        match self {
            Operation::ExtractThumbnail { .. } => "jpg".to_string(),
            _ => source
                .extension()
                .and_then(|ext| ext.to_str())
                .filter(|ext| !ext.is_empty())
                .unwrap_or("mp4")
                .to_string(),
        }
    }

    /// Parameter fragment of the cache key; times are canonicalized to milliseconds
    fn key_fragment(&self) -> String {
        match self {
            Operation::Crop(region) => region.to_string(),
            Operation::Trim(range) => range.to_string(),
            Operation::ExtractThumbnail { at_seconds } => format!("{:.3}", at_seconds),
            Operation::Compress { quality } => quality.as_str().to_string(),
        }
    }
}

/// Deterministic identity of a (source, operation) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for running `operation` against `source`
    pub fn for_operation(source: &Path, operation: &Operation) -> Self {
        Self(format!(
            "{}:{}:{}",
            source.to_string_lossy(),
            operation.tag(),
            operation.key_fragment()
        ))
    }

    /// Key of the thumbnail extracted from the output stored under this key
    pub fn thumbnail(&self) -> Self {
        Self(format!("{}#thumb", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A derived file tracked by the cache store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Insertion counter, breaks ties between equal timestamps
    pub sequence: u64,
    pub size_bytes: u64,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// Successful outcome of a processing request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub output_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    pub duration_seconds: f64,
    pub from_cache: bool,
}

/// Failed outcome of a processing request, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DomainError> for ProcessingFailure {
    fn from(err: &DomainError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Identifier assigned by the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Video diary record handed to the persistence layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub name: String,
    pub description: String,
    pub uri: PathBuf,
    pub duration_seconds: f64,
    pub thumbnail_uri: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl NewRecord {
    /// Build a record from a finished processing result
    pub fn from_result(name: &str, description: &str, result: &ProcessingResult) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            uri: result.output_path.clone(),
            duration_seconds: result.duration_seconds,
            thumbnail_uri: result.thumbnail_path.clone(),
            created_at: Utc::now(),
        }
    }
}
