// Domain rules - Bounds and clamping policies for crop regions and time ranges

use crate::domain::errors::*;
use crate::domain::model::*;


/// Tolerance when comparing second values coming from UI sliders
const TIME_EPSILON: f64 = 1e-6;

/// Rules for crop regions in source pixel space
#[derive(Debug, Clone, Copy)]
pub struct RegionRules {
    min_dimension: u32,
}

impl Default for RegionRules {
    fn default() -> Self {
        Self::new(MIN_CROP_DIMENSION)
    }
}

impl RegionRules {
    pub fn new(min_dimension: u32) -> Self {
        Self { min_dimension }
    }

    /// Reject any region that breaks the minimum size or leaves the frame
    pub fn validate(&self, region: &CropRegion, media: &MediaInfo) -> Result<(), DomainError> {
        if region.width < self.min_dimension || region.height < self.min_dimension {
            return Err(DomainError::InvalidParameters(format!(
                "Crop region {}x{} is smaller than the {}px minimum",
                region.width, region.height, self.min_dimension
            )));
        }
        if !region.fits_within(media) {
            return Err(DomainError::InvalidParameters(format!(
                "Crop region {} exceeds source frame {}x{}",
                region, media.width, media.height
            )));
        }
        Ok(())
    }

    /// Pull a requested region back inside the frame.
    ///
    /// Oversized regions shrink to the frame, then the origin shifts so the
    /// region fits. A region that is still below the minimum size is rejected.
    pub fn clamp(&self, requested: CropRegion, media: &MediaInfo) -> Result<CropRegion, DomainError> {
        let width = requested.width.min(media.width);
        let height = requested.height.min(media.height);
        let clamped = CropRegion {
            x: requested.x.min(media.width - width),
            y: requested.y.min(media.height - height),
            width,
            height,
        };
        self.validate(&clamped, media)?;
        Ok(clamped)
    }

    /// Centered square covering `fraction` of the smaller source dimension
    pub fn default_region(&self, media: &MediaInfo, fraction: f64) -> CropRegion {
        let smaller = media.width.min(media.height);
        let side = ((smaller as f64) * fraction.clamp(0.0, 1.0)).round() as u32;
        let side = side.max(self.min_dimension).min(smaller);
        CropRegion {
            x: (media.width - side) / 2,
            y: (media.height - side) / 2,
            width: side,
            height: side,
        }
    }

    /// Convert a display-space rectangle to source pixels, then clamp it
    pub fn from_display(
        &self,
        display: DisplayRegion,
        surface: DisplaySize,
        media: &MediaInfo,
    ) -> Result<CropRegion, DomainError> {
        let values = [
            display.x,
            display.y,
            display.width,
            display.height,
            surface.width,
            surface.height,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DomainError::InvalidParameters(
                "Display region must be finite".to_string(),
            ));
        }
        if surface.width <= 0.0 || surface.height <= 0.0 {
            return Err(DomainError::InvalidParameters(format!(
                "Display surface must be non-empty, got {}x{}",
                surface.width, surface.height
            )));
        }

        let scale_x = media.width as f64 / surface.width;
        let scale_y = media.height as f64 / surface.height;
        let to_px = |v: f64, scale: f64| (v.max(0.0) * scale).round().min(u32::MAX as f64) as u32;

        let requested = CropRegion {
            x: to_px(display.x, scale_x),
            y: to_px(display.y, scale_y),
            width: to_px(display.width, scale_x),
            height: to_px(display.height, scale_y),
        };
        self.clamp(requested, media)
    }
}

/// Rules for trim ranges on the source timeline
#[derive(Debug, Clone, Copy)]
pub struct SegmentRules {
    min_seconds: f64,
}

impl Default for SegmentRules {
    fn default() -> Self {
        Self::new(MIN_SEGMENT_SECONDS)
    }
}

impl SegmentRules {
    pub fn new(min_seconds: f64) -> Self {
        Self { min_seconds }
    }

    /// Minimum segment length for a source; a short source only admits itself
    fn effective_min(&self, duration: f64) -> f64 {
        self.min_seconds.min(duration)
    }

    /// First `min_seconds` of the source
    pub fn default_range(&self, media: &MediaInfo) -> TimeRange {
        TimeRange {
            start: 0.0,
            end: self.effective_min(media.duration_seconds),
        }
    }

    /// Check a range against the source duration and minimum length
    pub fn validate(&self, range: &TimeRange, duration: f64) -> Result<(), DomainError> {
        TimeRange::new(range.start, range.end)?;
        if range.end > duration + TIME_EPSILON {
            return Err(DomainError::InvalidParameters(format!(
                "End ({:.3}s) is past the source duration ({:.3}s)",
                range.end, duration
            )));
        }
        if range.duration() + TIME_EPSILON < self.effective_min(duration) {
            return Err(DomainError::InvalidParameters(format!(
                "Segment of {:.3}s is shorter than the {:.3}s minimum",
                range.duration(),
                self.min_seconds
            )));
        }
        Ok(())
    }

    /// Apply a slider update relative to the current range.
    ///
    /// A moved start drags the end forward to keep the minimum length; a moved
    /// end drags the start back. Both stay within `[0, duration]`.
    pub fn adjust(
        &self,
        current: &TimeRange,
        start: f64,
        end: f64,
        duration: f64,
    ) -> Result<TimeRange, DomainError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(DomainError::InvalidParameters(
                "Time range bounds must be finite".to_string(),
            ));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(DomainError::SourceUnavailable(format!(
                "Source duration must be positive, got {}",
                duration
            )));
        }

        let min = self.effective_min(duration);
        let start_moved = (start - current.start).abs() > TIME_EPSILON;

        let adjusted = if start_moved {
            let start = start.clamp(0.0, duration - min);
            let end = end.max(start + min).min(duration);
            TimeRange { start, end }
        } else {
            let end = end.clamp(min, duration);
            let start = start.min(end - min).max(0.0);
            TimeRange { start, end }
        };

        self.validate(&adjusted, duration)?;
        Ok(adjusted)
    }
}
