//! Capture Layer
//!
//! Frame sources and the region sampler. The camera itself is an external
//! collaborator: anything that can report its frame size and draw a
//! sub-rectangle into a new raster can feed the pipeline.

pub mod frame;
pub mod source;

pub use frame::{CapturedFrame, DetectedRegion, PixelRect, RasterSample};
pub use source::{SharedFrameSource, StillFrameSource};

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Anything that can provide camera frames to the sampler
pub trait FrameSource: Send + Sync {
    /// Current frame dimensions, (0, 0) while no frame is available
    fn dimensions(&self) -> (u32, u32);

    /// Draw `rect` of the current frame scaled to `out_width` x `out_height`
    /// into a new raster. `None` when no frame is available.
    fn draw_region(&self, rect: PixelRect, out_width: u32, out_height: u32) -> Option<RgbaImage>;
}

/// Draw a rectangle of `image` into a new raster of the requested size
pub fn draw_from_image(
    image: &RgbaImage,
    rect: PixelRect,
    out_width: u32,
    out_height: u32,
) -> Option<RgbaImage> {
    let (img_w, img_h) = image.dimensions();
    let rect = rect.clamp_to(img_w, img_h);
    if rect.is_empty() || out_width == 0 || out_height == 0 {
        return None;
    }

    let cropped = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
    if cropped.dimensions() == (out_width, out_height) {
        return Some(cropped);
    }

    Some(imageops::resize(&cropped, out_width, out_height, FilterType::Triangle))
}

/// Fixed, percentage-sized detection zone centered in the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureZone {
    /// Zone width as a fraction of the frame width
    pub width_pct: f32,
    /// Zone height as a fraction of the frame height
    pub height_pct: f32,
}

impl Default for CaptureZone {
    fn default() -> Self {
        Self {
            width_pct: 0.30,
            height_pct: 0.75,
        }
    }
}

impl CaptureZone {
    /// Absolute zone rectangle for a frame, `None` if the frame has no pixels
    pub fn rect(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }

        let width = ((frame_width as f32 * self.width_pct.clamp(0.0, 1.0)).round() as u32)
            .clamp(1, frame_width);
        let height = ((frame_height as f32 * self.height_pct.clamp(0.0, 1.0)).round() as u32)
            .clamp(1, frame_height);

        Some(PixelRect {
            x: (frame_width - width) / 2,
            y: (frame_height - height) / 2,
            width,
            height,
        })
    }

    /// Extract the zone from the current frame at native resolution
    pub fn extract(&self, source: &dyn FrameSource) -> Option<RasterSample> {
        let (w, h) = source.dimensions();
        let rect = self.rect(w, h)?;
        let image = source.draw_region(rect, rect.width, rect.height)?;
        Some(RasterSample::new(image, rect))
    }
}

/// Sampling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// 100 ms between samples
    #[default]
    Fast,
    /// 250 ms between samples, for battery-powered devices
    LowPower,
    /// Explicit interval in milliseconds
    Custom(u64),
}

impl Cadence {
    pub fn interval(&self) -> Duration {
        match self {
            Cadence::Fast => Duration::from_millis(100),
            Cadence::LowPower => Duration::from_millis(250),
            Cadence::Custom(ms) => Duration::from_millis((*ms).max(1)),
        }
    }
}

/// Region sampler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Detection zone
    pub zone: CaptureZone,
    /// Width of the downscaled sample
    pub sample_width: u32,
    /// Height of the downscaled sample
    pub sample_height: u32,
    /// Time between samples
    pub cadence: Cadence,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            zone: CaptureZone::default(),
            sample_width: 100,
            sample_height: 140,
            cadence: Cadence::Fast,
        }
    }
}

/// Draws the detection zone into a small fixed-size sample on every tick
#[derive(Debug, Clone)]
pub struct RegionSampler {
    config: SamplerConfig,
}

impl RegionSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn zone(&self) -> CaptureZone {
        self.config.zone
    }

    /// Sample the detection zone of the current frame
    ///
    /// Returns `None` while the source has no frame; that tick is a no-op.
    pub fn sample(&self, source: &dyn FrameSource) -> Option<RasterSample> {
        let (w, h) = source.dimensions();
        let Some(rect) = self.config.zone.rect(w, h) else {
            trace!("Frame source not ready, skipping sample");
            return None;
        };

        let image = source.draw_region(rect, self.config.sample_width, self.config.sample_height)?;
        Some(RasterSample::new(image, rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_zone_is_centered() {
        let zone = CaptureZone::default();
        let rect = zone.rect(1000, 800).unwrap();
        assert_eq!(rect.width, 300);
        assert_eq!(rect.height, 600);
        assert_eq!(rect.x, 350);
        assert_eq!(rect.y, 100);
    }

    #[test]
    fn test_zone_zero_frame() {
        assert!(CaptureZone::default().rect(0, 720).is_none());
        assert!(CaptureZone::default().rect(1280, 0).is_none());
    }

    #[test]
    fn test_cadence_presets() {
        assert_eq!(Cadence::Fast.interval(), Duration::from_millis(100));
        assert_eq!(Cadence::LowPower.interval(), Duration::from_millis(250));
        assert_eq!(Cadence::Custom(0).interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_sampler_returns_fixed_size() {
        let frame = RgbaImage::from_pixel(640, 480, Rgba([10, 20, 30, 255]));
        let source = StillFrameSource::new(frame);
        let sampler = RegionSampler::new(SamplerConfig::default());

        let sample = sampler.sample(&source).unwrap();
        assert_eq!((sample.width(), sample.height()), (100, 140));
        assert_eq!(sample.source(), CaptureZone::default().rect(640, 480).unwrap());
    }

    #[test]
    fn test_sampler_noop_without_frame() {
        let source = SharedFrameSource::new();
        let sampler = RegionSampler::new(SamplerConfig::default());
        assert!(sampler.sample(&source).is_none());
    }

    #[test]
    fn test_draw_from_image_keeps_native_size() {
        let image = RgbaImage::from_pixel(20, 20, Rgba([1, 2, 3, 255]));
        let drawn = draw_from_image(&image, PixelRect::new(5, 5, 10, 8), 10, 8).unwrap();
        assert_eq!(drawn.dimensions(), (10, 8));
        assert_eq!(drawn.get_pixel(0, 0), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_extract_zone_native_resolution() {
        let source = StillFrameSource::new(RgbaImage::new(200, 100));
        let raster = CaptureZone::default().extract(&source).unwrap();
        assert_eq!((raster.width(), raster.height()), (60, 75));
    }
}
