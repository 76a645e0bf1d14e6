//! Frame and raster data structures for captured camera content

use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// Axis-aligned rectangle in source-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Whether the rectangle covers no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamp the rectangle so it lies inside a `frame_width` x `frame_height` image
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> PixelRect {
        let x = self.x.min(frame_width);
        let y = self.y.min(frame_height);
        PixelRect {
            x,
            y,
            width: self.width.min(frame_width - x),
            height: self.height.min(frame_height - y),
        }
    }
}

/// A captured frame from the camera
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// RGBA pixels, shared so frame sources can hand out cheap snapshots
    pub image: Arc<RgbaImage>,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            timestamp: Instant::now(),
        }
    }

    /// Create a frame from raw RGBA bytes, `None` when the buffer is too small
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(Self::new)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// An immutable pixel buffer together with the rectangle it was drawn from
///
/// Every stage that changes pixels produces a new `RasterSample`; the buffer
/// inside is never handed out mutably.
#[derive(Debug, Clone)]
pub struct RasterSample {
    image: RgbaImage,
    source: PixelRect,
}

impl RasterSample {
    pub fn new(image: RgbaImage, source: PixelRect) -> Self {
        Self { image, source }
    }

    /// Pixel buffer
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Rectangle of the source frame this raster was drawn from
    pub fn source(&self) -> PixelRect {
        self.source
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Consume the sample and return its pixel buffer
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Luminance of every pixel, row-major
    pub fn luminance(&self) -> Vec<u8> {
        self.image.pixels().map(|p| luma(p.0)).collect()
    }
}

/// Luminance-weighted combination of an RGBA pixel
pub fn luma(rgba: [u8; 4]) -> u8 {
    (0.299 * rgba[0] as f32 + 0.587 * rgba[1] as f32 + 0.114 * rgba[2] as f32).round() as u8
}

/// Detection zone for one sampling tick
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DetectedRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Heuristic score (0.0 - 1.0), not a calibrated probability
    pub confidence: f32,
    pub aspect_ratio: f32,
}

impl DetectedRegion {
    pub fn from_rect(rect: PixelRect, confidence: f32) -> Self {
        let aspect_ratio = if rect.height == 0 {
            0.0
        } else {
            rect.width as f32 / rect.height as f32
        };
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            confidence: confidence.clamp(0.0, 1.0),
            aspect_ratio,
        }
    }
}
