//! Frame source implementations

use image::RgbaImage;
use parking_lot::RwLock;
use std::sync::Arc;

use super::frame::{CapturedFrame, PixelRect};
use super::{draw_from_image, FrameSource};

/// A frame source that always returns the same image
///
/// Used for scanning still photos and in tests.
#[derive(Debug, Clone)]
pub struct StillFrameSource {
    image: Arc<RgbaImage>,
}

impl StillFrameSource {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Load an image file as a still frame
    pub fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let image = image::open(path)?.to_rgba8();
        Ok(Self::new(image))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

impl FrameSource for StillFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn draw_region(&self, rect: PixelRect, out_width: u32, out_height: u32) -> Option<RgbaImage> {
        draw_from_image(&self.image, rect, out_width, out_height)
    }
}

/// Holds the latest frame pushed by an external capture thread
///
/// The capture device writes with [`SharedFrameSource::push`]; the sampler
/// reads whatever frame is newest at tick time.
#[derive(Debug, Default)]
pub struct SharedFrameSource {
    latest: RwLock<Option<CapturedFrame>>,
}

impl SharedFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    pub fn push(&self, frame: CapturedFrame) {
        *self.latest.write() = Some(frame);
    }

    /// Drop the current frame, e.g. when the camera is released
    pub fn clear(&self) {
        *self.latest.write() = None;
    }

    /// Snapshot of the newest frame
    pub fn latest(&self) -> Option<CapturedFrame> {
        self.latest.read().clone()
    }
}

impl FrameSource for SharedFrameSource {
    fn dimensions(&self) -> (u32, u32) {
        self.latest
            .read()
            .as_ref()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0))
    }

    fn draw_region(&self, rect: PixelRect, out_width: u32, out_height: u32) -> Option<RgbaImage> {
        // Clone the Arc so the lock is not held while scaling
        let image = self.latest.read().as_ref().map(|f| f.image.clone())?;
        draw_from_image(&image, rect, out_width, out_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_shared_source_push_and_clear() {
        let source = SharedFrameSource::new();
        assert_eq!(source.dimensions(), (0, 0));

        source.push(CapturedFrame::new(RgbaImage::from_pixel(4, 3, Rgba([9, 9, 9, 255]))));
        assert_eq!(source.dimensions(), (4, 3));
        let drawn = source.draw_region(PixelRect::new(0, 0, 4, 3), 2, 2).unwrap();
        assert_eq!(drawn.dimensions(), (2, 2));

        source.clear();
        assert!(source.latest().is_none());
        assert!(source.draw_region(PixelRect::new(0, 0, 4, 3), 2, 2).is_none());
    }

    #[test]
    fn test_still_source_out_of_bounds_rect() {
        let source = StillFrameSource::new(RgbaImage::new(10, 10));
        assert!(source.draw_region(PixelRect::new(20, 20, 5, 5), 5, 5).is_none());
    }
}
