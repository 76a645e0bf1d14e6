//! Image enhancement for text recognition
//!
//! Prepares the captured card for the recognition engine: crop to the
//! detection zone, optionally cut out the name line, then grayscale, contrast
//! stretch, Otsu binarization and a 2x nearest-neighbour upscale. Every step
//! allocates a new buffer; the caller's raster is never modified.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::frame::luma;
use crate::capture::{draw_from_image, CaptureZone, PixelRect, RasterSample};

/// Name line position as fractions of the card raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameRegion {
    pub x_pct: f32,
    pub y_pct: f32,
    pub width_pct: f32,
    pub height_pct: f32,
}

impl Default for NameRegion {
    fn default() -> Self {
        Self {
            x_pct: 0.05,
            y_pct: 0.03,
            width_pct: 0.75,
            height_pct: 0.08,
        }
    }
}

impl NameRegion {
    /// Pixel rectangle of the name line inside a `width` x `height` card
    pub fn rect(&self, width: u32, height: u32) -> PixelRect {
        let x = (width as f32 * self.x_pct.clamp(0.0, 1.0)) as u32;
        let y = (height as f32 * self.y_pct.clamp(0.0, 1.0)) as u32;
        let w = ((width as f32 * self.width_pct.clamp(0.0, 1.0)) as u32).max(1);
        let h = ((height as f32 * self.height_pct.clamp(0.0, 1.0)) as u32).max(1);
        PixelRect::new(x, y, w, h).clamp_to(width, height)
    }
}

/// Enhancement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Canonical card width after cropping
    pub output_width: u32,
    /// Canonical card height after cropping
    pub output_height: u32,
    /// Name line used when the full card is not passed through
    pub name_region: NameRegion,
    /// Master switch for grayscale / contrast / threshold
    pub enabled: bool,
    pub grayscale: bool,
    pub contrast_stretch: bool,
    /// Binarize with an automatic (Otsu) global threshold
    pub binarize: bool,
    /// 2x nearest-neighbour upscale after enhancement
    pub upscale: bool,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            output_width: 400,
            output_height: 560,
            name_region: NameRegion::default(),
            enabled: true,
            grayscale: true,
            contrast_stretch: true,
            binarize: true,
            upscale: false,
        }
    }
}

/// Per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceOptions {
    /// Crop a full frame to the detection zone
    pub crop_to_zone: bool,
    /// Pass the whole card through instead of only the name line
    pub use_full_card: bool,
    /// Keep a copy of every intermediate stage
    pub debug: bool,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            crop_to_zone: true,
            use_full_card: true,
            debug: false,
        }
    }
}

/// What the stage is given
#[derive(Debug, Clone, Copy)]
pub enum EnhanceInput<'a> {
    /// A full camera frame
    Frame(&'a RgbaImage),
    /// A raster already cut to the detection zone; skips the zone crop
    Card(&'a RasterSample),
}

/// Intermediate image kept in debug mode
#[derive(Debug, Clone)]
pub struct DebugStage {
    pub name: &'static str,
    pub image: RgbaImage,
}

/// Enhancement result
#[derive(Debug, Clone)]
pub struct EnhancementOutput {
    pub raster: RasterSample,
    /// Otsu threshold when binarization ran
    pub threshold: Option<u8>,
    /// Intermediate stages, empty unless debug was requested
    pub stages: Vec<DebugStage>,
}

/// Image enhancement stage
#[derive(Debug, Clone)]
pub struct EnhancementStage {
    config: EnhancementConfig,
    zone: CaptureZone,
}

impl EnhancementStage {
    pub fn new(config: EnhancementConfig, zone: CaptureZone) -> Self {
        Self { config, zone }
    }

    pub fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    /// Run the enabled steps in order
    ///
    /// Returns `None` when the input has no pixels to work with.
    pub fn process(&self, input: EnhanceInput<'_>, options: &EnhanceOptions) -> Option<EnhancementOutput> {
        let mut stages = Vec::new();
        let mut keep = |name: &'static str, image: &RgbaImage| {
            if options.debug {
                stages.push(DebugStage {
                    name,
                    image: image.clone(),
                });
            }
        };

        let (card, source) = self.crop(input, options)?;
        keep("crop", &card);

        let mut current = if options.use_full_card {
            card
        } else {
            let rect = self.config.name_region.rect(card.width(), card.height());
            let name = imageops::crop_imm(&card, rect.x, rect.y, rect.width, rect.height).to_image();
            keep("name_region", &name);
            name
        };

        let mut threshold = None;
        if self.config.enabled {
            if self.config.grayscale || self.config.binarize {
                current = to_grayscale(&current);
                keep("grayscale", &current);
            }
            if self.config.contrast_stretch {
                current = stretch_contrast(&current);
                keep("contrast", &current);
            }
            if self.config.binarize {
                let t = otsu_threshold(&luminance_histogram(&current));
                current = binarize(&current, t);
                keep("binarize", &current);
                threshold = Some(t);
            }
        }

        if self.config.upscale {
            current = upscale_nearest(&current, 2);
            keep("upscale", &current);
        }

        debug!(
            "Enhanced {}x{} raster (full_card={}, threshold={:?})",
            current.width(),
            current.height(),
            options.use_full_card,
            threshold
        );

        Some(EnhancementOutput {
            raster: RasterSample::new(current, source),
            threshold,
            stages,
        })
    }

    /// Crop to the zone and scale to the canonical card size
    fn crop(&self, input: EnhanceInput<'_>, options: &EnhanceOptions) -> Option<(RgbaImage, PixelRect)> {
        let (out_w, out_h) = (self.config.output_width, self.config.output_height);

        match input {
            EnhanceInput::Frame(frame) => {
                let (w, h) = frame.dimensions();
                if options.crop_to_zone {
                    let rect = self.zone.rect(w, h)?;
                    let card = draw_from_image(frame, rect, out_w, out_h)?;
                    Some((card, rect))
                } else if w == 0 || h == 0 {
                    None
                } else {
                    Some((frame.clone(), PixelRect::new(0, 0, w, h)))
                }
            }
            EnhanceInput::Card(raster) => {
                if raster.is_empty() || out_w == 0 || out_h == 0 {
                    return None;
                }
                let card = if raster.image().dimensions() == (out_w, out_h) {
                    raster.image().clone()
                } else {
                    imageops::resize(raster.image(), out_w, out_h, FilterType::Triangle)
                };
                Some((card, raster.source()))
            }
        }
    }
}

/// 256-bin luminance histogram
pub fn luminance_histogram(image: &RgbaImage) -> [u32; 256] {
    let mut histogram = [0u32; 256];
    for pixel in image.pixels() {
        histogram[luma(pixel.0) as usize] += 1;
    }
    histogram
}

/// Otsu's global threshold
///
/// For every candidate threshold `t` the pixels `<= t` form the background
/// class. The threshold maximizing `wB * wF * (mB - mF)^2` wins; ties keep the
/// lowest `t`. An empty histogram yields 128.
pub fn otsu_threshold(histogram: &[u32; 256]) -> u8 {
    let total: f64 = histogram.iter().map(|&c| c as f64).sum();
    if total == 0.0 {
        return 128;
    }

    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;
    let mut best_variance = 0.0f64;
    let mut best_threshold = 0u8;

    for (t, &count) in histogram.iter().enumerate() {
        weight_bg += count as f64;
        if weight_bg == 0.0 {
            continue;
        }

        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }

        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;

        let between = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if between > best_variance {
            best_variance = between;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

/// Luminance-weighted grayscale, kept in RGBA layout
fn to_grayscale(image: &RgbaImage) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let g = luma(pixel.0);
        *pixel = Rgba([g, g, g, pixel.0[3]]);
    }
    out
}

/// Linear stretch of the luminance range onto 0..255
fn stretch_contrast(image: &RgbaImage) -> RgbaImage {
    let (min, max) = image.pixels().fold((u8::MAX, u8::MIN), |(lo, hi), p| {
        let v = luma(p.0);
        (lo.min(v), hi.max(v))
    });

    let mut out = image.clone();
    if max <= min {
        return out;
    }

    let range = (max - min) as f32;
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            let v = pixel.0[c].clamp(min, max);
            pixel.0[c] = (((v - min) as f32 / range) * 255.0).round() as u8;
        }
    }
    out
}

/// Pixels brighter than `threshold` become white, the rest black
fn binarize(image: &RgbaImage, threshold: u8) -> RgbaImage {
    let gray = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([luma(image.get_pixel(x, y).0)])
    });
    let binary: GrayImage = imageproc::map::map_colors(&gray, |p| {
        if p[0] > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });
    DynamicImage::ImageLuma8(binary).to_rgba8()
}

/// Integer nearest-neighbour upscale, no smoothing
fn upscale_nearest(image: &RgbaImage, factor: u32) -> RgbaImage {
    if factor <= 1 {
        return image.clone();
    }
    imageops::resize(
        image,
        image.width() * factor,
        image.height() * factor,
        FilterType::Nearest,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> RgbaImage {
        RgbaImage::from_fn(1000, 800, |x, y| {
            let v = ((x + y) % 200) as u8 + 20;
            Rgba([v, v / 2, 255 - v, 255])
        })
    }

    #[test]
    fn test_otsu_bimodal_between_modes() {
        // 40% of pixels around 20, 60% around 220
        let mut histogram = [0u32; 256];
        for v in 15..=25 {
            histogram[v] = 400;
        }
        for v in 215..=225 {
            histogram[v] = 600;
        }

        let t = otsu_threshold(&histogram);
        assert!(t > 20 && t < 220, "threshold {}", t);
    }

    #[test]
    fn test_otsu_two_spikes_picks_first_maximum() {
        let mut histogram = [0u32; 256];
        histogram[20] = 40;
        histogram[220] = 60;
        // Variance is flat on 20..220; the first maximum is kept
        assert_eq!(otsu_threshold(&histogram), 20);
    }

    #[test]
    fn test_otsu_empty_histogram() {
        assert_eq!(otsu_threshold(&[0u32; 256]), 128);
    }

    #[test]
    fn test_otsu_single_value() {
        let mut histogram = [0u32; 256];
        histogram[77] = 10;
        assert_eq!(otsu_threshold(&histogram), 0);
    }

    #[test]
    fn test_full_card_canonical_size() {
        let stage = EnhancementStage::new(EnhancementConfig::default(), CaptureZone::default());
        let frame = frame();
        let out = stage
            .process(EnhanceInput::Frame(&frame), &EnhanceOptions::default())
            .unwrap();

        assert_eq!((out.raster.width(), out.raster.height()), (400, 560));
        assert_eq!(out.raster.source(), CaptureZone::default().rect(1000, 800).unwrap());
        assert!(out.threshold.is_some());
        assert!(out.stages.is_empty());
    }

    #[test]
    fn test_binarized_output_is_black_and_white() {
        let stage = EnhancementStage::new(EnhancementConfig::default(), CaptureZone::default());
        let frame = frame();
        let out = stage
            .process(EnhanceInput::Frame(&frame), &EnhanceOptions::default())
            .unwrap();

        assert!(out
            .raster
            .image()
            .pixels()
            .all(|p| (p.0[0] == 0 || p.0[0] == 255) && p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn test_name_region_with_upscale() {
        let config = EnhancementConfig {
            upscale: true,
            ..EnhancementConfig::default()
        };
        let stage = EnhancementStage::new(config, CaptureZone::default());
        let options = EnhanceOptions {
            use_full_card: false,
            ..EnhanceOptions::default()
        };
        let frame = frame();
        let out = stage.process(EnhanceInput::Frame(&frame), &options).unwrap();

        let name = NameRegion::default().rect(400, 560);
        assert_eq!(
            (out.raster.width(), out.raster.height()),
            (name.width * 2, name.height * 2)
        );
    }

    #[test]
    fn test_disabled_enhancement_is_pass_through() {
        let config = EnhancementConfig {
            enabled: false,
            ..EnhancementConfig::default()
        };
        let stage = EnhancementStage::new(config, CaptureZone::default());
        let card = RasterSample::new(
            RgbaImage::from_pixel(400, 560, Rgba([10, 200, 30, 255])),
            PixelRect::new(5, 5, 400, 560),
        );

        let out = stage
            .process(EnhanceInput::Card(&card), &EnhanceOptions::default())
            .unwrap();
        assert_eq!(out.raster.image(), card.image());
        assert_eq!(out.raster.source(), card.source());
        assert!(out.threshold.is_none());
    }

    #[test]
    fn test_card_input_is_scaled_not_cropped() {
        let stage = EnhancementStage::new(EnhancementConfig::default(), CaptureZone::default());
        let card = RasterSample::new(RgbaImage::new(300, 420), PixelRect::new(0, 0, 300, 420));
        let out = stage
            .process(EnhanceInput::Card(&card), &EnhanceOptions::default())
            .unwrap();
        assert_eq!((out.raster.width(), out.raster.height()), (400, 560));
    }

    #[test]
    fn test_source_is_not_modified() {
        let stage = EnhancementStage::new(EnhancementConfig::default(), CaptureZone::default());
        let card = RasterSample::new(
            RgbaImage::from_fn(400, 560, |x, _| Rgba([(x % 256) as u8, 50, 100, 255])),
            PixelRect::new(0, 0, 400, 560),
        );
        let before = card.image().clone();
        let _ = stage.process(EnhanceInput::Card(&card), &EnhanceOptions::default());
        assert_eq!(card.image(), &before);
    }

    #[test]
    fn test_debug_keeps_every_stage() {
        let config = EnhancementConfig {
            upscale: true,
            ..EnhancementConfig::default()
        };
        let stage = EnhancementStage::new(config, CaptureZone::default());
        let options = EnhanceOptions {
            use_full_card: false,
            debug: true,
            ..EnhanceOptions::default()
        };
        let frame = frame();
        let out = stage.process(EnhanceInput::Frame(&frame), &options).unwrap();

        let names: Vec<_> = out.stages.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["crop", "name_region", "grayscale", "contrast", "binarize", "upscale"]
        );
    }

    #[test]
    fn test_empty_frame_yields_nothing() {
        let stage = EnhancementStage::new(EnhancementConfig::default(), CaptureZone::default());
        let empty = RgbaImage::new(0, 0);
        assert!(stage
            .process(EnhanceInput::Frame(&empty), &EnhanceOptions::default())
            .is_none());
    }

    #[test]
    fn test_stretch_contrast_range() {
        let image = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([100, 100, 100, 255])
            } else {
                Rgba([150, 150, 150, 255])
            }
        });
        let out = stretch_contrast(&image);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 255);
    }
}
