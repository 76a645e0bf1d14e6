//! Card presence classification
//!
//! Decides whether a card-like object occupies the detection zone using
//! three pixel statistics over the downscaled sample. There is no ground-truth
//! card boundary, so the decision is heuristic and every threshold comes from
//! configuration.

use serde::{Deserialize, Serialize};

use crate::capture::RasterSample;

/// A threshold pair: `enter` applies while nothing is detected, `stay` once a
/// card was detected on the previous tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hysteresis {
    pub enter: f32,
    pub stay: f32,
}

impl Hysteresis {
    pub const fn new(enter: f32, stay: f32) -> Self {
        Self { enter, stay }
    }

    /// Threshold to compare against given the previous decision
    pub fn threshold(&self, was_detecting: bool) -> f32 {
        if was_detecting {
            self.stay
        } else {
            self.enter
        }
    }
}

/// Presence classifier thresholds and sampling geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceThresholds {
    /// Mean border step (luminance levels)
    pub edge: Hysteresis,
    /// Max-min luminance inside the title band
    pub title_contrast: Hysteresis,
    /// Variance of per-row mean luminance
    pub structure_variance: Hysteresis,
    /// Distance of the outer sample line from each border (pixels)
    pub edge_inset: u32,
    /// Distance between the outer and inner sample lines (pixels)
    pub edge_offset: u32,
    /// Top of the title band as a fraction of the sample height
    pub title_band_top: f32,
    /// Bottom of the title band as a fraction of the sample height
    pub title_band_bottom: f32,
    /// Side margin excluded from the title band (fraction of the width)
    pub title_side_margin: f32,
}

impl Default for PresenceThresholds {
    fn default() -> Self {
        Self {
            edge: Hysteresis::new(12.0, 8.0),
            title_contrast: Hysteresis::new(60.0, 45.0),
            structure_variance: Hysteresis::new(150.0, 100.0),
            edge_inset: 2,
            edge_offset: 6,
            title_band_top: 0.05,
            title_band_bottom: 0.15,
            title_side_margin: 0.10,
        }
    }
}

/// Raw statistics computed over one sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PresenceScores {
    pub edge: f32,
    pub title_contrast: f32,
    pub structure_variance: f32,
}

/// Classifier verdict with the scores that produced it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresenceAssessment {
    pub scores: PresenceScores,
    pub present: bool,
    /// Heuristic 0..1 score used for display
    pub confidence: f32,
}

/// Luminance plane of a sample
struct LumaPlane {
    width: usize,
    height: usize,
    values: Vec<u8>,
}

impl LumaPlane {
    fn from_sample(sample: &RasterSample) -> Self {
        Self {
            width: sample.width() as usize,
            height: sample.height() as usize,
            values: sample.luminance(),
        }
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x] as f32
    }
}

/// Compute the three presence statistics
pub fn compute_scores(sample: &RasterSample, thresholds: &PresenceThresholds) -> PresenceScores {
    if sample.is_empty() {
        return PresenceScores::default();
    }

    let plane = LumaPlane::from_sample(sample);
    PresenceScores {
        edge: edge_score(&plane, thresholds.edge_inset as usize, thresholds.edge_offset as usize),
        title_contrast: title_contrast(&plane, thresholds),
        structure_variance: structure_variance(&plane),
    }
}

/// Apply the decision rule to precomputed scores
pub fn decide(scores: &PresenceScores, was_detecting: bool, thresholds: &PresenceThresholds) -> bool {
    let has_edges = scores.edge > thresholds.edge.threshold(was_detecting);
    let has_title = scores.title_contrast > thresholds.title_contrast.threshold(was_detecting);
    let has_structure =
        scores.structure_variance > thresholds.structure_variance.threshold(was_detecting);

    has_edges && (has_title || has_structure)
}

/// Whether a card-like object occupies the sample
pub fn classify(sample: &RasterSample, was_detecting: bool, thresholds: &PresenceThresholds) -> bool {
    assess(sample, was_detecting, thresholds).present
}

/// Classify and keep the scores for logging and display
pub fn assess(
    sample: &RasterSample,
    was_detecting: bool,
    thresholds: &PresenceThresholds,
) -> PresenceAssessment {
    let scores = compute_scores(sample, thresholds);
    let present = decide(&scores, was_detecting, thresholds);

    let ratio = |score: f32, h: &Hysteresis| {
        if h.enter <= 0.0 {
            1.0
        } else {
            (score / h.enter).min(1.0)
        }
    };
    let edge = ratio(scores.edge, &thresholds.edge);
    let content = ratio(scores.title_contrast, &thresholds.title_contrast)
        .max(ratio(scores.structure_variance, &thresholds.structure_variance));

    PresenceAssessment {
        scores,
        present,
        confidence: 0.5 * edge + 0.5 * content,
    }
}

/// Mean absolute difference between border pixels and pixels further inward
fn edge_score(plane: &LumaPlane, inset: usize, offset: usize) -> f32 {
    let (w, h) = (plane.width, plane.height);
    if w <= 2 * (inset + offset) || h <= 2 * (inset + offset) {
        return 0.0;
    }

    let mut total = 0.0f32;
    let mut count = 0usize;

    for x in inset..(w - inset) {
        // Top and bottom borders
        total += (plane.at(x, inset) - plane.at(x, inset + offset)).abs();
        total += (plane.at(x, h - 1 - inset) - plane.at(x, h - 1 - inset - offset)).abs();
        count += 2;
    }

    for y in inset..(h - inset) {
        // Left and right borders
        total += (plane.at(inset, y) - plane.at(inset + offset, y)).abs();
        total += (plane.at(w - 1 - inset, y) - plane.at(w - 1 - inset - offset, y)).abs();
        count += 2;
    }

    if count == 0 {
        0.0
    } else {
        total / count as f32
    }
}

/// Max minus min luminance inside the title band
fn title_contrast(plane: &LumaPlane, thresholds: &PresenceThresholds) -> f32 {
    let (w, h) = (plane.width, plane.height);

    let top = ((h as f32 * thresholds.title_band_top.clamp(0.0, 1.0)) as usize).min(h - 1);
    let bottom = ((h as f32 * thresholds.title_band_bottom.clamp(0.0, 1.0)).ceil() as usize)
        .clamp(top + 1, h);
    let margin = (w as f32 * thresholds.title_side_margin.clamp(0.0, 0.49)) as usize;
    let (left, right) = (margin, w - margin);
    if left >= right {
        return 0.0;
    }

    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for y in top..bottom {
        for x in left..right {
            let v = plane.values[y * w + x];
            min = min.min(v);
            max = max.max(v);
        }
    }

    max.saturating_sub(min) as f32
}

/// Variance of per-row mean luminance over the full height
fn structure_variance(plane: &LumaPlane) -> f32 {
    let w = plane.width;
    let row_means: Vec<f64> = plane
        .values
        .chunks_exact(w)
        .map(|row| row.iter().map(|&v| v as f64).sum::<f64>() / w as f64)
        .collect();

    if row_means.len() < 2 {
        return 0.0;
    }

    let n = row_means.len() as f64;
    let mean = row_means.iter().sum::<f64>() / n;
    let variance = row_means.iter().map(|m| (m - mean) * (m - mean)).sum::<f64>() / n;
    variance as f32
}

/// Mean absolute luminance difference between two equally sized samples
///
/// `None` when the samples differ in size or are empty.
pub fn frame_difference(previous: &[u8], current: &[u8]) -> Option<f32> {
    if previous.is_empty() || previous.len() != current.len() {
        return None;
    }

    let total: u64 = previous
        .iter()
        .zip(current)
        .map(|(&a, &b)| (a as i16 - b as i16).unsigned_abs() as u64)
        .sum();
    Some(total as f32 / previous.len() as f32)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::capture::PixelRect;
    use image::{Rgba, RgbaImage};

    fn gray(v: u8) -> Rgba<u8> {
        Rgba([v, v, v, 255])
    }

    /// Synthetic 100x140 sample of a dark-framed card on a light table
    pub(crate) fn card_sample() -> RasterSample {
        let mut img = RgbaImage::from_pixel(100, 140, gray(235));
        for y in 5..135 {
            for x in 5..95 {
                img.put_pixel(x, y, gray(25));
            }
        }
        // Title bar with "text"
        for y in 8..20 {
            for x in 10..90 {
                img.put_pixel(x, y, if x % 3 == 0 { gray(25) } else { gray(240) });
            }
        }
        // Rules text box
        for y in 90..130 {
            for x in 10..90 {
                img.put_pixel(x, y, gray(210));
            }
        }
        RasterSample::new(img, PixelRect::new(0, 0, 100, 140))
    }

    pub(crate) fn empty_sample() -> RasterSample {
        RasterSample::new(
            RgbaImage::from_pixel(100, 140, gray(128)),
            PixelRect::new(0, 0, 100, 140),
        )
    }

    #[test]
    fn test_card_is_present() {
        let thresholds = PresenceThresholds::default();
        let assessment = assess(&card_sample(), false, &thresholds);
        assert!(assessment.present, "scores: {:?}", assessment.scores);
        assert!(assessment.scores.edge > 100.0);
        assert!(assessment.scores.title_contrast > 200.0);
        assert!(assessment.confidence > 0.99);
    }

    #[test]
    fn test_flat_surface_is_absent() {
        let thresholds = PresenceThresholds::default();
        let assessment = assess(&empty_sample(), true, &thresholds);
        assert!(!assessment.present);
        assert_eq!(assessment.scores.edge, 0.0);
        assert_eq!(assessment.scores.title_contrast, 0.0);
        assert_eq!(assessment.scores.structure_variance, 0.0);
    }

    #[test]
    fn test_edges_alone_are_not_enough() {
        let thresholds = PresenceThresholds::default();
        let scores = PresenceScores {
            edge: 200.0,
            title_contrast: 0.0,
            structure_variance: 0.0,
        };
        assert!(!decide(&scores, false, &thresholds));
    }

    #[test]
    fn test_hysteresis_band() {
        let thresholds = PresenceThresholds::default();
        // Between stay and enter for every statistic
        let scores = PresenceScores {
            edge: 10.0,
            title_contrast: 50.0,
            structure_variance: 120.0,
        };
        assert!(!decide(&scores, false, &thresholds));
        assert!(decide(&scores, true, &thresholds));
    }

    #[test]
    fn test_degenerate_samples_never_panic() {
        let thresholds = PresenceThresholds::default();
        for (w, h) in [(0, 0), (1, 1), (3, 200), (200, 3), (16, 16)] {
            let sample = RasterSample::new(RgbaImage::new(w, h), PixelRect::new(0, 0, w, h));
            assert!(!classify(&sample, false, &thresholds));
        }
    }

    #[test]
    fn test_frame_difference() {
        assert_eq!(frame_difference(&[10, 20], &[10, 20]), Some(0.0));
        assert_eq!(frame_difference(&[0, 100], &[50, 50]), Some(50.0));
        assert_eq!(frame_difference(&[1, 2, 3], &[1, 2]), None);
        assert_eq!(frame_difference(&[], &[]), None);
    }
}
