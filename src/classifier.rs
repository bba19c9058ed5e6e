//! Colour classification of the caption region.
//!
//! Marker captions are burned in as saturated green (VFX) or orange (DI)
//! text in the top-right corner of the frame. [`FrameClassifier`] cuts that
//! corner out, converts it to HLS, masks each class's colour range, opens
//! the masks with a 3×3 square to drop isolated speckle, and counts what is
//! left.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::configuration::{HlsRange, RegionOfInterest, ScanOptions};

/// The two caption classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkerClass {
    /// Visual-effects note, green.
    #[serde(rename = "VFX")]
    Vfx,
    /// Digital-intermediate (grading) note, orange.
    #[serde(rename = "DI")]
    Di,
}

impl MarkerClass {
    /// Both classes, in the order they are evaluated per frame.
    pub const ALL: [MarkerClass; 2] = [MarkerClass::Vfx, MarkerClass::Di];

    /// The label used in text and output files.
    pub fn label(self) -> &'static str {
        match self {
            MarkerClass::Vfx => "VFX",
            MarkerClass::Di => "DI",
        }
    }

    /// The canonical text prefix, label plus colon.
    pub fn prefix(self) -> &'static str {
        match self {
            MarkerClass::Vfx => "VFX:",
            MarkerClass::Di => "DI:",
        }
    }
}

impl Display for MarkerClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.pad(self.label())
    }
}

impl FromStr for MarkerClass {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "VFX" => Ok(MarkerClass::Vfx),
            "DI" => Ok(MarkerClass::Di),
            other => Err(format!("unknown marker class '{other}'")),
        }
    }
}

/// A class whose colour is present in a frame.
#[derive(Debug, Clone)]
pub struct DetectionCandidate {
    /// Which class matched.
    pub class: MarkerClass,
    /// Mask pixels surviving the opening.
    pub pixel_score: u64,
    /// The caption region with every non-matching pixel blacked out.
    pub region: RgbImage,
}

/// Per-class pixel scores of one frame, whether or not they cleared the
/// threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassScores {
    /// Green score.
    pub vfx: u64,
    /// Orange score.
    pub di: u64,
}

impl ClassScores {
    /// The score of one class.
    pub fn get(&self, class: MarkerClass) -> u64 {
        match class {
            MarkerClass::Vfx => self.vfx,
            MarkerClass::Di => self.di,
        }
    }
}

/// Everything the classifier learned about one frame.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Raw scores for both classes.
    pub scores: ClassScores,
    /// Classes whose score exceeded the pixel threshold.
    pub candidates: Vec<DetectionCandidate>,
}

/// Turns frames into per-class colour scores.
///
/// # Example
///
/// ```
/// use image::{Rgb, RgbImage};
/// use markscan::{FrameClassifier, MarkerClass, ScanOptions};
///
/// let classifier = FrameClassifier::new(&ScanOptions::new());
/// let mut frame = RgbImage::new(640, 360);
/// for y in 0..20 {
///     for x in 500..550 {
///         frame.put_pixel(x, y, Rgb([0, 255, 0]));
///     }
/// }
///
/// let result = classifier.classify(&frame);
/// assert_eq!(result.scores.vfx, 1000);
/// assert_eq!(result.candidates[0].class, MarkerClass::Vfx);
/// ```
#[derive(Debug, Clone)]
pub struct FrameClassifier {
    options: ScanOptions,
}

impl FrameClassifier {
    /// Build a classifier from the ROI, colour ranges and pixel threshold in
    /// `options`.
    pub fn new(options: &ScanOptions) -> Self {
        Self {
            options: options.clone(),
        }
    }

    /// The caption rectangle for a frame of the given size.
    pub fn region(&self, width: u32, height: u32) -> RegionOfInterest {
        self.options.roi.region(width, height)
    }

    /// Score one frame.
    ///
    /// A candidate is produced for a class exactly when its score is
    /// strictly greater than the configured pixel threshold.
    pub fn classify(&self, frame: &RgbImage) -> Classification {
        let (width, height) = frame.dimensions();
        let roi = self.region(width, height);
        let threshold = self.options.thresholds.pixel_threshold;

        let mut classification = Classification::default();
        if roi.area() == 0 {
            return classification;
        }

        let hls: Vec<[u8; 3]> = (roi.y..roi.y + roi.height)
            .flat_map(|y| (roi.x..roi.x + roi.width).map(move |x| (x, y)))
            .map(|(x, y)| rgb_to_hls(*frame.get_pixel(x, y)))
            .collect();

        for class in MarkerClass::ALL {
            let range = match class {
                MarkerClass::Vfx => &self.options.vfx_range,
                MarkerClass::Di => &self.options.di_range,
            };
            let mask = open_mask(&color_mask(&hls, range), roi.width, roi.height);
            let pixel_score = mask.iter().filter(|&&set| set).count() as u64;

            match class {
                MarkerClass::Vfx => classification.scores.vfx = pixel_score,
                MarkerClass::Di => classification.scores.di = pixel_score,
            }

            if pixel_score > threshold {
                classification.candidates.push(DetectionCandidate {
                    class,
                    pixel_score,
                    region: masked_region(frame, &roi, &mask),
                });
            }
        }

        classification
    }
}

/// Convert an 8-bit RGB pixel to OpenCV's 8-bit HLS (H 0–180).
pub fn rgb_to_hls(pixel: Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = pixel.0.map(|channel| channel as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;
    let lightness = (max + min) / 2.0;

    let (hue, saturation) = if diff <= f32::EPSILON {
        (0.0, 0.0)
    } else {
        let saturation = if lightness < 0.5 {
            diff / (max + min)
        } else {
            diff / (2.0 - max - min)
        };
        let mut hue = if max == r {
            60.0 * (g - b) / diff
        } else if max == g {
            120.0 + 60.0 * (b - r) / diff
        } else {
            240.0 + 60.0 * (r - g) / diff
        };
        if hue < 0.0 {
            hue += 360.0;
        }
        (hue, saturation)
    };

    [
        (hue / 2.0).round().clamp(0.0, 180.0) as u8,
        (lightness * 255.0).round().clamp(0.0, 255.0) as u8,
        (saturation * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

fn color_mask(hls: &[[u8; 3]], range: &HlsRange) -> Vec<bool> {
    hls.iter().map(|&pixel| range.contains(pixel)).collect()
}

/// Morphological opening with a 3×3 square: erosion, then dilation.
///
/// Pixels outside the mask count as set during erosion and as unset during
/// dilation, so shapes touching the border are not eaten away.
fn open_mask(mask: &[bool], width: u32, height: u32) -> Vec<bool> {
    let eroded = filter_3x3(mask, width, height, Morphology::Erode);
    filter_3x3(&eroded, width, height, Morphology::Dilate)
}

#[derive(Clone, Copy)]
enum Morphology {
    Erode,
    Dilate,
}

fn filter_3x3(mask: &[bool], width: u32, height: u32, operation: Morphology) -> Vec<bool> {
    let (width, height) = (width as i64, height as i64);
    let border = matches!(operation, Morphology::Erode);
    let at = |x: i64, y: i64| {
        if x < 0 || y < 0 || x >= width || y >= height {
            border
        } else {
            mask[(y * width + x) as usize]
        }
    };

    let mut output = Vec::with_capacity(mask.len());
    for y in 0..height {
        for x in 0..width {
            let mut neighbourhood =
                (-1..=1).flat_map(|dy| (-1..=1).map(move |dx| (x + dx, y + dy)));
            let value = match operation {
                Morphology::Erode => neighbourhood.all(|(nx, ny)| at(nx, ny)),
                Morphology::Dilate => neighbourhood.any(|(nx, ny)| at(nx, ny)),
            };
            output.push(value);
        }
    }
    output
}

fn masked_region(frame: &RgbImage, roi: &RegionOfInterest, mask: &[bool]) -> RgbImage {
    RgbImage::from_fn(roi.width, roi.height, |x, y| {
        if mask[(y * roi.width + x) as usize] {
            *frame.get_pixel(roi.x + x, roi.y + y)
        } else {
            Rgb([0, 0, 0])
        }
    })
}
