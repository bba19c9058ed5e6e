//! Colour look-up tables applied to caption regions before recognition.
//!
//! Review copies are often delivered in a log colour space where the caption
//! colours are washed out. A 3D LUT in Adobe/Resolve `.cube` format can be
//! applied to each extracted region so the recogniser sees display-referred
//! colours. A LUT that is missing or unreadable is a degraded condition, not
//! an error: the scan continues without it.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{Rgb, RgbImage};

use crate::error::ScanError;

/// An image-to-image colour transform.
pub trait ColorTransform: Send + Sync {
    /// Transform one region. The output has the same dimensions.
    fn apply(&self, image: &RgbImage) -> Result<RgbImage, ScanError>;
}

/// A 3D `.cube` LUT sampled with trilinear interpolation.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeLut {
    title: Option<String>,
    size: usize,
    domain_min: [f32; 3],
    domain_max: [f32; 3],
    /// Entries with red varying fastest, then green, then blue.
    table: Vec<[f32; 3]>,
}

impl CubeLut {
    /// Read and parse a `.cube` file.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::IoError`] if the file cannot be read and
    /// [`ScanError::LutError`] if it is not a valid 3D cube.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Parse `.cube` text.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::LutError`] for a missing or unsupported size,
    /// a malformed line, or a table whose length is not `size³`.
    pub fn parse(text: &str) -> Result<Self, ScanError> {
        let mut title = None;
        let mut size = None;
        let mut domain_min = [0.0; 3];
        let mut domain_max = [1.0; 3];
        let mut table = Vec::new();

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let bad_line = |reason: &str| ScanError::LutError(format!("line {}: {reason}", number + 1));

            let mut fields = line.split_whitespace();
            let Some(keyword) = fields.next() else {
                continue;
            };
            match keyword {
                "TITLE" => {
                    title = Some(line["TITLE".len()..].trim().trim_matches('"').to_string());
                }
                "LUT_3D_SIZE" => {
                    let value = fields
                        .next()
                        .and_then(|field| field.parse::<usize>().ok())
                        .filter(|&value| (2..=256).contains(&value))
                        .ok_or_else(|| bad_line("LUT_3D_SIZE must be between 2 and 256"))?;
                    size = Some(value);
                }
                "LUT_1D_SIZE" => return Err(bad_line("1D LUTs are not supported")),
                "DOMAIN_MIN" => domain_min = parse_triple(line, 1).ok_or_else(|| bad_line("bad DOMAIN_MIN"))?,
                "DOMAIN_MAX" => domain_max = parse_triple(line, 1).ok_or_else(|| bad_line("bad DOMAIN_MAX"))?,
                _ if keyword.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') => {
                    table.push(parse_triple(line, 0).ok_or_else(|| bad_line("expected three numbers"))?);
                }
                // Vendor keywords such as LUT_IN_VIDEO_RANGE are ignored.
                _ => {}
            }
        }

        let size = size.ok_or_else(|| ScanError::LutError("missing LUT_3D_SIZE".to_string()))?;
        if table.len() != size * size * size {
            return Err(ScanError::LutError(format!(
                "expected {} entries for size {size}, found {}",
                size * size * size,
                table.len()
            )));
        }

        Ok(Self {
            title,
            size,
            domain_min,
            domain_max,
            table,
        })
    }

    /// The identity LUT of the given edge size.
    pub fn identity(size: usize) -> Self {
        let size = size.max(2);
        let step = 1.0 / (size - 1) as f32;
        let mut table = Vec::with_capacity(size * size * size);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    table.push([r as f32 * step, g as f32 * step, b as f32 * step]);
                }
            }
        }
        Self {
            title: None,
            size,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            table,
        }
    }

    /// Optional `TITLE` from the file.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Edge length of the cube.
    pub fn size(&self) -> usize {
        self.size
    }

    fn entry(&self, r: usize, g: usize, b: usize) -> [f32; 3] {
        self.table[(b * self.size + g) * self.size + r]
    }

    /// Map one normalised RGB triple through the cube.
    pub fn sample(&self, rgb: [f32; 3]) -> [f32; 3] {
        let last = (self.size - 1) as f32;
        let mut base = [0usize; 3];
        let mut fraction = [0.0f32; 3];
        for channel in 0..3 {
            let span = (self.domain_max[channel] - self.domain_min[channel]).max(f32::EPSILON);
            let position = ((rgb[channel] - self.domain_min[channel]) / span).clamp(0.0, 1.0) * last;
            let lower = (position.floor() as usize).min(self.size - 2);
            base[channel] = lower;
            fraction[channel] = position - lower as f32;
        }

        let mut output = [0.0f32; 3];
        for corner in 0..8usize {
            let offset = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            let weight: f32 = (0..3)
                .map(|c| if offset[c] == 1 { fraction[c] } else { 1.0 - fraction[c] })
                .product();
            if weight == 0.0 {
                continue;
            }
            let value = self.entry(base[0] + offset[0], base[1] + offset[1], base[2] + offset[2]);
            for c in 0..3 {
                output[c] += value[c] * weight;
            }
        }
        output
    }
}

impl ColorTransform for CubeLut {
    fn apply(&self, image: &RgbImage) -> Result<RgbImage, ScanError> {
        let mut output = image.clone();
        for pixel in output.pixels_mut() {
            let mapped = self.sample(pixel.0.map(|channel| channel as f32 / 255.0));
            *pixel = Rgb(mapped.map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8));
        }
        Ok(output)
    }
}

fn parse_triple(line: &str, skip: usize) -> Option<[f32; 3]> {
    let mut values = line.split_whitespace().skip(skip).map(|field| field.parse::<f32>());
    let triple = [values.next()?.ok()?, values.next()?.ok()?, values.next()?.ok()?];
    values.next().is_none().then_some(triple)
}

/// Load the LUT at `path`, or nothing.
///
/// A missing file or a file that fails to parse is logged as a warning and
/// yields `None`, so the scan proceeds on uncorrected regions.
pub fn load_color_transform(path: Option<&Path>) -> Option<Arc<dyn ColorTransform>> {
    let path = path?;
    if !path.exists() {
        log::warn!("LUT file not found: {}; continuing without colour correction", path.display());
        return None;
    }
    match CubeLut::open(path) {
        Ok(lut) => {
            log::info!(
                "Loaded {}-point LUT {}",
                lut.size(),
                lut.title().map_or_else(|| display_name(path), str::to_string)
            );
            Some(Arc::new(lut))
        }
        Err(error) => {
            log::warn!("Could not load LUT {}: {error}; continuing without colour correction", path.display());
            None
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
