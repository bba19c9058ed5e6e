//! Recognition tasks.
//!
//! A task is the hand-off between the sequential preprocessing walk and the
//! recognition workers. It is plain data: the region travels as PNG bytes so
//! a task can be serialized, queued or sent to another process without any
//! live image handle.

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{classifier::MarkerClass, error::ScanError};

/// One caption region waiting for recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionTask {
    /// Frame the region was cut from.
    pub frame_index: u64,
    /// `HH:MM:SS:FF` of that frame.
    pub timecode: String,
    /// Which colour fired.
    pub class: MarkerClass,
    /// The (possibly colour-corrected) region, PNG-encoded.
    pub region_png: Vec<u8>,
    /// Region dimensions as `(width, height)`.
    pub region_size: (u32, u32),
    /// Classifier score that fired the trigger.
    pub pixel_score: u64,
}

impl RecognitionTask {
    /// Encode `region` and wrap it in a task.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::EncodeError`] if PNG encoding fails.
    pub fn new(
        frame_index: u64,
        timecode: String,
        class: MarkerClass,
        region: &RgbImage,
        pixel_score: u64,
    ) -> Result<Self, ScanError> {
        let mut region_png = Vec::new();
        region
            .write_to(&mut Cursor::new(&mut region_png), ImageFormat::Png)
            .map_err(|error| ScanError::EncodeError {
                frame_index,
                reason: error.to_string(),
            })?;

        Ok(Self {
            frame_index,
            timecode,
            class,
            region_png,
            region_size: region.dimensions(),
            pixel_score,
        })
    }

    /// Decode the region back to pixels.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::ImageError`] if the bytes are not a valid PNG.
    pub fn decode_region(&self) -> Result<RgbImage, ScanError> {
        let image = image::load_from_memory_with_format(&self.region_png, ImageFormat::Png)?;
        Ok(image.to_rgb8())
    }
}
