//! Error types for the `markscan` crate.
//!
//! This module defines [`ScanError`], the unified error type returned by all
//! fallible operations in the crate. Only the errors that invalidate a whole
//! scan (an unopenable source, an unusable time range) ever reach the caller
//! of [`Scanner::run`](crate::Scanner::run); per-frame, per-task and
//! per-batch failures are logged and dropped where they happen.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// The unified error type for all `markscan` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScanError {
    /// The video file could not be opened.
    #[error("Failed to open video file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::VideoFile::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// A time string matched none of the accepted layouts.
    #[error("Invalid time format: {0} (expected HH:MM:SS:FF, HH:MM:SS, MM:SS or SS)")]
    InvalidTimeFormat(String),

    /// The resolved scan range is empty.
    #[error("Invalid range: start ({start}) must be less than end ({end})")]
    InvalidRange {
        /// The start of the range.
        start: String,
        /// The end of the range.
        end: String,
    },

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while encoding or decoding a region.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// A region could not be encoded for recognition.
    #[error("Failed to encode region for frame {frame_index}: {reason}")]
    EncodeError {
        /// Frame the region was cut from.
        frame_index: u64,
        /// Underlying reason.
        reason: String,
    },

    /// A colour look-up table could not be loaded or applied.
    #[error("LUT error: {0}")]
    LutError(String),

    /// The recognition engine failed on a single task or batch.
    #[error("Recognition failed: {0}")]
    RecognitionError(String),

    /// The configured recognition engine is not installed.
    #[error("Recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A CSV event log could not be parsed.
    #[error("CSV error on line {line}: {reason}")]
    CsvError {
        /// 1-based line number in the file.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// JSON serialization or parsing failed.
    #[error("JSON error: {0}")]
    JsonError(#[from] JsonError),

    /// The marker sink rejected an operation.
    #[error("Marker error: {0}")]
    MarkerError(String),
}

impl From<FfmpegError> for ScanError {
    fn from(error: FfmpegError) -> Self {
        ScanError::FfmpegError(error.to_string())
    }
}
