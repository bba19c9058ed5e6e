//! Video stream metadata.
//!
//! [`VideoInfo`] is read once when a [`FrameSource`](crate::FrameSource) is
//! opened and stays fixed for the lifetime of the scan. Everything that
//! depends on geometry or timing (the ROI rectangle, timecodes, the forced
//! re-check interval) is derived from it.

use std::time::Duration;

use serde::Serialize;

/// Frame rate used when the container does not report one.
pub const DEFAULT_FRAMES_PER_SECOND: f64 = 25.0;

/// Metadata for the video stream being scanned.
///
/// # Example
///
/// ```
/// use markscan::VideoInfo;
///
/// let info = VideoInfo::new(1920, 1080, 25.0, 250);
/// assert_eq!(info.duration.as_secs(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second (may be approximate for variable-frame-rate content).
    pub frames_per_second: f64,
    /// Total number of frames, as reported or estimated at open time.
    pub frame_count: u64,
    /// Total duration, computed from frame count and frame rate.
    pub duration: Duration,
}

impl VideoInfo {
    /// Build metadata from raw stream values.
    ///
    /// A non-positive or non-finite frame rate falls back to
    /// [`DEFAULT_FRAMES_PER_SECOND`].
    pub fn new(width: u32, height: u32, frames_per_second: f64, frame_count: u64) -> Self {
        let frames_per_second = if frames_per_second.is_finite() && frames_per_second > 0.0 {
            frames_per_second
        } else {
            DEFAULT_FRAMES_PER_SECOND
        };
        let duration = Duration::from_secs_f64(frame_count as f64 / frames_per_second);
        Self {
            width,
            height,
            frames_per_second,
            frame_count,
            duration,
        }
    }

    /// Number of frames covering `seconds` of video, truncated.
    pub fn frames_in(&self, seconds: f64) -> u64 {
        (seconds * self.frames_per_second) as u64
    }
}
