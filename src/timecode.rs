//! Frame index and timecode conversions.
//!
//! Scan bounds are given as human time strings and resolved to frame indices
//! against the video's frame rate. Output events carry an SMPTE-style
//! `HH:MM:SS:FF` timecode derived from their frame index.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::Range,
};

use crate::{error::ScanError, metadata::VideoInfo};

/// An `HH:MM:SS:FF` timecode.
///
/// # Example
///
/// ```
/// use markscan::Timecode;
///
/// let timecode = Timecode::from_frame(3_761, 25.0);
/// assert_eq!(timecode.to_string(), "00:02:30:11");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    /// Whole hours.
    pub hours: u64,
    /// Minutes within the hour.
    pub minutes: u64,
    /// Seconds within the minute.
    pub seconds: u64,
    /// Frames within the second.
    pub frames: u64,
}

impl Timecode {
    /// Compute the timecode of `frame_index` at `frames_per_second`.
    ///
    /// The frame field is rounded from the fractional second and capped at
    /// the last frame of a second, so fractional rates such as 29.97 never
    /// produce a frame field equal to the nominal rate.
    pub fn from_frame(frame_index: u64, frames_per_second: f64) -> Self {
        let total_seconds = frame_index as f64 / frames_per_second;
        let whole_seconds = total_seconds.floor();
        let last_frame = (frames_per_second.ceil() as u64).saturating_sub(1);
        let frames = (((total_seconds - whole_seconds) * frames_per_second).round() as u64)
            .min(last_frame);
        let whole_seconds = whole_seconds as u64;

        Self {
            hours: whole_seconds / 3600,
            minutes: (whole_seconds % 3600) / 60,
            seconds: whole_seconds % 60,
            frames,
        }
    }
}

impl Display for Timecode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{:02}:{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

/// Format `frame_index` as an `HH:MM:SS:FF` string.
pub fn frame_to_timecode(frame_index: u64, frames_per_second: f64) -> String {
    Timecode::from_frame(frame_index, frames_per_second).to_string()
}

/// Convert a time string to a frame index.
///
/// Accepted layouts are `HH:MM:SS:FF`, `HH:MM:SS`, `MM:SS` and `SS`, all
/// made of non-negative integers. The result is
/// `floor(total_seconds × fps)`, plus the frame field when one is given.
///
/// # Errors
///
/// Returns [`ScanError::InvalidTimeFormat`] for any other layout, for a
/// field that is not a non-negative integer, or for a time too large to
/// express as a frame index.
///
/// # Example
///
/// ```
/// use markscan::parse_time_to_frame;
///
/// assert_eq!(parse_time_to_frame("00:01:10:05", 25.0).unwrap(), 1_755);
/// assert_eq!(parse_time_to_frame("01:10", 25.0).unwrap(), 1_750);
/// assert_eq!(parse_time_to_frame("70", 25.0).unwrap(), 1_750);
/// ```
pub fn parse_time_to_frame(value: &str, frames_per_second: f64) -> Result<u64, ScanError> {
    let trimmed = value.trim();
    let invalid = || ScanError::InvalidTimeFormat(trimmed.to_string());

    let fields = trimmed
        .split(':')
        .map(|field| field.trim().parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|_| invalid())?;

    let (hours, minutes, seconds, extra_frames) = match *fields.as_slice() {
        [hours, minutes, seconds, frames] => (hours, minutes, seconds, frames),
        [hours, minutes, seconds] => (hours, minutes, seconds, 0),
        [minutes, seconds] => (0, minutes, seconds, 0),
        [seconds] => (0, 0, seconds, 0),
        _ => return Err(invalid()),
    };

    let total_seconds = hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes.checked_mul(60)?))
        .and_then(|total| total.checked_add(seconds))
        .ok_or_else(invalid)?;

    let frame = (total_seconds as f64 * frames_per_second).floor();
    if !frame.is_finite() || frame >= u64::MAX as f64 {
        return Err(invalid());
    }
    (frame as u64).checked_add(extra_frames).ok_or_else(invalid)
}

/// Resolve optional start/end time strings to a half-open frame range.
///
/// A start at or beyond the last frame falls back to 0 and an end beyond the
/// video falls back to the total frame count, each with a warning. Missing
/// bounds default to the whole video.
///
/// # Errors
///
/// - [`ScanError::InvalidTimeFormat`] if either string cannot be parsed.
/// - [`ScanError::InvalidRange`] if the clamped start is not before the end.
pub fn resolve_frame_range(
    start: Option<&str>,
    end: Option<&str>,
    info: &VideoInfo,
) -> Result<Range<u64>, ScanError> {
    let fps = info.frames_per_second;
    let total = info.frame_count;

    let mut start_frame = match start {
        Some(value) => parse_time_to_frame(value, fps)?,
        None => 0,
    };
    let mut end_frame = match end {
        Some(value) => parse_time_to_frame(value, fps)?,
        None => total,
    };

    if start_frame >= total {
        log::warn!(
            "Start {} is beyond the video ({total} frames); scanning from frame 0",
            start.unwrap_or_default()
        );
        start_frame = 0;
    }
    if end_frame > total {
        log::warn!(
            "End {} is beyond the video ({total} frames); scanning to the last frame",
            end.unwrap_or_default()
        );
        end_frame = total;
    }

    if start_frame >= end_frame {
        return Err(ScanError::InvalidRange {
            start: format!("frame {start_frame}"),
            end: format!("frame {end_frame}"),
        });
    }

    Ok(start_frame..end_frame)
}
