//! The scan pipeline.
//!
//! [`Scanner`] ties the stages together:
//!
//! 1. resolve the requested time range against the source,
//! 2. walk the range sequentially, classifying frames and staging a
//!    recognition task whenever the trigger fires,
//! 3. recognise the staged tasks in batches, on a worker pool for long
//!    ranges,
//! 4. filter, normalise and deduplicate the results into events.
//!
//! Only an unusable source or time range fails the scan. Everything after
//! classification degrades per item or per batch and is reported through
//! `log` warnings.

use std::{ops::Range, path::Path};

use serde::Serialize;

use crate::{
    batch::{BatchSettings, recognize_batches},
    configuration::ScanOptions,
    dedup::{CanonicalEvent, postprocess},
    error::ScanError,
    export::{ScanStatistics, ScanSummary},
    lut::load_color_transform,
    metadata::VideoInfo,
    source::{FrameSource, VideoFile},
    staging::stage_tasks,
    timecode::resolve_frame_range,
};

/// What a scan found.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Metadata of the scanned source.
    pub video: VideoInfo,
    /// Frame range that was scanned, end exclusive.
    pub range: Range<u64>,
    /// Frames decoded and classified.
    pub frames_processed: u64,
    /// Regions sent to recognition.
    pub tasks_staged: usize,
    /// Regions that produced text.
    pub results_recognized: usize,
    /// Whether recognition ran on the worker pool.
    pub parallel: bool,
    /// Deduplicated events, in frame order.
    pub events: Vec<CanonicalEvent>,
    /// Aggregate figures over `events`.
    pub statistics: ScanStatistics,
}

impl ScanReport {
    /// The JSON summary document for this report.
    pub fn summary(&self, video: Option<String>) -> ScanSummary {
        ScanSummary {
            video,
            frames_per_second: self.video.frames_per_second,
            statistics: self.statistics.clone(),
            events: self.events.clone(),
        }
    }
}

/// Runs scans with a fixed set of options.
///
/// # Example
///
/// ```
/// use image::{Rgb, RgbImage};
/// use markscan::{FrameSequence, ScanError, ScanOptions, Scanner};
///
/// let mut source = FrameSequence::from_fn(50, 25.0, |_| RgbImage::new(320, 180));
/// let report = Scanner::new(ScanOptions::new()).run(&mut source, None, None)?;
/// assert_eq!(report.frames_processed, 50);
/// assert!(report.events.is_empty());
/// # Ok::<(), ScanError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    /// Create a scanner.
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// The options this scanner runs with.
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Open a video file and scan it.
    ///
    /// The decoder is released when this returns, whether or not the scan
    /// succeeded.
    ///
    /// # Errors
    ///
    /// See [`VideoFile::open`] and [`Scanner::run`].
    pub fn scan_file<P: AsRef<Path>>(
        &self,
        path: P,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<ScanReport, ScanError> {
        let mut video = VideoFile::open(path)?;
        self.run(&mut video, start, end)
    }

    /// Scan `source` between the optional `start` and `end` times.
    ///
    /// Times use any layout accepted by
    /// [`parse_time_to_frame`](crate::parse_time_to_frame) and are clamped
    /// to the source as described in
    /// [`resolve_frame_range`](crate::resolve_frame_range).
    ///
    /// # Errors
    ///
    /// - [`ScanError::InvalidTimeFormat`] or [`ScanError::InvalidRange`] for
    ///   an unusable time range.
    /// - Errors from the source that stop decoding altogether.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<ScanReport, ScanError> {
        let video = source.info().clone();
        let range = resolve_frame_range(start, end, &video)?;
        let range_length = range.end - range.start;

        log::info!(
            "Scanning frames {}..{} ({range_length} frames at {:.3} fps)",
            range.start,
            range.end,
            video.frames_per_second
        );

        let transform = load_color_transform(self.options.lut_path.as_deref());
        let staged = stage_tasks(source, range.clone(), &self.options, transform.as_deref())?;

        let parallel = self.options.use_parallel(range_length);
        let settings = BatchSettings {
            batch_size: self.options.batch_size,
            max_workers: self.options.max_workers,
            parallel,
        };
        let results = recognize_batches(
            &staged.tasks,
            &self.options.recognizer,
            &settings,
            Some(self.options.progress.clone()),
        );
        let results_recognized = results.len();

        let events = postprocess(results, &self.options, video.frames_per_second);
        let statistics = ScanStatistics::from_events(&events);

        log::info!(
            "Scan complete: {} events ({} VFX, {} DI) from {} recognised regions",
            statistics.total,
            statistics.vfx_count,
            statistics.di_count,
            results_recognized
        );

        Ok(ScanReport {
            video,
            range,
            frames_processed: staged.frames_processed,
            tasks_staged: staged.tasks.len(),
            results_recognized,
            parallel,
            events,
            statistics,
        })
    }
}
