//! Scan configuration.
//!
//! [`ScanOptions`] is a builder that threads detection thresholds, colour
//! ranges, recognition settings and the progress callback through a scan
//! without polluting every function signature. Every field has a default
//! tuned for 1080p editorial review copies with burned-in marker captions in
//! the top-right corner.
//!
//! # Example
//!
//! ```
//! use markscan::{DedupStrategy, ProcessingMode, ScanOptions};
//!
//! let options = ScanOptions::new()
//!     .with_batch_size(10)
//!     .with_max_workers(2)
//!     .with_processing_mode(ProcessingMode::Sequential)
//!     .with_dedup(DedupStrategy::time_window());
//! assert_eq!(options.batch_size, 10);
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::Arc,
};

use crate::{
    progress::{NoOpProgress, ProgressCallback},
    recognition::RecognizerFactory,
};

/// An inclusive range in OpenCV's 8-bit HLS space.
///
/// Hue runs 0–180 (degrees halved), lightness and saturation 0–255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HlsRange {
    /// Lower bound as `[hue, lightness, saturation]`.
    pub lower: [u8; 3],
    /// Upper bound as `[hue, lightness, saturation]`.
    pub upper: [u8; 3],
}

impl HlsRange {
    /// Green caption range used for VFX markers.
    pub const VFX_GREEN: HlsRange = HlsRange {
        lower: [45, 106, 138],
        upper: [75, 195, 255],
    };

    /// Orange caption range used for DI markers.
    pub const DI_ORANGE: HlsRange = HlsRange {
        lower: [10, 106, 75],
        upper: [25, 160, 245],
    };

    /// Whether an HLS triple falls inside the range, bounds included.
    pub fn contains(&self, hls: [u8; 3]) -> bool {
        (0..3).all(|channel| self.lower[channel] <= hls[channel] && hls[channel] <= self.upper[channel])
    }
}

/// A pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOfInterest {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RegionOfInterest {
    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Where marker captions are expected, as fractions of the frame.
///
/// The region spans the top `top` of the frame's height and the right
/// `right` of its width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiFractions {
    /// Fraction of the frame height, measured from the top edge.
    pub top: f64,
    /// Fraction of the frame width, measured from the right edge.
    pub right: f64,
}

impl Default for RoiFractions {
    fn default() -> Self {
        Self {
            top: 0.06,
            right: 0.40,
        }
    }
}

impl RoiFractions {
    /// Resolve to a pixel rectangle for a `width` × `height` frame.
    ///
    /// Edges are truncated toward the top-right corner, so the region never
    /// exceeds the frame.
    pub fn region(&self, width: u32, height: u32) -> RegionOfInterest {
        let top = self.top.clamp(0.0, 1.0);
        let right = self.right.clamp(0.0, 1.0);
        let roi_height = ((height as f64 * top) as u32).min(height);
        let left = ((width as f64 * (1.0 - right)) as u32).min(width);
        RegionOfInterest {
            x: left,
            y: 0,
            width: width - left,
            height: roi_height,
        }
    }
}

/// Tuning for the colour classifier and the per-class trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionThresholds {
    /// Surviving mask pixels a class needs before it counts as present.
    pub pixel_threshold: u64,
    /// Number of prior scores kept per class.
    pub window_size: usize,
    /// Rising-edge factor over the window average and recent scores.
    pub increase_factor: f64,
    /// Falling-edge factor under the window average and recent scores.
    pub decrease_factor: f64,
    /// How many of the most recent scores the edge rules compare against.
    pub edge_lookback: usize,
    /// Frames that must pass after a detection before a re-check may fire.
    pub min_interval_frames: u64,
    /// Seconds without a detection after which a re-check is forced.
    pub max_interval_seconds: f64,
    /// Relative change from the last detected score that counts as drift.
    pub drift_ratio: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            pixel_threshold: 680,
            window_size: 5,
            increase_factor: 2.0,
            decrease_factor: 0.8,
            edge_lookback: 3,
            min_interval_frames: 25,
            max_interval_seconds: 10.0,
            drift_ratio: 0.3,
        }
    }
}

/// How recognised results are collapsed into events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DedupStrategy {
    /// Group runs that are continuous in time and in space, keep runs of at
    /// least `min_run_length`, and emit each at its first frame.
    ContinuousRun {
        /// Largest frame gap between neighbouring members of a run.
        max_frame_gap: u64,
        /// Minimum overlap between a candidate and the run's first member.
        iou_threshold: f64,
        /// Runs shorter than this are dropped as noise.
        min_run_length: usize,
    },
    /// Group results that follow each other within a time window and emit
    /// each group at its best member.
    TimeWindow {
        /// Largest gap, in seconds, between neighbouring group members.
        threshold_seconds: f64,
        /// Also merge events whose texts are near-identical.
        merge_similar: bool,
    },
}

impl Default for DedupStrategy {
    fn default() -> Self {
        Self::continuous_run()
    }
}

impl DedupStrategy {
    /// Continuous-run grouping with gap 3, IoU 0.8 and minimum length 10.
    pub fn continuous_run() -> Self {
        DedupStrategy::ContinuousRun {
            max_frame_gap: 3,
            iou_threshold: 0.8,
            min_run_length: 10,
        }
    }

    /// Time-window grouping over one second, followed by the similar-text merge.
    pub fn time_window() -> Self {
        DedupStrategy::TimeWindow {
            threshold_seconds: 1.0,
            merge_similar: true,
        }
    }
}

/// Whether recognition batches run on a worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Use the pool when the scanned range exceeds
    /// [`ScanOptions::parallel_threshold`] frames.
    #[default]
    Auto,
    /// Run every batch on the calling thread, in order.
    Sequential,
    /// Always use the pool.
    Parallel,
}

/// Configuration for a scan.
///
/// All fields have defaults, so `ScanOptions::new()` scans with the
/// stock VFX/DI ranges and the placeholder recogniser.
#[derive(Clone)]
pub struct ScanOptions {
    /// Caption search window.
    pub roi: RoiFractions,
    /// HLS range for VFX captions.
    pub vfx_range: HlsRange,
    /// HLS range for DI captions.
    pub di_range: HlsRange,
    /// Classifier and trigger tuning.
    pub thresholds: DetectionThresholds,
    /// Optional `.cube` LUT applied to regions before recognition.
    pub lut_path: Option<PathBuf>,
    /// Tasks per recognition batch.
    pub batch_size: usize,
    /// Concurrent recognition workers.
    pub max_workers: usize,
    /// Range length above which [`ProcessingMode::Auto`] goes parallel.
    pub parallel_threshold: u64,
    /// Sequential or pooled recognition.
    pub processing_mode: ProcessingMode,
    /// Results below this confidence are discarded before deduplication.
    pub min_confidence: f64,
    /// Event collapsing strategy.
    pub dedup: DedupStrategy,
    /// Builds one recogniser per batch.
    pub(crate) recognizer: RecognizerFactory,
    /// Progress callback. Defaults to a no-op.
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Frames between preprocessing progress reports.
    pub(crate) progress_interval: u64,
}

impl Debug for ScanOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ScanOptions")
            .field("roi", &self.roi)
            .field("vfx_range", &self.vfx_range)
            .field("di_range", &self.di_range)
            .field("thresholds", &self.thresholds)
            .field("lut_path", &self.lut_path)
            .field("batch_size", &self.batch_size)
            .field("max_workers", &self.max_workers)
            .field("parallel_threshold", &self.parallel_threshold)
            .field("processing_mode", &self.processing_mode)
            .field("min_confidence", &self.min_confidence)
            .field("dedup", &self.dedup)
            .field("recognizer", &self.recognizer)
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            roi: RoiFractions::default(),
            vfx_range: HlsRange::VFX_GREEN,
            di_range: HlsRange::DI_ORANGE,
            thresholds: DetectionThresholds::default(),
            lut_path: None,
            batch_size: 20,
            max_workers: 3,
            parallel_threshold: 1000,
            processing_mode: ProcessingMode::Auto,
            min_confidence: 0.1,
            dedup: DedupStrategy::default(),
            recognizer: RecognizerFactory::stub(),
            progress: Arc::new(NoOpProgress),
            progress_interval: 100,
        }
    }

    /// Set the caption search window.
    #[must_use]
    pub fn with_roi(mut self, roi: RoiFractions) -> Self {
        self.roi = roi;
        self
    }

    /// Override the HLS ranges for both classes.
    #[must_use]
    pub fn with_color_ranges(mut self, vfx: HlsRange, di: HlsRange) -> Self {
        self.vfx_range = vfx;
        self.di_range = di;
        self
    }

    /// Override classifier and trigger tuning.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: DetectionThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Apply a `.cube` LUT to every region before recognition.
    #[must_use]
    pub fn with_lut<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.lut_path = Some(path.into());
        self
    }

    /// Set tasks per recognition batch. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the number of concurrent recognition workers. Clamped to a
    /// minimum of 1.
    #[must_use]
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers.max(1);
        self
    }

    /// Set the range length above which automatic mode uses the pool.
    #[must_use]
    pub fn with_parallel_threshold(mut self, frames: u64) -> Self {
        self.parallel_threshold = frames;
        self
    }

    /// Force sequential or pooled recognition.
    #[must_use]
    pub fn with_processing_mode(mut self, mode: ProcessingMode) -> Self {
        self.processing_mode = mode;
        self
    }

    /// Set the confidence floor applied before deduplication.
    #[must_use]
    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence = confidence;
        self
    }

    /// Choose how results are collapsed into events.
    #[must_use]
    pub fn with_dedup(mut self, strategy: DedupStrategy) -> Self {
        self.dedup = strategy;
        self
    }

    /// Use a different recognition engine.
    #[must_use]
    pub fn with_recognizer(mut self, factory: RecognizerFactory) -> Self {
        self.recognizer = factory;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how many frames pass between preprocessing progress reports.
    /// Clamped to a minimum of 1.
    #[must_use]
    pub fn with_progress_interval(mut self, frames: u64) -> Self {
        self.progress_interval = frames.max(1);
        self
    }

    /// Whether a scan over `frame_count` frames should use the worker pool.
    pub fn use_parallel(&self, frame_count: u64) -> bool {
        match self.processing_mode {
            ProcessingMode::Sequential => false,
            ProcessingMode::Parallel => true,
            ProcessingMode::Auto => frame_count > self.parallel_threshold,
        }
    }
}
