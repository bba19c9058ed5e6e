//! Progress reporting.
//!
//! A scan runs in two phases: a sequential preprocessing walk over the frame
//! range and a recognition pass over the staged tasks. Both report through
//! [`ProgressCallback`] with a [`ProgressInfo`] snapshot that names the phase
//! in [`OperationType`].
//!
//! Callbacks observe only. There is no cancellation contract; a scan ends when
//! its frame range is exhausted or the process stops.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use markscan::{OperationType, ProgressCallback, ProgressInfo, ScanError, ScanOptions, Scanner};
//!
//! struct FrameLog;
//!
//! impl ProgressCallback for FrameLog {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let (OperationType::Preprocessing, Some(frame)) = (info.operation, info.current_frame) {
//!             eprintln!("classified up to frame {frame}");
//!         }
//!     }
//! }
//!
//! let options = ScanOptions::new().with_progress(Arc::new(FrameLog));
//! let report = Scanner::new(options).scan_file("reel_03.mov", None, None)?;
//! println!("{} events", report.events.len());
//! # Ok::<(), ScanError>(())
//! ```

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// The scan phase currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding, classifying and triggering frames (sequential).
    Preprocessing,
    /// Running text recognition over staged batches.
    Recognition,
}

/// A snapshot of scan progress.
///
/// Preprocessing counts frames and reports every
/// [`ScanOptions::progress_interval`](crate::ScanOptions) frames.
/// Recognition counts batches and reports after each one completes.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Which phase is running.
    pub operation: OperationType,
    /// Items (frames or batches) processed so far.
    pub current: u64,
    /// Frames in the range, or batches queued.
    pub total: Option<u64>,
    /// `current` as a share of `total`, 0 to 100.
    pub percentage: Option<f32>,
    /// Time since the phase began.
    pub elapsed: Duration,
    /// Linear extrapolation of the time left in this phase.
    pub estimated_remaining: Option<Duration>,
    /// Frame index most recently processed (preprocessing only).
    pub current_frame: Option<u64>,
}

/// Trait for receiving progress updates during a scan.
///
/// Implementations must be [`Send`] and [`Sync`] because recognition
/// progress is reported from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a scan phase.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Counts frames or batches for one phase and reports every `interval`.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    done: u64,
    interval: u64,
    pending: u64,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        interval: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            done: 0,
            interval: interval.max(1),
            pending: 0,
            started: Instant::now(),
        }
    }

    /// Count one finished item. `frame_index` is passed through to the
    /// callback when the interval is reached.
    pub(crate) fn advance(&mut self, frame_index: Option<u64>) {
        self.done += 1;
        self.pending += 1;
        if self.pending >= self.interval {
            self.pending = 0;
            self.emit(frame_index);
        }
    }

    /// Report the final count regardless of the interval.
    pub(crate) fn finish(&mut self) {
        self.emit(None);
    }

    fn emit(&self, current_frame: Option<u64>) {
        let elapsed = self.started.elapsed();
        let total = self.total;
        let percentage = total
            .filter(|&total| total > 0)
            .map(|total| self.done as f32 * 100.0 / total as f32);
        let estimated_remaining = total
            .filter(|_| self.done > 0)
            .map(|total| elapsed.mul_f64(total.saturating_sub(self.done) as f64 / self.done as f64));

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.done,
            total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame,
        });
    }
}
