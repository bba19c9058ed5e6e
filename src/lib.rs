//! # markscan
//!
//! Find burned-in review captions in video and turn them into an event log.
//!
//! Editorial review copies often carry short coloured captions in the corner
//! of the frame: green `VFX:` notes for visual-effects work and orange `DI:`
//! notes for grading. `markscan` walks a video with FFmpeg (via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate), detects
//! those captions by colour, reads them with a pluggable text recogniser and
//! collapses the many per-frame reads of one caption into a single event
//! with a frame number and timecode.
//!
//! ## Quick Start
//!
//! ### Scan a Video
//!
//! ```no_run
//! use markscan::{RecognizerFactory, ScanOptions, Scanner, save_csv};
//!
//! let options = ScanOptions::new()
//!     .with_recognizer(RecognizerFactory::from_engine(Some("ocr-json")));
//! let report = Scanner::new(options).scan_file("reel_03.mov", Some("00:01:00"), None)?;
//!
//! for event in &report.events {
//!     println!("{} {} {}", event.timecode, event.class, event.text);
//! }
//! save_csv("reel_03_detected_frames.csv", &report.events)?;
//! # Ok::<(), markscan::ScanError>(())
//! ```
//!
//! ### Replay Events as Markers
//!
//! ```no_run
//! use markscan::{InMemoryMarkerStore, MarkerSink, import_csv};
//!
//! let mut timeline = InMemoryMarkerStore::new();
//! let text = std::fs::read_to_string("reel_03_detected_frames.csv")?;
//! let summary = import_csv(&mut timeline, &text)?;
//! println!("{} of {} markers added", summary.success, summary.total);
//! # Ok::<(), markscan::ScanError>(())
//! ```
//!
//! ## Pipeline
//!
//! - **Classification**: the top-right corner of each frame is converted
//!   to HLS and masked for the green and orange caption colours.
//! - **Triggering**: a per-class sliding window decides which frames are
//!   worth reading (rising and falling edges, drift, periodic re-checks).
//! - **Recognition**: triggered regions are PNG-encoded into tasks and
//!   recognised in isolated batches on a bounded rayon pool.
//! - **Normalisation**: misread prefixes such as `VEX:` or `D1;` are
//!   rewritten to `VFX:` and `DI:`.
//! - **Deduplication**: continuous runs (time plus box overlap) or time
//!   windows collapse reads into events.
//! - **Output**: CSV and JSON event logs, and marker replay through
//!   [`MarkerSink`].
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod batch;
pub mod classifier;
pub mod configuration;
pub mod dedup;
pub mod error;
pub mod export;
pub mod geometry;
pub mod lut;
pub mod markers;
pub mod metadata;
pub mod normalize;
pub mod progress;
pub mod recognition;
pub mod scanner;
pub mod source;
pub mod staging;
pub mod task;
pub mod timecode;
pub mod trigger;

pub use batch::{BatchSettings, recognize_batches};
pub use classifier::{
    ClassScores, Classification, DetectionCandidate, FrameClassifier, MarkerClass, rgb_to_hls,
};
pub use configuration::{
    DedupStrategy, DetectionThresholds, HlsRange, ProcessingMode, RegionOfInterest, RoiFractions,
    ScanOptions,
};
pub use dedup::{
    CanonicalEvent, dedup_continuous_runs, dedup_time_window, filter_results,
    merge_similar_texts, postprocess, text_similarity,
};
pub use error::ScanError;
pub use export::{
    CSV_HEADERS, CsvRecord, ScanStatistics, ScanSummary, load_csv, parse_csv, read_csv, save_csv,
    write_csv, write_json_summary,
};
pub use geometry::{BoundingBox, iou};
pub use lut::{ColorTransform, CubeLut, load_color_transform};
pub use markers::{
    ColorSelector, ImportSummary, InMemoryMarkerStore, Marker, MarkerColor, MarkerSink,
    MarkerSummary, RangeDeletion, import_csv, import_events,
};
pub use metadata::{DEFAULT_FRAMES_PER_SECOND, VideoInfo};
pub use normalize::{PrefixRules, normalize, prefix_rules};
pub use progress::{OperationType, ProgressCallback, ProgressInfo};
pub use recognition::{
    CommandRecognizer, RecognitionResult, RecognizedItem, RecognizerFactory, STUB_CONFIDENCE,
    STUB_TEXT, StubRecognizer, TextRecognizer, recognize_task,
};
pub use scanner::{ScanReport, Scanner};
pub use source::{Frame, FrameSequence, FrameSource, VideoFile};
pub use staging::{StagedTasks, stage_tasks};
pub use task::RecognitionTask;
pub use timecode::{Timecode, frame_to_timecode, parse_time_to_frame, resolve_frame_range};
pub use trigger::{ClassHistory, TriggerState};
