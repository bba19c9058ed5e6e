//! End-to-end scan tests on synthetic reels.

use std::{
    ops::Range,
    sync::{Arc, Mutex},
};

use image::{Rgb, RgbImage};
use markscan::{
    DedupStrategy, Frame, FrameSource, MarkerClass, OperationType, ProcessingMode,
    ProgressCallback, ProgressInfo, RecognizedItem, RecognizerFactory, ScanError, ScanOptions,
    Scanner, TextRecognizer, VideoInfo,
};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const ORANGE: Rgb<u8> = Rgb([230, 120, 20]);

/// A caption burned into the top-right corner for a span of frames.
struct Caption {
    frames: Range<u64>,
    color: Rgb<u8>,
}

/// Renders 640×360 frames on demand.
struct SyntheticReel {
    info: VideoInfo,
    captions: Vec<Caption>,
}

impl SyntheticReel {
    fn new(frame_count: u64, captions: Vec<Caption>) -> Self {
        Self {
            info: VideoInfo::new(640, 360, 25.0, frame_count),
            captions,
        }
    }

    fn render(&self, index: u64) -> RgbImage {
        let mut image = RgbImage::from_pixel(640, 360, Rgb([20, 20, 24]));
        for caption in self.captions.iter().filter(|c| c.frames.contains(&index)) {
            for y in 0..20 {
                for x in 500..550 {
                    image.put_pixel(x, y, caption.color);
                }
            }
        }
        image
    }
}

impl FrameSource for SyntheticReel {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn for_each_frame(
        &mut self,
        range: Range<u64>,
        handler: &mut dyn FnMut(Frame) -> Result<(), ScanError>,
    ) -> Result<(), ScanError> {
        for index in range.start..range.end.min(self.info.frame_count) {
            handler(Frame {
                index,
                image: self.render(index),
            })?;
        }
        Ok(())
    }
}

/// Reads every region as the same caption, with a box.
struct ScriptedRecognizer {
    text: &'static str,
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(&mut self, _image: &RgbImage) -> Result<Vec<RecognizedItem>, ScanError> {
        Ok(vec![
            RecognizedItem::new(self.text, 0.95)
                .with_quad(vec![[116.0, 0.0], [166.0, 0.0], [166.0, 20.0], [116.0, 20.0]]),
        ])
    }
}

fn scripted(text: &'static str) -> RecognizerFactory {
    RecognizerFactory::new("scripted", move || {
        Ok(Box::new(ScriptedRecognizer { text }) as Box<dyn TextRecognizer>)
    })
}

fn green_reel() -> SyntheticReel {
    SyntheticReel::new(
        300,
        vec![Caption {
            frames: 100..141,
            color: GREEN,
        }],
    )
}

// ── Detection ──────────────────────────────────────────────────────

#[test]
fn green_caption_becomes_one_vfx_event() {
    let options = ScanOptions::new()
        .with_recognizer(scripted("VEX:SHOT01"))
        .with_dedup(DedupStrategy::time_window());
    let report = Scanner::new(options).run(&mut green_reel(), None, None).unwrap();

    assert_eq!(report.frames_processed, 300);
    assert_eq!(report.range, 0..300);
    assert!(!report.parallel);
    assert_eq!(report.events.len(), 1);

    let event = &report.events[0];
    assert_eq!(event.class, MarkerClass::Vfx);
    assert_eq!(event.text, "VFX:SHOT01");
    assert!((100..=105).contains(&event.frame_index));
    assert_eq!(event.timecode, "00:00:04:00");
    assert_eq!(event.pixel_score, 1000);
    assert_eq!(report.statistics.di_count, 0);
}

#[test]
fn single_read_is_too_short_for_a_continuous_run() {
    let options = ScanOptions::new().with_recognizer(scripted("VFX:SHOT01"));
    let report = Scanner::new(options).run(&mut green_reel(), None, None).unwrap();

    assert_eq!(report.tasks_staged, 1);
    assert_eq!(report.results_recognized, 1);
    assert!(report.events.is_empty());
}

#[test]
fn orange_caption_becomes_a_di_event() {
    let mut reel = SyntheticReel::new(
        200,
        vec![Caption {
            frames: 60..90,
            color: ORANGE,
        }],
    );
    let options = ScanOptions::new()
        .with_recognizer(scripted("D1;grade warmer"))
        .with_dedup(DedupStrategy::time_window());
    let report = Scanner::new(options).run(&mut reel, None, None).unwrap();

    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].class, MarkerClass::Di);
    assert_eq!(report.events[0].text, "DI:grade warmer");
    assert_eq!(report.events[0].frame_index, 60);
    assert_eq!(report.statistics.vfx_count, 0);
}

#[test]
fn blank_reel_has_no_events() {
    let mut reel = SyntheticReel::new(120, Vec::new());
    let report = Scanner::new(ScanOptions::new()).run(&mut reel, None, None).unwrap();
    assert_eq!(report.tasks_staged, 0);
    assert!(report.events.is_empty());
    assert_eq!(report.statistics.total, 0);
}

#[test]
fn stub_engine_is_filtered_by_confidence() {
    let options = ScanOptions::new()
        .with_dedup(DedupStrategy::time_window())
        .with_min_confidence(0.5);
    let report = Scanner::new(options).run(&mut green_reel(), None, None).unwrap();
    assert_eq!(report.results_recognized, 1);
    assert!(report.events.is_empty());
}

// ── Ranges and modes ───────────────────────────────────────────────

#[test]
fn range_limits_the_walk() {
    let options = ScanOptions::new()
        .with_recognizer(scripted("VFX:SHOT01"))
        .with_dedup(DedupStrategy::time_window());
    let report = Scanner::new(options)
        .run(&mut green_reel(), Some("00:00:02"), Some("00:00:08"))
        .unwrap();

    assert_eq!(report.range, 50..200);
    assert_eq!(report.frames_processed, 150);
    assert_eq!(report.events.len(), 1);
}

#[test]
fn empty_range_fails_the_scan() {
    let result = Scanner::new(ScanOptions::new()).run(&mut green_reel(), Some("8"), Some("2"));
    assert!(matches!(result, Err(ScanError::InvalidRange { .. })));
}

#[test]
fn parallel_mode_matches_sequential() {
    let scan = |mode| {
        let options = ScanOptions::new()
            .with_recognizer(scripted("VEX:SHOT01"))
            .with_dedup(DedupStrategy::time_window())
            .with_processing_mode(mode);
        Scanner::new(options).run(&mut green_reel(), None, None).unwrap()
    };

    let sequential = scan(ProcessingMode::Sequential);
    let parallel = scan(ProcessingMode::Parallel);
    assert!(!sequential.parallel);
    assert!(parallel.parallel);
    assert_eq!(sequential.events, parallel.events);
}

#[test]
fn auto_mode_uses_pool_only_for_long_ranges() {
    let options = ScanOptions::new();
    assert!(!options.use_parallel(1000));
    assert!(options.use_parallel(1001));
    assert!(options.clone().with_processing_mode(ProcessingMode::Parallel).use_parallel(1));
    assert!(!options.with_processing_mode(ProcessingMode::Sequential).use_parallel(5000));
}

#[test]
fn missing_lut_does_not_stop_the_scan() {
    let options = ScanOptions::new()
        .with_recognizer(scripted("VFX:SHOT01"))
        .with_dedup(DedupStrategy::time_window())
        .with_lut("no/such/grade.cube");
    let report = Scanner::new(options).run(&mut green_reel(), None, None).unwrap();
    assert_eq!(report.events.len(), 1);
}

// ── Progress ───────────────────────────────────────────────────────

#[derive(Default)]
struct PhaseLog {
    phases: Mutex<Vec<(OperationType, u64)>>,
}

impl ProgressCallback for PhaseLog {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Ok(mut phases) = self.phases.lock() {
            phases.push((info.operation, info.current));
        }
    }
}

#[test]
fn progress_reports_both_phases() {
    let log = Arc::new(PhaseLog::default());
    let options = ScanOptions::new()
        .with_progress(log.clone())
        .with_progress_interval(50);
    Scanner::new(options).run(&mut green_reel(), None, None).unwrap();

    let phases = log.phases.lock().unwrap();
    let preprocessing: Vec<u64> = phases
        .iter()
        .filter(|(operation, _)| *operation == OperationType::Preprocessing)
        .map(|(_, current)| *current)
        .collect();
    assert_eq!(preprocessing, vec![50, 100, 150, 200, 250, 300, 300]);
    assert!(phases.iter().any(|(operation, _)| *operation == OperationType::Recognition));
}

// ── Video files ────────────────────────────────────────────────────

#[test]
fn open_nonexistent_file() {
    let result = Scanner::new(ScanOptions::new()).scan_file("this_file_does_not_exist.mp4", None, None);
    match result {
        Err(error @ ScanError::FileOpen { .. }) => {
            assert!(error.to_string().contains("Failed to open video file"));
        }
        other => panic!("expected a file-open error, got {other:?}"),
    }
}

#[test]
fn open_invalid_file() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("invalid.mp4");
    std::fs::write(&path, b"this is not a video file").expect("Failed to write invalid file");

    assert!(markscan::VideoFile::open(&path).is_err());
}

#[test]
fn scan_fixture_video_if_present() {
    let path = "tests/fixtures/sample_video.mp4";
    if !std::path::Path::new(path).exists() {
        return;
    }

    let mut video = markscan::VideoFile::open(path).expect("Failed to open test video");
    let info = video.info().clone();
    assert!(info.width > 0 && info.height > 0);
    assert!(info.frames_per_second > 0.0);

    let report = Scanner::new(ScanOptions::new())
        .run(&mut video, None, Some("00:00:01"))
        .expect("Failed to scan test video");
    assert!(report.frames_processed > 0);
    assert!(report.frames_processed <= report.range.end - report.range.start);
}
