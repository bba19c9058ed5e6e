//! Recognition task, engine and batch isolation tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use image::{Rgb, RgbImage};
use markscan::{
    BatchSettings, BoundingBox, MarkerClass, OperationType, ProgressCallback, ProgressInfo,
    RecognitionTask, RecognizedItem, RecognizerFactory, STUB_CONFIDENCE, STUB_TEXT, ScanError,
    StubRecognizer, TextRecognizer, recognize_batches, recognize_task,
};

/// Returns fixed items for every image.
struct FixedRecognizer {
    items: Vec<RecognizedItem>,
}

impl TextRecognizer for FixedRecognizer {
    fn recognize(&mut self, _image: &RgbImage) -> Result<Vec<RecognizedItem>, ScanError> {
        Ok(self.items.clone())
    }
}

/// Panics on regions of one particular width.
struct FragileRecognizer {
    poison_width: u32,
}

impl TextRecognizer for FragileRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedItem>, ScanError> {
        if image.width() == self.poison_width {
            panic!("engine crashed");
        }
        Ok(vec![RecognizedItem::new("VFX:ok", 0.9)])
    }
}

fn region(width: u32) -> RgbImage {
    RgbImage::from_pixel(width, 21, Rgb([0, 255, 0]))
}

fn task(frame: u64, width: u32) -> RecognitionTask {
    RecognitionTask::new(frame, format!("tc{frame}"), MarkerClass::Vfx, &region(width), 1000)
        .expect("encode task")
}

fn settings(parallel: bool) -> BatchSettings {
    BatchSettings {
        batch_size: 20,
        max_workers: 3,
        parallel,
    }
}

// ── Tasks ──────────────────────────────────────────────────────────

#[test]
fn task_region_survives_png_round_trip() {
    let mut image = region(64);
    image.put_pixel(3, 4, Rgb([12, 34, 56]));
    let task = RecognitionTask::new(7, "00:00:00:07".to_string(), MarkerClass::Di, &image, 555)
        .unwrap();

    assert_eq!(&task.region_png[1..4], b"PNG");
    assert_eq!(task.region_size, (64, 21));
    assert_eq!(task.decode_region().unwrap(), image);
}

#[test]
fn corrupt_task_bytes_fail_to_decode() {
    let mut task = task(1, 32);
    task.region_png.truncate(10);
    assert!(task.decode_region().is_err());
}

#[test]
fn task_serializes_as_plain_data() {
    let task = task(3, 16);
    let json = serde_json::to_string(&task).unwrap();
    let back: RecognitionTask = serde_json::from_str(&json).unwrap();
    assert_eq!(back, task);
}

// ── Single task ────────────────────────────────────────────────────

#[test]
fn stub_recognizer_returns_placeholder() {
    let result = recognize_task(&mut StubRecognizer, &task(5, 32)).unwrap().unwrap();
    assert_eq!(result.text, STUB_TEXT);
    assert_eq!(result.confidence, STUB_CONFIDENCE);
    assert_eq!(result.frame_index, 5);
    assert_eq!(result.timecode, "tc5");
    assert!(result.bounding_box.is_none());
}

#[test]
fn items_are_concatenated_averaged_and_boxed() {
    let mut recognizer = FixedRecognizer {
        items: vec![
            RecognizedItem::new(" VFX: ", 0.8)
                .with_quad(vec![[0.0, 0.0], [40.0, 0.0], [40.0, 20.0], [0.0, 20.0]]),
            RecognizedItem::new("", 0.1),
            RecognizedItem::new("SH010", 0.6)
                .with_quad(vec![[50.0, 2.0], [120.0, 2.0], [120.0, 22.0], [50.0, 22.0]]),
        ],
    };

    let result = recognize_task(&mut recognizer, &task(9, 32)).unwrap().unwrap();
    assert_eq!(result.text, "VFX:SH010");
    assert!((result.confidence - 0.7).abs() < 1e-9);
    assert_eq!(result.bounding_box, Some(BoundingBox::new(0.0, 0.0, 120.0, 22.0)));
    assert_eq!(result.raw_items.len(), 2);
    assert_eq!(result.pixel_score, 1000);
}

#[test]
fn blank_items_give_no_result() {
    let mut recognizer = FixedRecognizer {
        items: vec![RecognizedItem::new("   ", 0.9)],
    };
    assert!(recognize_task(&mut recognizer, &task(9, 32)).unwrap().is_none());
}

#[test]
fn item_json_accepts_optional_box() {
    let items: Vec<RecognizedItem> = serde_json::from_str(
        r#"[{"text": "VFX:A", "confidence": 0.9, "box": [[1,2],[5,2],[5,9],[1,9]]},
            {"text": "B", "confidence": 0.5}]"#,
    )
    .unwrap();
    assert_eq!(items[0].bounding_box(), Some(BoundingBox::new(1.0, 2.0, 5.0, 9.0)));
    assert_eq!(items[1].bounding_box(), None);
}

// ── Batches ────────────────────────────────────────────────────────

#[test]
fn every_task_is_recognised_in_order() {
    let tasks: Vec<RecognitionTask> = (0..45).map(|frame| task(frame, 32)).collect();
    for parallel in [false, true] {
        let results =
            recognize_batches(&tasks, &RecognizerFactory::stub(), &settings(parallel), None);
        let frames: Vec<u64> = results.iter().map(|r| r.frame_index).collect();
        assert_eq!(frames, (0..45).collect::<Vec<u64>>());
    }
}

#[test]
fn failing_engine_start_drops_only_its_batch() {
    let tasks: Vec<RecognitionTask> = (0..100).map(|frame| task(frame, 32)).collect();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let factory = RecognizerFactory::new("flaky", move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 2 {
            return Err(ScanError::EngineUnavailable("model failed to load".to_string()));
        }
        Ok(Box::new(StubRecognizer) as Box<dyn TextRecognizer>)
    });

    let results = recognize_batches(&tasks, &factory, &settings(true), None);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(results.len(), 80);
}

#[test]
fn panicking_engine_drops_only_its_batch() {
    // Frames 40..60 form the third batch; one of them has a poisoned width.
    let tasks: Vec<RecognitionTask> = (0..100)
        .map(|frame| task(frame, if frame == 47 { 13 } else { 32 }))
        .collect();
    let factory = RecognizerFactory::new("fragile", || {
        Ok(Box::new(FragileRecognizer { poison_width: 13 }) as Box<dyn TextRecognizer>)
    });

    for parallel in [false, true] {
        let results = recognize_batches(&tasks, &factory, &settings(parallel), None);
        assert_eq!(results.len(), 80);
        assert!(results.iter().all(|r| !(40..60).contains(&r.frame_index)));
    }
}

#[test]
fn per_task_errors_skip_the_task() {
    let mut tasks: Vec<RecognitionTask> = (0..5).map(|frame| task(frame, 32)).collect();
    tasks[2].region_png.clear();

    let results = recognize_batches(&tasks, &RecognizerFactory::stub(), &settings(false), None);
    let frames: Vec<u64> = results.iter().map(|r| r.frame_index).collect();
    assert_eq!(frames, vec![0, 1, 3, 4]);
}

#[derive(Default)]
struct RecordingProgress {
    reports: Mutex<Vec<(OperationType, u64, Option<u64>)>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((info.operation, info.current, info.total));
        }
    }
}

#[test]
fn recognition_progress_counts_batches() {
    let tasks: Vec<RecognitionTask> = (0..50).map(|frame| task(frame, 32)).collect();
    let progress = Arc::new(RecordingProgress::default());

    recognize_batches(
        &tasks,
        &RecognizerFactory::stub(),
        &settings(true),
        Some(progress.clone() as Arc<dyn ProgressCallback>),
    );

    let reports = progress.reports.lock().unwrap();
    assert!(reports.iter().all(|(operation, _, total)| {
        *operation == OperationType::Recognition && *total == Some(3)
    }));
    assert_eq!(reports.last().map(|(_, current, _)| *current), Some(3));
    assert_eq!(reports.len(), 4);
}

// ── External engine ────────────────────────────────────────────────

#[cfg(unix)]
mod command {
    use markscan::{CommandRecognizer, RecognizerFactory, ScanError, TextRecognizer};

    use super::region;

    fn shell(script: &str) -> CommandRecognizer {
        CommandRecognizer::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn parses_json_from_stdout() {
        let mut recognizer =
            shell(r#"echo '[{"text":"VEX:SH010","confidence":0.93,"box":[[2,1],[90,1],[90,19],[2,19]]}]'"#);
        let items = recognizer.recognize(&region(32)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "VEX:SH010");
        assert_eq!(items[0].confidence, 0.93);
    }

    #[test]
    fn receives_a_png_path() {
        let mut recognizer = shell(
            r#"case "$0" in *.png) test -s "$0" && echo '[{"text":"ok","confidence":1.0}]';; esac"#,
        );
        let items = recognizer.recognize(&region(32)).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn empty_output_means_no_text() {
        assert!(shell("true").recognize(&region(8)).unwrap().is_empty());
    }

    #[test]
    fn failures_are_recognition_errors() {
        let result = shell("echo boom >&2; exit 3").recognize(&region(8));
        match result {
            Err(ScanError::RecognitionError(message)) => assert!(message.contains("boom")),
            other => panic!("expected a recognition error, got {other:?}"),
        }
        assert!(matches!(
            shell("echo not json").recognize(&region(8)),
            Err(ScanError::JsonError(_))
        ));
    }

    #[test]
    fn unknown_engine_falls_back_to_stub() {
        let factory = RecognizerFactory::from_engine(Some("markscan-no-such-engine-binary"));
        assert_eq!(factory.name(), RecognizerFactory::stub().name());
    }
}
