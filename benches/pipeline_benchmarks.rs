//! Benchmarks for the per-frame classifier, the trigger and deduplication.
//!
//! Run with: cargo bench
//!
//! The scan benchmark additionally needs `tests/fixtures/sample_video.mp4`.

use std::{hint::black_box, path::Path};

use criterion::Criterion;
use ffmpeg_next::util::log::Level as LogLevel;
use image::{Rgb, RgbImage};
use markscan::{
    BoundingBox, ClassScores, DetectionThresholds, FrameClassifier, MarkerClass,
    RecognitionResult, ScanOptions, Scanner, TriggerState, dedup_continuous_runs,
    dedup_time_window, normalize,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

fn captioned_frame(width: u32, height: u32) -> RgbImage {
    let mut frame = RgbImage::from_pixel(width, height, Rgb([30, 30, 30]));
    let left = width - width / 4;
    for y in 0..height / 20 {
        for x in left..left + width / 8 {
            frame.put_pixel(x, y, Rgb([0, 255, 0]));
        }
    }
    frame
}

fn results(count: u64) -> Vec<RecognitionResult> {
    (0..count)
        .map(|frame| RecognitionResult {
            frame_index: frame,
            timecode: String::new(),
            class: if frame % 3 == 0 { MarkerClass::Di } else { MarkerClass::Vfx },
            text: format!("VFX:SH{:03}", frame / 40),
            confidence: 0.5 + (frame % 7) as f64 / 20.0,
            pixel_score: 1000 + frame % 13,
            bounding_box: Some(BoundingBox::new(10.0, 2.0, 210.0, 32.0)),
            raw_items: Vec::new(),
        })
        .collect()
}

fn benchmark_classifier(criterion: &mut Criterion) {
    let classifier = FrameClassifier::new(&ScanOptions::new());

    let hd = captioned_frame(1920, 1080);
    criterion.bench_function("classify 1080p frame", |bencher| {
        bencher.iter(|| classifier.classify(black_box(&hd)));
    });

    let uhd = captioned_frame(3840, 2160);
    criterion.bench_function("classify 2160p frame", |bencher| {
        bencher.iter(|| classifier.classify(black_box(&uhd)));
    });
}

fn benchmark_trigger(criterion: &mut Criterion) {
    let scores: Vec<ClassScores> = (0..10_000u64)
        .map(|frame| ClassScores {
            vfx: if (frame / 200) % 2 == 0 { 0 } else { 1200 + frame % 50 },
            di: if frame % 500 < 40 { 900 } else { 0 },
        })
        .collect();

    criterion.bench_function("trigger over 10k frames", |bencher| {
        bencher.iter(|| {
            let mut trigger = TriggerState::new(DetectionThresholds::default(), 25.0);
            scores
                .iter()
                .map(|&frame| trigger.observe_frame(frame).len())
                .sum::<usize>()
        });
    });
}

fn benchmark_dedup(criterion: &mut Criterion) {
    let input = results(5_000);

    criterion.bench_function("continuous-run dedup of 5k results", |bencher| {
        bencher.iter(|| dedup_continuous_runs(black_box(input.clone()), 3, 0.8, 10));
    });

    criterion.bench_function("time-window dedup of 5k results", |bencher| {
        bencher.iter(|| dedup_time_window(black_box(input.clone()), 1.0, 25.0));
    });

    criterion.bench_function("normalize prefixes", |bencher| {
        bencher.iter(|| {
            for text in ["VEX:SH010", "D1;warm", "vfx sky", "warm up"] {
                black_box(normalize(text, MarkerClass::Vfx));
                black_box(normalize(text, MarkerClass::Di));
            }
        });
    });
}

fn benchmark_scan(criterion: &mut Criterion) {
    ffmpeg_next::util::log::set_level(LogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    let mut group = criterion.benchmark_group("scan");
    group.sample_size(10);
    group.bench_function("scan first second of fixture", |bencher| {
        bencher.iter(|| {
            Scanner::new(ScanOptions::new())
                .scan_file(SAMPLE_VIDEO, None, Some("00:00:01"))
                .unwrap()
        });
    });
    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_classifier,
    benchmark_trigger,
    benchmark_dedup,
    benchmark_scan,
);
criterion::criterion_main!(benches);
