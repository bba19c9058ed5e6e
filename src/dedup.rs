//! Collapsing per-frame recognition results into caption events.
//!
//! The trigger fires several times while a caption is on screen (on its
//! rising edge, on drift, on periodic re-checks, on its falling edge), so
//! one physical caption produces many results. Two strategies reduce them
//! to one event each:
//!
//! - **Continuous runs** ([`dedup_continuous_runs`]): results of one class
//!   that follow each other within a few frames and overlap the run's first
//!   box form a run. Short runs are noise. A kept run is reported at its
//!   first frame with the text of its best read.
//! - **Time window** ([`dedup_time_window`]): results of one class within a
//!   time threshold of each other form a group, reported at its best member.
//!   Usually followed by [`merge_similar_texts`].
//!
//! Both strategies group each class on its own, so a VFX and a DI caption
//! on screen together never break each other's groups. Input order does not
//! matter; everything is sorted by frame first.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    classifier::MarkerClass,
    configuration::{DedupStrategy, ScanOptions},
    geometry::{BoundingBox, iou},
    normalize::normalize,
    recognition::RecognitionResult,
};

/// Confidence difference under which two reads count as equally good.
const CONFIDENCE_TIE: f64 = 0.01;

/// Character-set similarity at or above which two texts are merged.
pub const SIMILAR_TEXT_THRESHOLD: f64 = 0.8;

/// One caption occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// First frame of the occurrence.
    pub frame_index: u64,
    /// `HH:MM:SS:FF` of `frame_index`.
    pub timecode: String,
    /// Caption class.
    pub class: MarkerClass,
    /// Normalised text of the best read.
    pub text: String,
    /// Confidence of the best read.
    pub confidence: f64,
    /// Classifier score of the best read.
    pub pixel_score: u64,
    /// Box of the best read, if known.
    pub bounding_box: Option<BoundingBox>,
    /// Number of results collapsed into this event.
    pub occurrences: usize,
}

impl CanonicalEvent {
    fn from_group(representative: &RecognitionResult, first: &RecognitionResult, size: usize) -> Self {
        Self {
            frame_index: first.frame_index,
            timecode: first.timecode.clone(),
            class: representative.class,
            text: representative.text.clone(),
            confidence: representative.confidence,
            pixel_score: representative.pixel_score,
            bounding_box: representative.bounding_box,
            occurrences: size,
        }
    }
}

/// Drop low-confidence results, normalise text and drop blank text.
pub fn filter_results(results: Vec<RecognitionResult>, min_confidence: f64) -> Vec<RecognitionResult> {
    let total = results.len();
    let kept: Vec<RecognitionResult> = results
        .into_iter()
        .filter(|result| result.confidence >= min_confidence)
        .filter_map(|mut result| {
            result.text = normalize(&result.text, result.class);
            (!result.text.trim().is_empty()).then_some(result)
        })
        .collect();
    log::debug!("Filtered {total} results down to {}", kept.len());
    kept
}

/// Split results by class, each list sorted by frame.
fn per_class_sorted(results: Vec<RecognitionResult>) -> Vec<Vec<RecognitionResult>> {
    MarkerClass::ALL
        .into_iter()
        .map(|class| {
            let mut members: Vec<RecognitionResult> = results
                .iter()
                .filter(|result| result.class == class)
                .cloned()
                .collect();
            members.sort_by_key(|result| result.frame_index);
            members
        })
        .collect()
}

fn sort_events(events: &mut [CanonicalEvent]) {
    events.sort_by(|a, b| {
        a.frame_index
            .cmp(&b.frame_index)
            .then_with(|| a.class.cmp(&b.class))
    });
}

/// Highest confidence, ties broken by larger pixel score. First wins.
fn best_by_pixels(group: &[RecognitionResult]) -> Option<&RecognitionResult> {
    group.iter().reduce(|best, candidate| {
        let better = candidate.confidence > best.confidence
            || (candidate.confidence == best.confidence && candidate.pixel_score > best.pixel_score);
        if better { candidate } else { best }
    })
}

/// Highest confidence; among reads within [`CONFIDENCE_TIE`] of it, the
/// longest trimmed text. First wins.
fn best_by_text(group: &[RecognitionResult]) -> Option<&RecognitionResult> {
    let top = group
        .iter()
        .map(|result| result.confidence)
        .fold(f64::NEG_INFINITY, f64::max);
    group
        .iter()
        .filter(|result| (top - result.confidence).abs() < CONFIDENCE_TIE)
        .reduce(|best, candidate| {
            if candidate.text.trim().chars().count() > best.text.trim().chars().count() {
                candidate
            } else {
                best
            }
        })
}

/// Group results that follow each other within `threshold_seconds`.
///
/// Each group becomes one event at its best member's own frame.
pub fn dedup_time_window(
    results: Vec<RecognitionResult>,
    threshold_seconds: f64,
    frames_per_second: f64,
) -> Vec<CanonicalEvent> {
    let total = results.len();
    let max_gap = (threshold_seconds * frames_per_second).max(0.0);
    let mut events = Vec::new();

    for members in per_class_sorted(results) {
        let mut start = 0;
        while start < members.len() {
            let mut end = start + 1;
            while end < members.len()
                && (members[end].frame_index - members[end - 1].frame_index) as f64 <= max_gap
            {
                end += 1;
            }
            let group = &members[start..end];
            if let Some(best) = best_by_pixels(group) {
                events.push(CanonicalEvent::from_group(best, best, group.len()));
            }
            start = end;
        }
    }

    sort_events(&mut events);
    log::debug!("Time-window grouping: {total} results -> {} events", events.len());
    events
}

/// Whether `candidate` is spatially continuous with the run started by `seed`.
///
/// Two results without boxes are continuous; one missing box breaks the run.
fn spatially_continuous(seed: &RecognitionResult, candidate: &RecognitionResult, iou_threshold: f64) -> bool {
    match (&seed.bounding_box, &candidate.bounding_box) {
        (Some(a), Some(b)) => iou(a, b) >= iou_threshold,
        (None, None) => true,
        _ => false,
    }
}

/// Collapse runs that are continuous in time and space.
///
/// A run grows while the next result of the same class is at most
/// `max_frame_gap` frames after the run's last member and overlaps the run's
/// first member by at least `iou_threshold`. Runs shorter than
/// `min_run_length` are dropped. A kept run becomes one event with the text
/// of its best read and the frame and timecode of its first member.
///
/// # Example
///
/// ```
/// use markscan::{BoundingBox, MarkerClass, RecognitionResult, dedup_continuous_runs};
///
/// let results: Vec<RecognitionResult> = (100..112)
///     .map(|frame| RecognitionResult {
///         frame_index: frame,
///         timecode: String::new(),
///         class: MarkerClass::Vfx,
///         text: "VFX:SH010".to_string(),
///         confidence: 0.9,
///         pixel_score: 1000,
///         bounding_box: Some(BoundingBox::new(0.0, 0.0, 200.0, 30.0)),
///         raw_items: Vec::new(),
///     })
///     .collect();
///
/// let events = dedup_continuous_runs(results, 3, 0.8, 10);
/// assert_eq!(events.len(), 1);
/// assert_eq!(events[0].frame_index, 100);
/// ```
pub fn dedup_continuous_runs(
    results: Vec<RecognitionResult>,
    max_frame_gap: u64,
    iou_threshold: f64,
    min_run_length: usize,
) -> Vec<CanonicalEvent> {
    let total = results.len();
    let mut events = Vec::new();

    for members in per_class_sorted(results) {
        let mut start = 0;
        while start < members.len() {
            let seed = &members[start];
            let mut end = start + 1;
            while end < members.len()
                && members[end].frame_index - members[end - 1].frame_index <= max_frame_gap
                && spatially_continuous(seed, &members[end], iou_threshold)
            {
                end += 1;
            }

            let run = &members[start..end];
            if run.len() >= min_run_length.max(1) {
                if let Some(best) = best_by_text(run) {
                    log::debug!(
                        "Collapsed {} {} results into frame {}",
                        run.len(),
                        seed.class,
                        seed.frame_index
                    );
                    events.push(CanonicalEvent::from_group(best, seed, run.len()));
                }
            } else {
                log::debug!(
                    "Dropped short {} run of {} at frame {}",
                    seed.class,
                    run.len(),
                    seed.frame_index
                );
            }
            start = end;
        }
    }

    sort_events(&mut events);
    log::debug!("Continuous-run grouping: {total} results -> {} events", events.len());
    events
}

/// Jaccard similarity of the lower-cased character sets of two texts.
///
/// 0 when either text is empty.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<char> = a.to_lowercase().chars().collect();
    let b: HashSet<char> = b.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / a.union(&b).count() as f64
}

/// Merge events of one class with near-identical text within `window_frames`.
///
/// Each event absorbs every later unclaimed event that is similar to it;
/// the group keeps its best member (confidence, then pixel score).
pub fn merge_similar_texts(events: Vec<CanonicalEvent>, window_frames: u64) -> Vec<CanonicalEvent> {
    let total = events.len();
    let mut claimed = vec![false; events.len()];
    let mut merged = Vec::new();

    for (index, event) in events.iter().enumerate() {
        if claimed[index] {
            continue;
        }
        let mut best = event;
        let mut occurrences = event.occurrences;

        for (other_index, other) in events.iter().enumerate().skip(index + 1) {
            if claimed[other_index]
                || other.class != event.class
                || other.frame_index.abs_diff(event.frame_index) > window_frames
                || text_similarity(&event.text, &other.text) < SIMILAR_TEXT_THRESHOLD
            {
                continue;
            }
            claimed[other_index] = true;
            occurrences += other.occurrences;
            if other.confidence > best.confidence
                || (other.confidence == best.confidence && other.pixel_score > best.pixel_score)
            {
                best = other;
            }
        }

        merged.push(CanonicalEvent {
            occurrences,
            ..best.clone()
        });
    }

    sort_events(&mut merged);
    log::debug!("Similar-text merge: {total} events -> {}", merged.len());
    merged
}

/// The full post-recognition pipeline: filter, normalise, deduplicate.
pub fn postprocess(
    results: Vec<RecognitionResult>,
    options: &ScanOptions,
    frames_per_second: f64,
) -> Vec<CanonicalEvent> {
    let filtered = filter_results(results, options.min_confidence);

    match options.dedup {
        DedupStrategy::ContinuousRun {
            max_frame_gap,
            iou_threshold,
            min_run_length,
        } => dedup_continuous_runs(filtered, max_frame_gap, iou_threshold, min_run_length),
        DedupStrategy::TimeWindow {
            threshold_seconds,
            merge_similar,
        } => {
            let events = dedup_time_window(filtered, threshold_seconds, frames_per_second);
            if merge_similar {
                merge_similar_texts(events, frames_per_second.round() as u64)
            } else {
                events
            }
        }
    }
}
