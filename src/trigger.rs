//! Adaptive per-class trigger.
//!
//! A burned-in caption stays on screen for many frames, and recognising every
//! one of them is wasted work. The trigger keeps a short history of each
//! class's pixel score and fires only on edges: when a caption appears, when
//! it fades, or when it has drifted or gone unchecked for too long.
//!
//! The state is owned by the sequential preprocessing walk and is never
//! shared with recognition workers.

use std::collections::VecDeque;

use crate::{
    classifier::{ClassScores, MarkerClass},
    configuration::DetectionThresholds,
};

/// Recent scores and detection bookkeeping for one class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassHistory {
    /// Most recent scores, oldest first, at most `window_size` long.
    pub scores: VecDeque<u64>,
    /// Score of the last frame that fired.
    pub last_detected_score: u64,
    /// Frames walked since this class last fired.
    pub frames_since_last_detection: u64,
}

impl ClassHistory {
    /// Mean of the stored scores, or 0 when empty.
    pub fn average(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<u64>() as f64 / self.scores.len() as f64
    }

    /// The last `count` stored scores, oldest first.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = u64> + '_ {
        self.scores
            .iter()
            .skip(self.scores.len().saturating_sub(count))
            .copied()
    }

    fn push(&mut self, score: u64, window_size: usize) {
        self.scores.push_back(score);
        while self.scores.len() > window_size {
            self.scores.pop_front();
        }
    }
}

/// Trigger state for both classes.
///
/// Feed every walked frame through [`TriggerState::observe_frame`], in frame
/// order, including frames where neither class is present.
///
/// # Example
///
/// ```
/// use markscan::{ClassScores, DetectionThresholds, MarkerClass, TriggerState};
///
/// let mut trigger = TriggerState::new(DetectionThresholds::default(), 25.0);
/// for _ in 0..5 {
///     assert!(trigger.observe_frame(ClassScores::default()).is_empty());
/// }
///
/// let fired = trigger.observe_frame(ClassScores { vfx: 1000, di: 0 });
/// assert_eq!(fired, vec![MarkerClass::Vfx]);
/// ```
#[derive(Debug, Clone)]
pub struct TriggerState {
    thresholds: DetectionThresholds,
    max_interval_frames: u64,
    vfx: ClassHistory,
    di: ClassHistory,
}

impl TriggerState {
    /// Fresh state for a video played at `frames_per_second`.
    pub fn new(thresholds: DetectionThresholds, frames_per_second: f64) -> Self {
        let max_interval_frames = (thresholds.max_interval_seconds * frames_per_second) as u64;
        Self {
            thresholds,
            max_interval_frames,
            vfx: ClassHistory::default(),
            di: ClassHistory::default(),
        }
    }

    /// Current history of one class.
    pub fn history(&self, class: MarkerClass) -> &ClassHistory {
        match class {
            MarkerClass::Vfx => &self.vfx,
            MarkerClass::Di => &self.di,
        }
    }

    fn history_mut(&mut self, class: MarkerClass) -> &mut ClassHistory {
        match class {
            MarkerClass::Vfx => &mut self.vfx,
            MarkerClass::Di => &mut self.di,
        }
    }

    /// Whether `score` would fire for `class` against the current history.
    ///
    /// Requires a full window of prior scores and a score above the pixel
    /// threshold, then any of: a rising edge, a falling edge, or an elapsed
    /// cooldown combined with a stale or drifted detection.
    pub fn should_fire(&self, class: MarkerClass, score: u64) -> bool {
        let history = self.history(class);
        let t = &self.thresholds;

        if history.scores.len() < t.window_size || score <= t.pixel_threshold {
            return false;
        }

        let score = score as f64;
        let average = history.average();
        let lookback = t.edge_lookback;

        let rising = score > average * t.increase_factor
            && history
                .recent(lookback)
                .all(|previous| score > previous as f64 * t.increase_factor);

        let falling = score < average * t.decrease_factor
            && history
                .recent(lookback)
                .all(|previous| score < previous as f64 * t.decrease_factor);

        let elapsed = history.frames_since_last_detection;
        let last = history.last_detected_score as f64;
        let recheck = elapsed >= t.min_interval_frames
            && (elapsed >= self.max_interval_frames || (score - last).abs() > last * t.drift_ratio);

        rising || falling || recheck
    }

    /// Decide for one class and record its score. Returns whether it fired.
    ///
    /// Does not advance the frame counters; see [`TriggerState::end_frame`].
    pub fn observe(&mut self, class: MarkerClass, score: u64) -> bool {
        let fire = self.should_fire(class, score);
        let window_size = self.thresholds.window_size;

        let history = self.history_mut(class);
        history.push(score, window_size);
        if fire {
            history.last_detected_score = score;
            history.frames_since_last_detection = 0;
        }
        fire
    }

    /// Advance the frames-since-detection counter of both classes.
    pub fn end_frame(&mut self) {
        self.vfx.frames_since_last_detection += 1;
        self.di.frames_since_last_detection += 1;
    }

    /// Observe both classes of one frame and advance the counters.
    ///
    /// Returns the classes that fired, in [`MarkerClass::ALL`] order.
    pub fn observe_frame(&mut self, scores: ClassScores) -> Vec<MarkerClass> {
        let fired = MarkerClass::ALL
            .into_iter()
            .filter(|&class| self.observe(class, scores.get(class)))
            .collect();
        self.end_frame();
        fired
    }
}
