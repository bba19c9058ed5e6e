//! Sequential preprocessing: frames in, recognition tasks out.
//!
//! This is the only stateful stage of a scan. Frames are walked strictly in
//! order because the trigger's per-class history carries from one frame to
//! the next.

use std::ops::Range;

use crate::{
    classifier::FrameClassifier,
    configuration::ScanOptions,
    error::ScanError,
    lut::ColorTransform,
    progress::{OperationType, ProgressTracker},
    source::FrameSource,
    task::RecognitionTask,
    timecode::frame_to_timecode,
    trigger::TriggerState,
};

/// Output of the preprocessing walk.
#[derive(Debug, Clone, Default)]
pub struct StagedTasks {
    /// Tasks in frame order.
    pub tasks: Vec<RecognitionTask>,
    /// Frames actually decoded and classified.
    pub frames_processed: u64,
}

/// Walk `range` of `source` and queue a task for every trigger fire.
///
/// Each fired region is passed through `transform` when one is given; a
/// transform failure keeps the uncorrected region. A region that cannot be
/// encoded is logged and dropped.
///
/// # Errors
///
/// Only errors from the source itself (for example a decoder that cannot
/// be created) are returned.
pub fn stage_tasks(
    source: &mut dyn FrameSource,
    range: Range<u64>,
    options: &ScanOptions,
    transform: Option<&dyn ColorTransform>,
) -> Result<StagedTasks, ScanError> {
    let frames_per_second = source.info().frames_per_second;
    let classifier = FrameClassifier::new(options);
    let mut trigger = TriggerState::new(options.thresholds.clone(), frames_per_second);
    let mut tracker = ProgressTracker::new(
        options.progress.clone(),
        OperationType::Preprocessing,
        Some(range.end.saturating_sub(range.start)),
        options.progress_interval,
    );

    let mut staged = StagedTasks::default();

    source.for_each_frame(range, &mut |frame| {
        let classification = classifier.classify(&frame.image);
        let fired = trigger.observe_frame(classification.scores);

        for candidate in classification
            .candidates
            .iter()
            .filter(|candidate| fired.contains(&candidate.class))
        {
            let corrected = transform.and_then(|lut| match lut.apply(&candidate.region) {
                Ok(region) => Some(region),
                Err(error) => {
                    log::warn!(
                        "Colour correction failed for frame {}, using the original region: {error}",
                        frame.index
                    );
                    None
                }
            });
            let region = corrected.as_ref().unwrap_or(&candidate.region);

            match RecognitionTask::new(
                frame.index,
                frame_to_timecode(frame.index, frames_per_second),
                candidate.class,
                region,
                candidate.pixel_score,
            ) {
                Ok(task) => {
                    log::debug!(
                        "Triggered {} at frame {} ({} px)",
                        task.class,
                        task.frame_index,
                        task.pixel_score
                    );
                    staged.tasks.push(task);
                }
                Err(error) => log::warn!("Dropping region: {error}"),
            }
        }

        staged.frames_processed += 1;
        tracker.advance(Some(frame.index));
        Ok(())
    })?;

    tracker.finish();
    log::info!(
        "Preprocessed {} frames, staged {} recognition tasks",
        staged.frames_processed,
        staged.tasks.len()
    );

    Ok(staged)
}
