//! Batched recognition over a bounded worker pool.
//!
//! Staged tasks are cut into fixed-size batches. Every batch builds its own
//! recogniser from the [`RecognizerFactory`], so workers share no engine
//! state, and every batch is isolated: an engine that fails to start, an
//! error, or a panic inside one batch is logged and costs only that batch's
//! results.
//!
//! Results come back in no particular order. Each carries its own frame
//! index and deduplication sorts before grouping.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

use rayon::{
    ThreadPoolBuilder,
    iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator},
};

use crate::{
    error::ScanError,
    progress::{OperationType, ProgressCallback, ProgressTracker},
    recognition::{RecognitionResult, RecognizerFactory, recognize_task},
    task::RecognitionTask,
};

/// How to run the recognition stage.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Tasks per batch.
    pub batch_size: usize,
    /// Pool width. Ignored when `parallel` is false.
    pub max_workers: usize,
    /// Use the worker pool instead of the calling thread.
    pub parallel: bool,
}

/// Recognise every task, batch by batch.
///
/// # Example
///
/// ```
/// use markscan::{BatchSettings, RecognizerFactory, recognize_batches};
///
/// let settings = BatchSettings { batch_size: 20, max_workers: 3, parallel: false };
/// let results = recognize_batches(&[], &RecognizerFactory::stub(), &settings, None);
/// assert!(results.is_empty());
/// ```
pub fn recognize_batches(
    tasks: &[RecognitionTask],
    factory: &RecognizerFactory,
    settings: &BatchSettings,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Vec<RecognitionResult> {
    if tasks.is_empty() {
        return Vec::new();
    }

    let batches: Vec<&[RecognitionTask]> = tasks.chunks(settings.batch_size.max(1)).collect();
    let tracker = progress.map(|callback| {
        Mutex::new(ProgressTracker::new(
            callback,
            OperationType::Recognition,
            Some(batches.len() as u64),
            1,
        ))
    });

    let run = |(batch_index, batch): (usize, &&[RecognitionTask])| {
        let results = run_isolated(batch_index, batch, factory);
        if let Some(tracker) = &tracker {
            if let Ok(mut tracker) = tracker.lock() {
                tracker.advance(None);
            }
        }
        results
    };

    let per_batch: Vec<Vec<RecognitionResult>> = if settings.parallel {
        let workers = settings.max_workers.max(1);
        match ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("markscan-ocr-{index}"))
            .build()
        {
            Ok(pool) => {
                log::info!(
                    "Recognising {} tasks in {} batches on {workers} workers ({})",
                    tasks.len(),
                    batches.len(),
                    factory.name()
                );
                pool.install(|| batches.par_iter().enumerate().map(run).collect())
            }
            Err(error) => {
                log::warn!("Could not start the worker pool, recognising sequentially: {error}");
                batches.iter().enumerate().map(run).collect()
            }
        }
    } else {
        log::info!(
            "Recognising {} tasks in {} batches sequentially ({})",
            tasks.len(),
            batches.len(),
            factory.name()
        );
        batches.iter().enumerate().map(run).collect()
    };

    if let Some(tracker) = &tracker {
        if let Ok(mut tracker) = tracker.lock() {
            tracker.finish();
        }
    }

    let results: Vec<RecognitionResult> = per_batch.into_iter().flatten().collect();
    log::info!("Recognition produced {} results from {} tasks", results.len(), tasks.len());
    results
}

/// Run one batch, turning any failure into an empty result list.
fn run_isolated(
    batch_index: usize,
    batch: &[RecognitionTask],
    factory: &RecognizerFactory,
) -> Vec<RecognitionResult> {
    match panic::catch_unwind(AssertUnwindSafe(|| process_batch(batch, factory))) {
        Ok(Ok(results)) => {
            log::debug!(
                "Batch {batch_index}: {} tasks, {} results",
                batch.len(),
                results.len()
            );
            results
        }
        Ok(Err(error)) => {
            log::warn!("Batch {batch_index} failed, dropping {} tasks: {error}", batch.len());
            Vec::new()
        }
        Err(payload) => {
            log::warn!(
                "Batch {batch_index} panicked, dropping {} tasks: {}",
                batch.len(),
                panic_message(payload.as_ref())
            );
            Vec::new()
        }
    }
}

fn process_batch(
    batch: &[RecognitionTask],
    factory: &RecognizerFactory,
) -> Result<Vec<RecognitionResult>, ScanError> {
    let mut recognizer = factory.create()?;
    let mut results = Vec::with_capacity(batch.len());

    for task in batch {
        match recognize_task(recognizer.as_mut(), task) {
            Ok(Some(result)) => results.push(result),
            Ok(None) => {}
            Err(error) => log::warn!(
                "Recognition failed for frame {} ({}): {error}",
                task.frame_index,
                task.class
            ),
        }
    }

    Ok(results)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
