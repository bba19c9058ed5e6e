//! Text recognition.
//!
//! The recognition engine is a black box that turns one image into zero or
//! more text items, each with a confidence and optionally the quadrilateral
//! it was read from. [`TextRecognizer`] is that box. Two engines ship with
//! the crate:
//!
//! - [`StubRecognizer`] returns a single low-confidence placeholder and is
//!   used whenever no real engine is configured or installed.
//! - [`CommandRecognizer`] runs an external OCR program on a temporary PNG
//!   and reads its answer as JSON from stdout.
//!
//! Recognisers are not shared between threads. A [`RecognizerFactory`]
//! builds a fresh one for every batch, so each worker owns its engine.

use std::{
    env,
    ffi::OsString,
    fmt::{Debug, Formatter, Result as FmtResult},
    io::{Cursor, Write},
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{
    classifier::MarkerClass, error::ScanError, geometry::BoundingBox, task::RecognitionTask,
};

/// Text the stub engine returns for every image.
pub const STUB_TEXT: &str = "UNRECOGNIZED";

/// Confidence the stub engine reports.
pub const STUB_CONFIDENCE: f64 = 0.1;

/// One piece of text read from an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedItem {
    /// The text as read.
    pub text: String,
    /// Engine confidence, 0–1.
    pub confidence: f64,
    /// Corner points of the text, usually four, in region pixels.
    #[serde(default, rename = "box", skip_serializing_if = "Option::is_none")]
    pub quad: Option<Vec<[f64; 2]>>,
}

impl RecognizedItem {
    /// An item without position information.
    pub fn new<S: Into<String>>(text: S, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
            quad: None,
        }
    }

    /// Attach the points the text was read from.
    #[must_use]
    pub fn with_quad(mut self, quad: Vec<[f64; 2]>) -> Self {
        self.quad = Some(quad);
        self
    }

    /// Axis-aligned box around the quad, if there is one.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.quad.as_deref().and_then(BoundingBox::from_points)
    }
}

/// A text recognition engine.
pub trait TextRecognizer {
    /// Read all text in `image`.
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedItem>, ScanError>;
}

/// Recognition output for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Frame the region was cut from.
    pub frame_index: u64,
    /// `HH:MM:SS:FF` of that frame.
    pub timecode: String,
    /// Colour class of the region.
    pub class: MarkerClass,
    /// Text of all items, concatenated in engine order.
    pub text: String,
    /// Mean confidence of the items.
    pub confidence: f64,
    /// Classifier score that fired the trigger.
    pub pixel_score: u64,
    /// Union of the item boxes, when the engine reports positions.
    pub bounding_box: Option<BoundingBox>,
    /// The engine's items, trimmed.
    pub raw_items: Vec<RecognizedItem>,
}

/// Placeholder engine for hosts without OCR.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubRecognizer;

impl TextRecognizer for StubRecognizer {
    fn recognize(&mut self, _image: &RgbImage) -> Result<Vec<RecognizedItem>, ScanError> {
        Ok(vec![RecognizedItem::new(STUB_TEXT, STUB_CONFIDENCE)])
    }
}

/// Runs an external OCR program once per image.
///
/// The program is called as `program [args...] <image.png>` and must print a
/// JSON array to stdout:
///
/// ```json
/// [{"text": "VFX:SH010 comp", "confidence": 0.97, "box": [[4,2],[180,2],[180,30],[4,30]]}]
/// ```
///
/// `box` may be omitted. The PNG is written to a temporary file that is
/// removed once the program exits.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRecognizer {
    /// Wrap `program`, passing `args` before the image path.
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl TextRecognizer for CommandRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedItem>, ScanError> {
        let mut file = tempfile::Builder::new()
            .prefix("markscan-region-")
            .suffix(".png")
            .tempfile()?;
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        file.write_all(&png)?;
        file.flush()?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .output()
            .map_err(|error| {
                ScanError::RecognitionError(format!("{}: {error}", self.program.display()))
            })?;

        if !output.status.success() {
            return Err(ScanError::RecognitionError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(stdout.trim())?)
    }
}

type BuildRecognizer = dyn Fn() -> Result<Box<dyn TextRecognizer>, ScanError> + Send + Sync;

/// Builds a recogniser for each batch.
///
/// # Example
///
/// ```
/// use markscan::{RecognizedItem, RecognizerFactory, StubRecognizer, TextRecognizer};
///
/// let factory = RecognizerFactory::new("stub", || Ok(Box::new(StubRecognizer)));
/// let mut recognizer = factory.create().unwrap();
/// let items = recognizer.recognize(&image::RgbImage::new(8, 8)).unwrap();
/// assert_eq!(items.len(), 1);
/// ```
#[derive(Clone)]
pub struct RecognizerFactory {
    name: String,
    build: Arc<BuildRecognizer>,
}

impl Debug for RecognizerFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RecognizerFactory")
            .field("name", &self.name)
            .finish()
    }
}

impl RecognizerFactory {
    /// Wrap a constructor closure. `name` is used in logs.
    pub fn new<S, F>(name: S, build: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Result<Box<dyn TextRecognizer>, ScanError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            build: Arc::new(build),
        }
    }

    /// The placeholder engine.
    pub fn stub() -> Self {
        Self::new("stub", || Ok(Box::new(StubRecognizer)))
    }

    /// An external program engine.
    pub fn command<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        let program = program.into();
        let name = program.display().to_string();
        Self::new(name, move || {
            Ok(Box::new(CommandRecognizer::new(program.clone(), args.clone())))
        })
    }

    /// Choose an engine by program name.
    ///
    /// `None` selects the stub. A program that cannot be found on disk or on
    /// `PATH` also falls back to the stub, with a warning.
    pub fn from_engine(program: Option<&str>) -> Self {
        let Some(program) = program.filter(|program| !program.trim().is_empty()) else {
            log::info!("No recognition engine configured; using placeholder recognition");
            return Self::stub();
        };

        match locate_program(Path::new(program)) {
            Some(path) => {
                log::debug!("Using recognition engine {}", path.display());
                Self::command(path, Vec::new())
            }
            None => {
                log::warn!(
                    "{}",
                    ScanError::EngineUnavailable(format!(
                        "{program} not found; using placeholder recognition"
                    ))
                );
                Self::stub()
            }
        }
    }

    /// Engine name for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build one recogniser.
    ///
    /// # Errors
    ///
    /// Whatever the constructor returns, typically
    /// [`ScanError::EngineUnavailable`].
    pub fn create(&self) -> Result<Box<dyn TextRecognizer>, ScanError> {
        (self.build)()
    }
}

fn locate_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }

    let search_path = env::var_os("PATH").unwrap_or_else(OsString::new);
    env::split_paths(&search_path)
        .map(|directory| directory.join(program))
        .flat_map(|candidate| {
            let with_extension = (!env::consts::EXE_EXTENSION.is_empty())
                .then(|| candidate.with_extension(env::consts::EXE_EXTENSION));
            std::iter::once(candidate).chain(with_extension)
        })
        .find(|candidate| candidate.is_file())
}

/// Run one task through a recogniser.
///
/// Items are trimmed and empty ones dropped. The rest are concatenated into
/// the result text, their confidences averaged and their boxes merged.
/// Returns `Ok(None)` when nothing readable is left.
///
/// # Errors
///
/// Returns an error if the region cannot be decoded or the engine fails.
pub fn recognize_task(
    recognizer: &mut dyn TextRecognizer,
    task: &RecognitionTask,
) -> Result<Option<RecognitionResult>, ScanError> {
    let region = task.decode_region()?;
    let items: Vec<RecognizedItem> = recognizer
        .recognize(&region)?
        .into_iter()
        .map(|item| RecognizedItem {
            text: item.text.trim().to_string(),
            ..item
        })
        .filter(|item| !item.text.is_empty())
        .collect();

    if items.is_empty() {
        log::debug!("No text recognised in frame {} ({})", task.frame_index, task.class);
        return Ok(None);
    }

    let text: String = items.iter().map(|item| item.text.as_str()).collect();
    let confidence = items.iter().map(|item| item.confidence).sum::<f64>() / items.len() as f64;
    let bounding_box = items
        .iter()
        .filter_map(RecognizedItem::bounding_box)
        .reduce(|merged, bbox| merged.union(&bbox));

    log::debug!(
        "Recognised frame {} ({}, {} px, confidence {confidence:.2}): {text}",
        task.frame_index,
        task.class,
        task.pixel_score,
    );

    Ok(Some(RecognitionResult {
        frame_index: task.frame_index,
        timecode: task.timecode.clone(),
        class: task.class,
        text,
        confidence,
        pixel_score: task.pixel_score,
        bounding_box,
        raw_items: items,
    }))
}
