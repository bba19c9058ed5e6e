//! Timeline marker replay.
//!
//! Editing hosts represent review notes as coloured markers on a timeline.
//! [`MarkerSink`] is the narrow interface this crate needs from such a host:
//! add, delete and list markers. Connecting to a particular host is left to
//! the sink implementation; [`InMemoryMarkerStore`] is a complete sink that
//! keeps markers in memory, which is what the CLI uses to preview an import.

use std::{
    collections::{BTreeMap, btree_map::Entry},
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    classifier::MarkerClass,
    dedup::CanonicalEvent,
    error::ScanError,
    export::{CSV_HEADERS, parse_csv},
};

/// Default marker length in frames.
pub const DEFAULT_MARKER_DURATION: f64 = 1.0;

/// Marker colours understood by common editing hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarkerColor {
    Blue,
    Cyan,
    Green,
    Yellow,
    Red,
    Pink,
    Purple,
    Fuchsia,
    Rose,
    Lavender,
    Sky,
    Mint,
    Lemon,
    Sand,
    Cocoa,
    Cream,
    Orange,
    Magenta,
}

impl MarkerColor {
    /// Green for VFX, yellow for DI.
    pub fn for_class(class: MarkerClass) -> Self {
        match class {
            MarkerClass::Vfx => MarkerColor::Green,
            MarkerClass::Di => MarkerColor::Yellow,
        }
    }
}

impl Display for MarkerColor {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.pad(&format!("{self:?}"))
    }
}

impl FromStr for MarkerColor {
    type Err = ScanError;

    /// Parses colour names case-insensitively and class labels to their
    /// class colour.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Ok(class) = value.parse::<MarkerClass>() {
            return Ok(MarkerColor::for_class(class));
        }
        let color = match value.trim().to_ascii_lowercase().as_str() {
            "blue" => MarkerColor::Blue,
            "cyan" => MarkerColor::Cyan,
            "green" => MarkerColor::Green,
            "yellow" => MarkerColor::Yellow,
            "red" => MarkerColor::Red,
            "pink" => MarkerColor::Pink,
            "purple" => MarkerColor::Purple,
            "fuchsia" => MarkerColor::Fuchsia,
            "rose" => MarkerColor::Rose,
            "lavender" => MarkerColor::Lavender,
            "sky" => MarkerColor::Sky,
            "mint" => MarkerColor::Mint,
            "lemon" => MarkerColor::Lemon,
            "sand" => MarkerColor::Sand,
            "cocoa" => MarkerColor::Cocoa,
            "cream" => MarkerColor::Cream,
            "orange" => MarkerColor::Orange,
            "magenta" => MarkerColor::Magenta,
            _ => return Err(ScanError::MarkerError(format!("unknown marker colour '{value}'"))),
        };
        Ok(color)
    }
}

/// Which markers a colour-based delete applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSelector {
    /// Every marker.
    All,
    /// Markers of one colour.
    Only(MarkerColor),
}

impl ColorSelector {
    fn matches(self, color: MarkerColor) -> bool {
        match self {
            ColorSelector::All => true,
            ColorSelector::Only(selected) => selected == color,
        }
    }
}

impl FromStr for ColorSelector {
    type Err = ScanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("all") {
            Ok(ColorSelector::All)
        } else {
            value.parse().map(ColorSelector::Only)
        }
    }
}

/// A timeline marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Timeline frame.
    pub frame: u64,
    /// Display colour.
    pub color: MarkerColor,
    /// Short title.
    pub name: String,
    /// Free-text note.
    pub note: String,
    /// Length in frames.
    pub duration: f64,
    /// Opaque data for round-tripping.
    pub custom_data: String,
}

impl Marker {
    /// A one-frame marker.
    pub fn new<N: Into<String>, T: Into<String>>(frame: u64, color: MarkerColor, name: N, note: T) -> Self {
        Self {
            frame,
            color,
            name: name.into(),
            note: note.into(),
            duration: DEFAULT_MARKER_DURATION,
            custom_data: String::new(),
        }
    }

    /// The marker an event replays as: class colour, class label as the
    /// name, caption text as the note.
    pub fn from_event(event: &CanonicalEvent) -> Self {
        Self::new(
            event.frame_index,
            MarkerColor::for_class(event.class),
            event.class.label(),
            event.text.clone(),
        )
    }
}

/// Result of a range delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RangeDeletion {
    /// Markers removed.
    pub deleted: usize,
    /// Markers that were in the range.
    pub total_found: usize,
}

/// Marker counts per colour.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarkerSummary {
    /// Number of markers.
    pub total: usize,
    /// Count per colour name.
    pub colors: BTreeMap<String, usize>,
    /// First and last marker frame.
    pub frame_range: Option<(u64, u64)>,
}

/// A host timeline that accepts markers.
pub trait MarkerSink {
    /// Add a marker. Fails if the host rejects it, for example because a
    /// marker already sits on that frame.
    fn add_marker(&mut self, marker: Marker) -> Result<(), ScanError>;

    /// Delete the marker on `frame`. Returns whether there was one.
    fn delete_marker_at_frame(&mut self, frame: u64) -> Result<bool, ScanError>;

    /// Delete markers by colour. Returns how many were removed.
    fn delete_markers_by_color(&mut self, selector: ColorSelector) -> Result<usize, ScanError>;

    /// Every marker, by frame.
    fn markers(&self) -> Result<Vec<Marker>, ScanError>;

    /// Delete every marker with `start <= frame <= end`.
    fn delete_markers_in_range(&mut self, start: u64, end: u64) -> Result<RangeDeletion, ScanError> {
        let frames: Vec<u64> = self
            .markers()?
            .into_iter()
            .map(|marker| marker.frame)
            .filter(|frame| (start..=end).contains(frame))
            .collect();

        let mut result = RangeDeletion {
            deleted: 0,
            total_found: frames.len(),
        };
        for frame in frames {
            if self.delete_marker_at_frame(frame)? {
                result.deleted += 1;
            }
        }
        Ok(result)
    }

    /// Counts per colour and the frame range.
    fn summary(&self) -> Result<MarkerSummary, ScanError> {
        let markers = self.markers()?;
        let mut summary = MarkerSummary {
            total: markers.len(),
            ..MarkerSummary::default()
        };
        for marker in &markers {
            *summary.colors.entry(marker.color.to_string()).or_default() += 1;
        }
        let first = markers.iter().map(|marker| marker.frame).min();
        let last = markers.iter().map(|marker| marker.frame).max();
        summary.frame_range = first.zip(last);
        Ok(summary)
    }
}

/// Markers kept in memory, at most one per frame.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarkerStore {
    markers: BTreeMap<u64, Marker>,
}

impl InMemoryMarkerStore {
    /// An empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether there are no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

impl MarkerSink for InMemoryMarkerStore {
    fn add_marker(&mut self, marker: Marker) -> Result<(), ScanError> {
        match self.markers.entry(marker.frame) {
            Entry::Occupied(_) => Err(ScanError::MarkerError(format!(
                "a marker already exists at frame {}",
                marker.frame
            ))),
            Entry::Vacant(slot) => {
                slot.insert(marker);
                Ok(())
            }
        }
    }

    fn delete_marker_at_frame(&mut self, frame: u64) -> Result<bool, ScanError> {
        Ok(self.markers.remove(&frame).is_some())
    }

    fn delete_markers_by_color(&mut self, selector: ColorSelector) -> Result<usize, ScanError> {
        let before = self.markers.len();
        self.markers.retain(|_, marker| !selector.matches(marker.color));
        Ok(before - self.markers.len())
    }

    fn markers(&self) -> Result<Vec<Marker>, ScanError> {
        Ok(self.markers.values().cloned().collect())
    }
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Markers added.
    pub success: usize,
    /// Rows or events that could not be added.
    pub failed: usize,
    /// Rows or events attempted.
    pub total: usize,
}

impl ImportSummary {
    fn record(&mut self, outcome: Result<(), ScanError>) {
        self.total += 1;
        match outcome {
            Ok(()) => self.success += 1,
            Err(error) => {
                log::warn!("{error}");
                self.failed += 1;
            }
        }
    }
}

/// Add one marker per event.
pub fn import_events(sink: &mut dyn MarkerSink, events: &[CanonicalEvent]) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for event in events {
        summary.record(sink.add_marker(Marker::from_event(event)));
    }
    summary
}

/// Replay a CSV event log onto `sink`.
///
/// Uses the frame, text and class columns. Rows too short to hold them are
/// skipped; rows whose frame does not parse count as failed. Classes other
/// than VFX and DI become blue markers named after the class column.
///
/// # Errors
///
/// Only a CSV that cannot be tokenised at all is an error.
pub fn import_csv(sink: &mut dyn MarkerSink, text: &str) -> Result<ImportSummary, ScanError> {
    const FRAME: usize = 0;
    const NOTE: usize = 2;
    const CLASS: usize = 5;

    let mut summary = ImportSummary::default();
    for record in parse_csv(text)?.iter().skip(1) {
        if record.fields.len() < CSV_HEADERS.len() {
            log::warn!("Skipping short CSV row on line {}", record.line);
            continue;
        }

        let note = record.fields[NOTE].trim();
        let kind = record.fields[CLASS].trim();
        let outcome = parse_frame(&record.fields[FRAME])
            .ok_or_else(|| {
                ScanError::CsvError {
                    line: record.line,
                    reason: format!("invalid frame '{}'", record.fields[FRAME]),
                }
            })
            .and_then(|frame| {
                let marker = match kind.parse::<MarkerClass>() {
                    Ok(class) => Marker::new(frame, MarkerColor::for_class(class), class.label(), note),
                    Err(_) => Marker::new(frame, MarkerColor::Blue, kind, note),
                };
                sink.add_marker(marker)
            });
        summary.record(outcome);
    }

    log::info!(
        "Imported {} of {} markers ({} failed)",
        summary.success,
        summary.total,
        summary.failed
    );
    Ok(summary)
}

fn parse_frame(field: &str) -> Option<u64> {
    let field = field.trim();
    field.parse::<u64>().ok().or_else(|| {
        field
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite() && *value >= 0.0 && value.fract() == 0.0)
            .map(|value| value as u64)
    })
}
