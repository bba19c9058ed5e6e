//! Event log output: CSV and JSON.
//!
//! The CSV layout is the interchange format with editorial tools and the
//! marker importer: one row per event with the columns in [`CSV_HEADERS`],
//! confidence to three decimals, UTF-8 with a byte-order mark so
//! spreadsheet applications detect the encoding.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{classifier::MarkerClass, dedup::CanonicalEvent, error::ScanError};

/// Column names, in order.
pub const CSV_HEADERS: [&str; 6] = ["frame", "timecode", "text", "pixel_count", "confidence", "class"];

const BOM: &str = "\u{feff}";

/// Summary figures for a list of events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// Number of events.
    pub total: usize,
    /// VFX events.
    pub vfx_count: usize,
    /// DI events.
    pub di_count: usize,
    /// Mean confidence, 0 when there are no events.
    pub average_confidence: f64,
    /// First and last event frame.
    pub frame_range: Option<(u64, u64)>,
}

impl ScanStatistics {
    /// Compute statistics over `events`.
    pub fn from_events(events: &[CanonicalEvent]) -> Self {
        if events.is_empty() {
            return Self::default();
        }
        let count_of = |class| events.iter().filter(|event| event.class == class).count();
        let first = events.iter().map(|event| event.frame_index).min();
        let last = events.iter().map(|event| event.frame_index).max();

        Self {
            total: events.len(),
            vfx_count: count_of(MarkerClass::Vfx),
            di_count: count_of(MarkerClass::Di),
            average_confidence: events.iter().map(|event| event.confidence).sum::<f64>()
                / events.len() as f64,
            frame_range: first.zip(last),
        }
    }
}

/// The JSON document written by [`write_json_summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Source video, if known.
    pub video: Option<String>,
    /// Frame rate used for timecodes.
    pub frames_per_second: f64,
    /// Aggregate figures.
    pub statistics: ScanStatistics,
    /// Every event, in frame order.
    pub events: Vec<CanonicalEvent>,
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Write events as CSV, header and byte-order mark included.
pub fn write_csv<W: Write>(mut writer: W, events: &[CanonicalEvent]) -> Result<(), ScanError> {
    write!(writer, "{BOM}")?;
    writeln!(writer, "{}", CSV_HEADERS.join(","))?;
    for event in events {
        writeln!(
            writer,
            "{},{},{},{},{:.3},{}",
            event.frame_index,
            escape_field(&event.timecode),
            escape_field(&event.text),
            event.pixel_score,
            event.confidence,
            event.class,
        )?;
    }
    writer.flush()?;
    Ok(())
}

/// Write events to a CSV file, replacing it if it exists.
pub fn save_csv<P: AsRef<Path>>(path: P, events: &[CanonicalEvent]) -> Result<(), ScanError> {
    let file = File::create(path.as_ref())?;
    write_csv(BufWriter::new(file), events)?;
    log::info!("Wrote {} events to {}", events.len(), path.as_ref().display());
    Ok(())
}

/// One parsed CSV record with the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecord {
    /// 1-based line number of the record's first line.
    pub line: usize,
    /// Unquoted field values.
    pub fields: Vec<String>,
}

/// Split CSV text into records.
///
/// Handles a leading byte-order mark, quoted fields with doubled quotes,
/// and line breaks inside quotes. Blank lines are skipped.
///
/// # Errors
///
/// Returns [`ScanError::CsvError`] for a quote left open at end of input.
pub fn parse_csv(text: &str) -> Result<Vec<CsvRecord>, ScanError> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                if !(fields.len() == 1 && fields[0].is_empty()) {
                    records.push(CsvRecord {
                        line: record_line,
                        fields: std::mem::take(&mut fields),
                    });
                }
                fields.clear();
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ScanError::CsvError {
            line: record_line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(CsvRecord {
            line: record_line,
            fields,
        });
    }

    Ok(records)
}

fn event_from_record(record: &CsvRecord) -> Result<CanonicalEvent, ScanError> {
    let bad = |reason: String| ScanError::CsvError {
        line: record.line,
        reason,
    };
    let [frame, timecode, text, pixel_count, confidence, class] = record.fields.as_slice() else {
        return Err(bad(format!(
            "expected {} fields, found {}",
            CSV_HEADERS.len(),
            record.fields.len()
        )));
    };

    Ok(CanonicalEvent {
        frame_index: frame
            .trim()
            .parse()
            .map_err(|_| bad(format!("invalid frame '{frame}'")))?,
        timecode: timecode.clone(),
        class: class.parse().map_err(bad)?,
        text: text.clone(),
        confidence: confidence
            .trim()
            .parse()
            .map_err(|_| bad(format!("invalid confidence '{confidence}'")))?,
        pixel_score: pixel_count
            .trim()
            .parse()
            .map_err(|_| bad(format!("invalid pixel count '{pixel_count}'")))?,
        bounding_box: None,
        occurrences: 1,
    })
}

/// Parse CSV text written by [`write_csv`] back into events.
///
/// # Errors
///
/// Returns [`ScanError::CsvError`] naming the first malformed line.
pub fn read_csv(text: &str) -> Result<Vec<CanonicalEvent>, ScanError> {
    parse_csv(text)?
        .iter()
        .skip(1)
        .map(event_from_record)
        .collect()
}

/// Read a CSV event log from disk.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<CanonicalEvent>, ScanError> {
    read_csv(&fs::read_to_string(path)?)
}

/// Write a JSON summary of `events`.
pub fn write_json_summary<P: AsRef<Path>>(path: P, summary: &ScanSummary) -> Result<(), ScanError> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    writer.flush()?;
    log::info!("Wrote JSON summary to {}", path.as_ref().display());
    Ok(())
}
