//! CSV and JSON output tests.

use markscan::{
    BoundingBox, CSV_HEADERS, CanonicalEvent, MarkerClass, ScanError, ScanStatistics,
    ScanSummary, load_csv, parse_csv, read_csv, save_csv, write_csv, write_json_summary,
};

fn event(frame: u64, class: MarkerClass, text: &str, confidence: f64) -> CanonicalEvent {
    CanonicalEvent {
        frame_index: frame,
        timecode: markscan::frame_to_timecode(frame, 25.0),
        class,
        text: text.to_string(),
        confidence,
        pixel_score: 1234,
        bounding_box: Some(BoundingBox::new(1.0, 2.0, 3.0, 4.0)),
        occurrences: 3,
    }
}

fn sample_events() -> Vec<CanonicalEvent> {
    vec![
        event(100, MarkerClass::Vfx, "VFX:SH010 sky, clouds", 0.91234),
        event(250, MarkerClass::Di, "DI:\"warmer\" please", 0.5),
        event(900, MarkerClass::Vfx, "VFX:paint out\nboom", 0.75),
    ]
}

fn to_string(events: &[CanonicalEvent]) -> String {
    let mut buffer = Vec::new();
    write_csv(&mut buffer, events).unwrap();
    String::from_utf8(buffer).unwrap()
}

// ── Writing ────────────────────────────────────────────────────────

#[test]
fn csv_starts_with_bom_and_header() {
    let text = to_string(&[]);
    assert!(text.starts_with('\u{feff}'));
    assert_eq!(
        text.trim_start_matches('\u{feff}').trim_end(),
        "frame,timecode,text,pixel_count,confidence,class"
    );
    assert_eq!(CSV_HEADERS.join(","), "frame,timecode,text,pixel_count,confidence,class");
}

#[test]
fn csv_rows_quote_only_when_needed() {
    let text = to_string(&[event(100, MarkerClass::Vfx, "VFX:SH010", 0.91234)]);
    let row = text.lines().nth(1).unwrap();
    assert_eq!(row, "100,00:00:04:00,VFX:SH010,1234,0.912,VFX");

    let text = to_string(&sample_events()[..2]);
    assert!(text.contains("\"VFX:SH010 sky, clouds\""));
    assert!(text.contains("\"DI:\"\"warmer\"\" please\""));
}

// ── Reading ────────────────────────────────────────────────────────

#[test]
fn csv_round_trip_keeps_fields() {
    let events = sample_events();
    let parsed = read_csv(&to_string(&events)).unwrap();

    assert_eq!(parsed.len(), 3);
    for (original, parsed) in events.iter().zip(&parsed) {
        assert_eq!(parsed.frame_index, original.frame_index);
        assert_eq!(parsed.timecode, original.timecode);
        assert_eq!(parsed.text, original.text);
        assert_eq!(parsed.class, original.class);
        assert_eq!(parsed.pixel_score, original.pixel_score);
        assert!((parsed.confidence - original.confidence).abs() < 0.001);
        assert_eq!(parsed.bounding_box, None);
        assert_eq!(parsed.occurrences, 1);
    }
}

#[test]
fn parse_csv_tracks_record_lines() {
    let text = "a,b\n\n\"multi\nline\",x\nlast,row";
    let records = parse_csv(text).unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[1].line, 3);
    assert_eq!(records[1].fields, vec!["multi\nline".to_string(), "x".to_string()]);
    assert_eq!(records[2].line, 5);
}

#[test]
fn parse_csv_handles_crlf() {
    let records = parse_csv("\u{feff}a,b\r\n1,2\r\n").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].fields, vec!["1".to_string(), "2".to_string()]);
}

#[test]
fn unterminated_quote_is_an_error() {
    let result = parse_csv("frame,text\n1,\"open");
    assert!(matches!(result, Err(ScanError::CsvError { line: 2, .. })));
}

#[test]
fn malformed_row_names_its_line() {
    let text = "frame,timecode,text,pixel_count,confidence,class\nabc,00:00:00:00,x,1,0.5,VFX\n";
    match read_csv(text) {
        Err(ScanError::CsvError { line, reason }) => {
            assert_eq!(line, 2);
            assert!(reason.contains("abc"));
        }
        other => panic!("expected a CSV error, got {other:?}"),
    }
}

// ── Files ──────────────────────────────────────────────────────────

#[test]
fn save_and_load_csv_file() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("reel_detected_frames.csv");

    save_csv(&path, &sample_events()).unwrap();
    let loaded = load_csv(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded[2].text, "VFX:paint out\nboom");
}

#[test]
fn json_summary_contains_statistics_and_events() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let path = directory.path().join("summary.json");
    let events = sample_events();
    let summary = ScanSummary {
        video: Some("reel.mov".to_string()),
        frames_per_second: 25.0,
        statistics: ScanStatistics::from_events(&events),
        events,
    };

    write_json_summary(&path, &summary).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(value["video"], "reel.mov");
    assert_eq!(value["statistics"]["total"], 3);
    assert_eq!(value["statistics"]["vfx_count"], 2);
    assert_eq!(value["events"][1]["class"], "DI");
    assert_eq!(value["events"][0]["bounding_box"]["x2"], 3.0);
}

// ── Statistics ─────────────────────────────────────────────────────

#[test]
fn statistics_of_events() {
    let stats = ScanStatistics::from_events(&sample_events());
    assert_eq!(stats.total, 3);
    assert_eq!(stats.vfx_count, 2);
    assert_eq!(stats.di_count, 1);
    assert_eq!(stats.frame_range, Some((100, 900)));
    assert!((stats.average_confidence - (0.91234 + 0.5 + 0.75) / 3.0).abs() < 1e-9);

    assert_eq!(ScanStatistics::from_events(&[]), ScanStatistics::default());
}
