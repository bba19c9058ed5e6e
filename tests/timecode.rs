//! Timecode formatting, time parsing and range resolution tests.

use markscan::{
    ScanError, Timecode, VideoInfo, frame_to_timecode, parse_time_to_frame, resolve_frame_range,
};

// ── Formatting ─────────────────────────────────────────────────────

#[test]
fn timecode_at_integer_rate() {
    assert_eq!(frame_to_timecode(0, 25.0), "00:00:00:00");
    assert_eq!(frame_to_timecode(24, 25.0), "00:00:00:24");
    assert_eq!(frame_to_timecode(25, 25.0), "00:00:01:00");
    assert_eq!(frame_to_timecode(90_000, 25.0), "01:00:00:00");
}

#[test]
fn timecode_fields() {
    let timecode = Timecode::from_frame(3 * 3600 * 24 + 62 * 24 + 5, 24.0);
    assert_eq!(
        timecode,
        Timecode {
            hours: 3,
            minutes: 1,
            seconds: 2,
            frames: 5
        }
    );
}

#[test]
fn fractional_rate_never_reaches_nominal_frame() {
    for frame in 0..3000 {
        let timecode = Timecode::from_frame(frame, 29.97);
        assert!(timecode.frames <= 29, "frame {frame} gave {timecode}");
    }
}

// ── Parsing ────────────────────────────────────────────────────────

#[test]
fn parse_all_layouts() {
    assert_eq!(parse_time_to_frame("00:01:10:05", 25.0).unwrap(), 1_755);
    assert_eq!(parse_time_to_frame("00:01:10", 25.0).unwrap(), 1_750);
    assert_eq!(parse_time_to_frame("01:10", 25.0).unwrap(), 1_750);
    assert_eq!(parse_time_to_frame("70", 25.0).unwrap(), 1_750);
    assert_eq!(parse_time_to_frame(" 2 ", 23.976).unwrap(), 47);
}

#[test]
fn parse_rejects_other_layouts() {
    for value in ["", "1:2:3:4:5", "aa:bb", "-5", "1.5", "00:00:xx"] {
        assert!(
            matches!(parse_time_to_frame(value, 25.0), Err(ScanError::InvalidTimeFormat(_))),
            "{value:?} should be rejected"
        );
    }
}

#[test]
fn parse_rejects_times_too_large_for_a_frame_index() {
    let cases = [
        "5124095576030432:00:00",
        "00:00:01:18446744073709551615",
        "18446744073709551615",
        "00:307445734561825861:00",
    ];
    for value in cases {
        assert!(
            matches!(parse_time_to_frame(value, 25.0), Err(ScanError::InvalidTimeFormat(_))),
            "{value:?} should be rejected"
        );
    }
}

#[test]
fn parse_handles_large_but_representable_times() {
    assert_eq!(parse_time_to_frame("99999:00:00", 25.0).unwrap(), 8_999_910_000);
    assert_eq!(parse_time_to_frame("00:00:00:4000000000", 25.0).unwrap(), 4_000_000_000);
}

// ── Range resolution ───────────────────────────────────────────────

fn ten_seconds() -> VideoInfo {
    VideoInfo::new(1920, 1080, 25.0, 250)
}

#[test]
fn missing_bounds_cover_the_video() {
    assert_eq!(resolve_frame_range(None, None, &ten_seconds()).unwrap(), 0..250);
}

#[test]
fn bounds_are_resolved_to_frames() {
    let range = resolve_frame_range(Some("00:02"), Some("00:00:04:10"), &ten_seconds()).unwrap();
    assert_eq!(range, 50..110);
}

#[test]
fn out_of_range_bounds_are_clamped() {
    let info = ten_seconds();
    assert_eq!(resolve_frame_range(Some("60"), None, &info).unwrap(), 0..250);
    assert_eq!(resolve_frame_range(Some("5"), Some("60"), &info).unwrap(), 125..250);
}

#[test]
fn far_end_bound_is_clamped_not_overflowed() {
    let range = resolve_frame_range(Some("00:02"), Some("99999:00:00:00"), &ten_seconds()).unwrap();
    assert_eq!(range, 50..250);

    let result = resolve_frame_range(None, Some("5124095576030432:00:00"), &ten_seconds());
    assert!(matches!(result, Err(ScanError::InvalidTimeFormat(_))));
}

#[test]
fn empty_range_is_an_error() {
    let result = resolve_frame_range(Some("6"), Some("4"), &ten_seconds());
    assert!(matches!(result, Err(ScanError::InvalidRange { .. })));

    let result = resolve_frame_range(Some("4"), Some("4"), &ten_seconds());
    assert!(matches!(result, Err(ScanError::InvalidRange { .. })));
}

#[test]
fn unparsable_bound_is_an_error() {
    let result = resolve_frame_range(Some("soon"), None, &ten_seconds());
    assert!(matches!(result, Err(ScanError::InvalidTimeFormat(_))));
}

#[test]
fn video_info_derives_duration() {
    let info = ten_seconds();
    assert_eq!(info.duration.as_secs_f64(), 10.0);
    assert_eq!(info.frames_in(1.5), 37);

    let fallback = VideoInfo::new(640, 360, 0.0, 100);
    assert_eq!(fallback.frames_per_second, markscan::DEFAULT_FRAMES_PER_SECOND);
}
