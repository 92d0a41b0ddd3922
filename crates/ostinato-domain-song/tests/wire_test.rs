use ostinato_domain_song::{
    format_event, is_ack, parse_event, song_lines, WireError, END_MARKER, HEADER_LINE,
    START_MARKER,
};
use ostinato_ports::types::{NoteEvent, NoteKind};
use pretty_assertions::assert_eq;

#[test]
fn note_event_roundtrips_through_wire_line() {
    let event = NoteEvent::on(1.234, 60, 100);
    let line = format_event(&event);
    assert_eq!(line, "1.234,note_on,60,100\n");

    let parsed = parse_event(&line).expect("line should parse");
    assert_eq!(parsed, event);
}

#[test]
fn timestamps_are_fixed_to_three_decimals() {
    assert_eq!(format_event(&NoteEvent::off(0.0, 0, 0)), "0.000,note_off,0,0\n");
    assert_eq!(format_event(&NoteEvent::on(2.5, 127, 127)), "2.500,note_on,127,127\n");
    assert_eq!(
        format_event(&NoteEvent::on(0.123_456, 64, 1)),
        "0.123,note_on,64,1\n"
    );
}

#[test]
fn song_lines_start_with_header() {
    let events = vec![NoteEvent::on(0.0, 60, 90), NoteEvent::off(0.5, 60, 0)];
    let lines: Vec<String> = song_lines(&events).collect();
    assert_eq!(
        lines,
        vec![
            HEADER_LINE.to_string(),
            "0.000,note_on,60,90\n".to_string(),
            "0.500,note_off,60,0\n".to_string(),
        ]
    );
}

#[test]
fn empty_song_is_only_the_header() {
    let lines: Vec<String> = song_lines(&[]).collect();
    assert_eq!(lines, vec![HEADER_LINE.to_string()]);
}

#[test]
fn markers_match_device_firmware() {
    assert_eq!(START_MARKER, "START_UPLOAD\n");
    assert_eq!(END_MARKER, "\nEND_UPLOAD\n");
}

#[test]
fn parse_rejects_bad_lines() {
    assert!(matches!(
        parse_event("1.0,note_on,60"),
        Err(WireError::Malformed(_))
    ));
    assert!(matches!(
        parse_event("1.0,pitch_bend,60,100"),
        Err(WireError::UnknownKind(_))
    ));
    assert!(matches!(
        parse_event("1.0,note_on,128,100"),
        Err(WireError::OutOfRange(_))
    ));
    assert!(matches!(
        parse_event("-0.5,note_off,60,100"),
        Err(WireError::OutOfRange(_))
    ));
    assert!(matches!(
        parse_event("abc,note_off,60,100"),
        Err(WireError::Malformed(_))
    ));
}

#[test]
fn parse_tolerates_surrounding_whitespace() {
    let parsed = parse_event("  0.250,note_off,61,0\r\n").expect("line should parse");
    assert_eq!(parsed.kind, NoteKind::NoteOff);
    assert_eq!(parsed.note, 61);
}

#[test]
fn ack_is_trimmed_and_case_sensitive() {
    assert!(is_ack("OK"));
    assert!(is_ack(" OK\r"));
    assert!(!is_ack("ok"));
    assert!(!is_ack("OKAY"));
    assert!(!is_ack(""));
}
