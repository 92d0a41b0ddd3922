//! Line protocol spoken to the playback device.
//!
//! Every line is UTF-8 text terminated by `\n`. A song is framed by
//! [`START_MARKER`] and [`END_MARKER`]; between them the device receives
//! [`HEADER_LINE`] and one `time,type,note,velocity` line per note event.

use ostinato_ports::types::{NoteEvent, NoteKind};
use std::iter;

pub const START_MARKER: &str = "START_UPLOAD\n";
pub const END_MARKER: &str = "\nEND_UPLOAD\n";
pub const HEADER_LINE: &str = "time,type,note,velocity\n";
pub const ACK_TOKEN: &str = "OK";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed line: {0}")]
    Malformed(String),
    #[error("unknown event type: {0}")]
    UnknownKind(String),
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

pub fn format_event(event: &NoteEvent) -> String {
    format!(
        "{:.3},{},{},{}\n",
        event.time,
        event.kind.as_str(),
        event.note,
        event.velocity
    )
}

/// Header followed by one data line per event, each with its own newline.
pub fn song_lines(events: &[NoteEvent]) -> impl Iterator<Item = String> + '_ {
    iter::once(HEADER_LINE.to_string()).chain(events.iter().map(format_event))
}

pub fn parse_kind(value: &str) -> Result<NoteKind, WireError> {
    match value {
        "note_on" => Ok(NoteKind::NoteOn),
        "note_off" => Ok(NoteKind::NoteOff),
        other => Err(WireError::UnknownKind(other.to_string())),
    }
}

pub fn parse_event(line: &str) -> Result<NoteEvent, WireError> {
    let line = line.trim();
    let fields: Vec<&str> = line.split(',').collect();
    let [time, kind, note, velocity] = fields.as_slice() else {
        return Err(WireError::Malformed(line.to_string()));
    };

    let time: f64 = time
        .parse()
        .map_err(|_| WireError::Malformed(line.to_string()))?;
    if !time.is_finite() || time < 0.0 {
        return Err(WireError::OutOfRange(format!("time {time}")));
    }

    Ok(NoteEvent {
        time,
        kind: parse_kind(kind)?,
        note: parse_data_byte(note, "note")?,
        velocity: parse_data_byte(velocity, "velocity")?,
    })
}

pub fn is_ack(line: &str) -> bool {
    line.trim() == ACK_TOKEN
}

fn parse_data_byte(value: &str, field: &str) -> Result<u8, WireError> {
    let parsed: u8 = value
        .parse()
        .map_err(|_| WireError::OutOfRange(format!("{field} {value}")))?;
    if parsed > 127 {
        return Err(WireError::OutOfRange(format!("{field} {parsed}")));
    }
    Ok(parsed)
}
