use crate::tempo::{Tick, TempoMap};
use midly::{Format, Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use ostinato_ports::source::{ConversionError, EventSourcePort};
use ostinato_ports::types::{NoteEvent, NoteKind};
use std::collections::BTreeMap;
use std::path::Path;

/// Event source for Standard MIDI Files.
#[derive(Clone, Copy, Debug, Default)]
pub struct MidiEventSource;

impl EventSourcePort for MidiEventSource {
    fn convert_path(&self, path: &Path) -> Result<Vec<NoteEvent>, ConversionError> {
        import_note_events_path(path)
    }
}

#[derive(Clone, Copy, Debug)]
enum RawEvent {
    Tempo(u32),
    Note { kind: NoteKind, note: u8, velocity: u8 },
}

pub fn import_note_events_path(path: &Path) -> Result<Vec<NoteEvent>, ConversionError> {
    let data = std::fs::read(path).map_err(|e| ConversionError::Io(e.to_string()))?;
    import_note_events(&data)
}

/// Flattens every track into one timeline of note-on/note-off events in seconds.
///
/// Messages are emitted verbatim: a note-on with velocity 0 stays a note-on.
pub fn import_note_events(data: &[u8]) -> Result<Vec<NoteEvent>, ConversionError> {
    let smf = Smf::parse(data).map_err(|e| ConversionError::Parse(e.to_string()))?;
    if smf.header.format == Format::Sequential {
        return Err(ConversionError::Unsupported(
            "format 2 files have independent track timelines".to_string(),
        ));
    }

    let mut timeline: Vec<(Tick, RawEvent)> = Vec::new();
    for track in &smf.tracks {
        let mut tick: Tick = 0;
        for event in track {
            tick += event.delta.as_int() as Tick;
            match &event.kind {
                TrackEventKind::Midi { message, .. } => match message {
                    MidiMessage::NoteOn { key, vel } => timeline.push((
                        tick,
                        RawEvent::Note {
                            kind: NoteKind::NoteOn,
                            note: key.as_int(),
                            velocity: vel.as_int(),
                        },
                    )),
                    MidiMessage::NoteOff { key, vel } => timeline.push((
                        tick,
                        RawEvent::Note {
                            kind: NoteKind::NoteOff,
                            note: key.as_int(),
                            velocity: vel.as_int(),
                        },
                    )),
                    _ => {}
                },
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    timeline.push((tick, RawEvent::Tempo(us_per_quarter.as_int())));
                }
                _ => {}
            }
        }
    }

    // Stable: on equal ticks the earlier track keeps precedence.
    timeline.sort_by_key(|(tick, _)| *tick);

    let tempo_map = match smf.header.timing {
        Timing::Metrical(ticks) => {
            let mut tempo_points: BTreeMap<Tick, u32> = BTreeMap::new();
            for (tick, event) in &timeline {
                if let RawEvent::Tempo(us_per_quarter) = event {
                    tempo_points.insert(*tick, *us_per_quarter);
                }
            }
            TempoMap::new(ticks.as_int(), tempo_points)
        }
        Timing::Timecode(fps, ticks_per_frame) => {
            let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
            TempoMap::constant(ppq, us_per_quarter)
        }
    };

    let events = timeline
        .into_iter()
        .filter_map(|(tick, event)| match event {
            RawEvent::Note {
                kind,
                note,
                velocity,
            } => Some(NoteEvent {
                time: tempo_map.tick_to_seconds(tick),
                kind,
                note,
                velocity,
            }),
            RawEvent::Tempo(_) => None,
        })
        .collect();

    Ok(events)
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}
