use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::{fmt, sync::Arc};

pub type Seconds = f64; // song-relative time, non-decreasing within a song

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SongId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    NoteOn,
    NoteOff,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub time: Seconds,
    pub kind: NoteKind,
    pub note: u8,     // 0..=127
    pub velocity: u8, // 0..=127
}

/// One queued song: an immutable, cheaply clonable handle to its event sequence.
#[derive(Clone, Debug)]
pub struct SongRef {
    pub id: SongId,
    pub name: String,
    pub events: Arc<[NoteEvent]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Disconnected,
    Connected,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkDevice {
    pub id: DeviceId,
    pub name: String,
}

impl NoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoteKind::NoteOn => "note_on",
            NoteKind::NoteOff => "note_off",
        }
    }
}

impl NoteEvent {
    pub fn on(time: Seconds, note: u8, velocity: u8) -> Self {
        Self {
            time,
            kind: NoteKind::NoteOn,
            note,
            velocity,
        }
    }

    pub fn off(time: Seconds, note: u8, velocity: u8) -> Self {
        Self {
            time,
            kind: NoteKind::NoteOff,
            note,
            velocity,
        }
    }
}

impl SongRef {
    pub fn new(id: SongId, name: impl Into<String>, events: Vec<NoteEvent>) -> Self {
        Self {
            id,
            name: name.into(),
            events: events.into(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl PartialEq for SongRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SongRef {}

// Status output only needs the summary, never the events themselves.
impl Serialize for SongRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SongRef", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("event_count", &self.events.len())?;
        state.end()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for SongRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.name)
    }
}
