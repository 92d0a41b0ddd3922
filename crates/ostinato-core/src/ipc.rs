use crate::session::{SessionReport, UnackedReason};
use ostinato_ports::types::{LinkDevice, LinkState, SongId, SongRef};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
    Submit { path: String },
    Stop,
    Resume,
    Status,
    Connect { address: String, baud_rate: u32 },
    Disconnect,
    ListDevices,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum Reply {
    Queued { song: SongRef },
    Stopped { was_playing: bool },
    Status { status: PlaybackStatus },
    Devices { devices: Vec<LinkDevice> },
    Done,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    Playing,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub link: LinkState,
    pub current: Option<SongRef>,
    pub pending: Vec<SongRef>,
    pub last_report: Option<SessionReport>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    SessionStarted {
        song: SongRef,
    },
    LineUnacknowledged {
        song_id: SongId,
        line_index: usize,
        reason: UnackedReason,
    },
    SessionFinished {
        report: SessionReport,
    },
    /// Emitted only when playback stops, never between chained songs.
    Idle,
    LinkStateChanged {
        state: LinkState,
    },
}
