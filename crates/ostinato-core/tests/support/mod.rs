#![allow(dead_code)]

use ostinato_core::SessionConfig;
use ostinato_ports::link::{LinkError, LinkPort, LinkRead};
use ostinato_ports::source::{ConversionError, EventSourcePort};
use ostinato_ports::storage::TransportMode;
use ostinato_ports::types::{LinkDevice, LinkState, NoteEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How the fake device answers one read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Silent,
    Garbage,
}

#[derive(Default)]
struct Recorded {
    writes: Vec<String>,
    reads: usize,
    connects: Vec<(String, u32)>,
}

/// Inspection handle that stays with the test after the link is moved away.
#[derive(Clone, Default)]
pub struct LinkProbe {
    recorded: Arc<Mutex<Recorded>>,
}

impl LinkProbe {
    pub fn writes(&self) -> Vec<String> {
        self.recorded.lock().writes.clone()
    }

    pub fn reads(&self) -> usize {
        self.recorded.lock().reads
    }

    pub fn connects(&self) -> Vec<(String, u32)> {
        self.recorded.lock().connects.clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.recorded
            .lock()
            .writes
            .iter()
            .filter(|w| w.as_str() == needle)
            .count()
    }
}

pub struct FakeLink {
    probe: LinkProbe,
    state: LinkState,
    script: VecDeque<Reply>,
    default_reply: Reply,
    reply_delay: Duration,
    fail_on_write: Option<usize>,
    connect_error: Option<LinkError>,
    cancel_on_read: Option<(usize, Arc<AtomicBool>)>,
}

impl FakeLink {
    pub fn connected() -> (Self, LinkProbe) {
        let probe = LinkProbe::default();
        let link = Self {
            probe: probe.clone(),
            state: LinkState::Connected,
            script: VecDeque::new(),
            default_reply: Reply::Ok,
            reply_delay: Duration::ZERO,
            fail_on_write: None,
            connect_error: None,
            cancel_on_read: None,
        };
        (link, probe)
    }

    pub fn disconnected() -> (Self, LinkProbe) {
        let (mut link, probe) = Self::connected();
        link.state = LinkState::Disconnected;
        (link, probe)
    }

    /// Replies consumed in order, one per ACK wait; `default_reply` afterwards.
    pub fn with_script(mut self, script: &[Reply]) -> Self {
        self.script = script.iter().copied().collect();
        self
    }

    pub fn with_default_reply(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Simulated device processing time before each `OK`.
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = delay;
        self
    }

    /// The n-th write (1-based) fails and drops the connection.
    pub fn failing_on_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    /// Raises `cancel` while the n-th read (1-based) is waiting, as a user stop would.
    pub fn cancelling_on_read(mut self, n: usize, cancel: Arc<AtomicBool>) -> Self {
        self.cancel_on_read = Some((n, cancel));
        self
    }

    pub fn refusing_connect(mut self, err: LinkError) -> Self {
        self.connect_error = Some(err);
        self
    }
}

impl LinkPort for FakeLink {
    fn list_devices(&self) -> Result<Vec<LinkDevice>, LinkError> {
        Ok(Vec::new())
    }

    fn connect(&mut self, address: &str, baud_rate: u32) -> Result<(), LinkError> {
        self.probe
            .recorded
            .lock()
            .connects
            .push((address.to_string(), baud_rate));
        if let Some(err) = self.connect_error.clone() {
            return Err(err);
        }
        self.state = LinkState::Connected;
        Ok(())
    }

    fn write_line(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        if self.state != LinkState::Connected {
            return Err(LinkError::NotConnected);
        }
        let mut recorded = self.probe.recorded.lock();
        if self.fail_on_write == Some(recorded.writes.len() + 1) {
            self.state = LinkState::Disconnected;
            return Err(LinkError::Io("cable pulled".to_string()));
        }
        recorded
            .writes
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn read_line_timeout(&mut self, timeout: Duration) -> Result<LinkRead, LinkError> {
        let reads = {
            let mut recorded = self.probe.recorded.lock();
            recorded.reads += 1;
            recorded.reads
        };
        if let Some((n, cancel)) = &self.cancel_on_read {
            if *n == reads {
                cancel.store(true, Ordering::Release);
            }
        }
        let reply = self.script.pop_front().unwrap_or(self.default_reply);
        match reply {
            Reply::Ok => {
                thread::sleep(self.reply_delay);
                Ok(LinkRead::Line("OK".to_string()))
            }
            Reply::Garbage => Ok(LinkRead::Line("ERR buffer full\r".to_string())),
            Reply::Silent => {
                thread::sleep(timeout);
                Ok(LinkRead::Timeout)
            }
        }
    }

    fn close(&mut self) {
        self.state = LinkState::Disconnected;
    }

    fn state(&self) -> LinkState {
        self.state
    }
}

/// Event source backed by a fixed table; unknown paths fail to convert.
#[derive(Default)]
pub struct TableSource {
    songs: HashMap<PathBuf, Vec<NoteEvent>>,
}

impl TableSource {
    pub fn with(mut self, path: &str, events: Vec<NoteEvent>) -> Self {
        self.songs.insert(PathBuf::from(path), events);
        self
    }
}

impl EventSourcePort for TableSource {
    fn convert_path(&self, path: &Path) -> Result<Vec<NoteEvent>, ConversionError> {
        self.songs
            .get(path)
            .cloned()
            .ok_or_else(|| ConversionError::Parse(format!("not a midi file: {}", path.display())))
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        mode: TransportMode::Handshake,
        ack_timeout: Duration::from_millis(30),
        settle_delay: Duration::ZERO,
        line_delay: Duration::from_millis(1),
        max_consecutive_unacked: None,
    }
}

/// `count` alternating note-on/note-off events, 10 ms apart.
pub fn song_events(count: usize) -> Vec<NoteEvent> {
    (0..count)
        .map(|i| {
            let time = i as f64 * 0.01;
            if i % 2 == 0 {
                NoteEvent::on(time, 60, 100)
            } else {
                NoteEvent::off(time, 60, 0)
            }
        })
        .collect()
}
