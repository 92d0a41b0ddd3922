use ostinato_domain_song::wire::{is_ack, song_lines, END_MARKER, START_MARKER};
use ostinato_ports::link::{LinkError, LinkPort, LinkRead};
use ostinato_ports::storage::{PlayerSettings, TransportMode};
use ostinato_ports::types::{LinkState, SongId, SongRef};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub mode: TransportMode,
    pub ack_timeout: Duration,
    pub settle_delay: Duration,
    pub line_delay: Duration,
    /// Abort after this many unacknowledged lines in a row. `None` never aborts;
    /// `Some(0)` is treated as `None`.
    pub max_consecutive_unacked: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&PlayerSettings::default())
    }
}

impl From<&PlayerSettings> for SessionConfig {
    fn from(settings: &PlayerSettings) -> Self {
        Self {
            mode: settings.transport_mode,
            ack_timeout: Duration::from_millis(settings.ack_timeout_ms),
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
            line_delay: Duration::from_millis(settings.line_delay_ms),
            max_consecutive_unacked: settings.max_consecutive_unacked.filter(|&max| max > 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Streaming,
    Completed,
    Aborted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SessionOutcome {
    Completed,
    Cancelled,
    Stalled { consecutive: u32 },
    TransportFailed { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum UnackedReason {
    Timeout,
    Unexpected { response: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnackedLine {
    /// Zero-based; line 0 is the header.
    pub line_index: usize,
    pub reason: UnackedReason,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub song_id: SongId,
    pub outcome: SessionOutcome,
    pub lines_sent: usize,
    pub acknowledged: usize,
    pub unacknowledged: usize,
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed)
    }
}

/// Streams one song over a link.
///
/// Thread model: `run` blocks for the whole song and is meant for a dedicated
/// thread. `cancel` is polled between lines only, never during a write or an
/// ACK wait, so cancellation latency is bounded by one ACK timeout.
pub struct TransmissionSession<'a> {
    song: SongRef,
    config: &'a SessionConfig,
    cancel: &'a AtomicBool,
    state: SessionState,
    lines_sent: usize,
    acknowledged: usize,
    unacknowledged: usize,
    consecutive_unacked: u32,
}

impl<'a> TransmissionSession<'a> {
    pub fn new(song: SongRef, config: &'a SessionConfig, cancel: &'a AtomicBool) -> Self {
        Self {
            song,
            config,
            cancel,
            state: SessionState::Idle,
            lines_sent: 0,
            acknowledged: 0,
            unacknowledged: 0,
            consecutive_unacked: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn run(
        &mut self,
        link: &mut dyn LinkPort,
        on_unacked: &mut dyn FnMut(&SongRef, &UnackedLine),
    ) -> SessionReport {
        if link.state() != LinkState::Connected {
            return self.finish(transport_failed(&LinkError::NotConnected));
        }

        if let Err(err) = link.write_line(START_MARKER.as_bytes()) {
            return self.finish(transport_failed(&err));
        }
        self.state = SessionState::Streaming;
        log::info!(
            "streaming {} ({} events, {:?} mode)",
            self.song,
            self.song.event_count(),
            self.config.mode
        );

        // Grace period for the device's receive buffer; not a cancellation point.
        thread::sleep(self.config.settle_delay);

        let events = self.song.events.clone();
        for (line_index, line) in song_lines(&events).enumerate() {
            if self.cancel.load(Ordering::Acquire) {
                log::info!("{} cancelled after {} lines", self.song, self.lines_sent);
                return self.finish(SessionOutcome::Cancelled);
            }

            if let Err(err) = link.write_line(line.as_bytes()) {
                log::error!("{}: write failed on line {}: {}", self.song, line_index, err);
                return self.finish(transport_failed(&err));
            }
            self.lines_sent += 1;

            match self.config.mode {
                TransportMode::FixedDelay => thread::sleep(self.config.line_delay),
                TransportMode::Handshake => {
                    let reason = match link.read_line_timeout(self.config.ack_timeout) {
                        Ok(LinkRead::Line(response)) if is_ack(&response) => None,
                        Ok(LinkRead::Line(response)) => Some(UnackedReason::Unexpected {
                            response: response.trim().to_string(),
                        }),
                        Ok(LinkRead::Timeout) => Some(UnackedReason::Timeout),
                        Err(err) => {
                            log::error!(
                                "{}: read failed on line {}: {}",
                                self.song,
                                line_index,
                                err
                            );
                            return self.finish(transport_failed(&err));
                        }
                    };

                    match reason {
                        None => {
                            self.acknowledged += 1;
                            self.consecutive_unacked = 0;
                        }
                        Some(reason) => {
                            let unacked = UnackedLine { line_index, reason };
                            log::warn!(
                                "{}: line {} not acknowledged ({:?})",
                                self.song,
                                line_index,
                                unacked.reason
                            );
                            self.unacknowledged += 1;
                            self.consecutive_unacked += 1;
                            on_unacked(&self.song, &unacked);

                            if let Some(max) =
                                self.config.max_consecutive_unacked.filter(|&max| max > 0)
                            {
                                if self.consecutive_unacked >= max {
                                    log::error!(
                                        "{}: {} consecutive lines unacknowledged, giving up",
                                        self.song,
                                        self.consecutive_unacked
                                    );
                                    return self.finish(SessionOutcome::Stalled {
                                        consecutive: self.consecutive_unacked,
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }

        // A stop during the last ACK wait still skips the end marker.
        if self.cancel.load(Ordering::Acquire) {
            log::info!("{} cancelled after its last line", self.song);
            return self.finish(SessionOutcome::Cancelled);
        }

        if let Err(err) = link.write_line(END_MARKER.as_bytes()) {
            return self.finish(transport_failed(&err));
        }

        log::info!(
            "{} finished: {} lines, {} unacknowledged",
            self.song,
            self.lines_sent,
            self.unacknowledged
        );
        self.finish(SessionOutcome::Completed)
    }

    fn finish(&mut self, outcome: SessionOutcome) -> SessionReport {
        self.state = if outcome.is_completed() {
            SessionState::Completed
        } else {
            SessionState::Aborted
        };
        SessionReport {
            song_id: self.song.id,
            outcome,
            lines_sent: self.lines_sent,
            acknowledged: self.acknowledged,
            unacknowledged: self.unacknowledged,
        }
    }
}

fn transport_failed(err: &LinkError) -> SessionOutcome {
    SessionOutcome::TransportFailed {
        message: err.to_string(),
    }
}
