use crate::ipc::{Command, Event, PlaybackState, PlaybackStatus, Reply};
use crate::queue::SongQueue;
use crate::session::{SessionConfig, SessionOutcome, SessionReport, TransmissionSession};
use crossbeam_channel::{unbounded, Receiver, Sender};
use ostinato_ports::link::{LinkError, LinkPort};
use ostinato_ports::source::{ConversionError, EventSourcePort};
use ostinato_ports::types::{LinkDevice, LinkState, NoteEvent, SongId, SongRef};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_BUFFERED_EVENTS: usize = 1024;

#[derive(thiserror::Error, Debug)]
pub enum CoordinatorError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),
    #[error("link is busy")]
    Busy,
    #[error("coordinator is shut down")]
    ShutDown,
}

enum ControlMsg {
    Finished {
        link: Box<dyn LinkPort>,
        report: SessionReport,
    },
    Shutdown,
}

struct ActiveSession {
    song_id: SongId,
    cancel: Arc<AtomicBool>,
    stop_requested: bool,
    handle: JoinHandle<()>,
}

struct Inner {
    queue: SongQueue,
    /// `None` while the link is lent to a session or a lifecycle call.
    link: Option<Box<dyn LinkPort>>,
    active: Option<ActiveSession>,
    next_song_id: u64,
    last_report: Option<SessionReport>,
    events: VecDeque<Event>,
    shut_down: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
    config: SessionConfig,
    control_tx: Sender<ControlMsg>,
}

/// Drains the song queue into back-to-back transmission sessions.
///
/// Thread model:
/// - public methods may be called from any thread; they only hold the state
///   lock for queue and bookkeeping updates, never across link I/O
/// - each session streams on its own thread and owns the link while it runs
/// - a control thread receives session completions and chains the next song
pub struct Coordinator {
    shared: Arc<Shared>,
    source: Box<dyn EventSourcePort>,
    control_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        link: Box<dyn LinkPort>,
        source: Box<dyn EventSourcePort>,
        config: SessionConfig,
    ) -> Self {
        let (control_tx, control_rx) = unbounded();
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: SongQueue::new(),
                link: Some(link),
                active: None,
                next_song_id: 1,
                last_report: None,
                events: VecDeque::new(),
                shut_down: false,
            }),
            changed: Condvar::new(),
            config,
            control_tx,
        });

        let control_shared = Arc::clone(&shared);
        let control_thread = thread::spawn(move || control_loop(control_shared, control_rx));

        Self {
            shared,
            source,
            control_thread: Mutex::new(Some(control_thread)),
        }
    }

    pub fn handle_command(&self, cmd: Command) -> Result<Reply, CoordinatorError> {
        let reply = match cmd {
            Command::Submit { path } => Reply::Queued {
                song: self.submit_path(Path::new(&path))?,
            },
            Command::Stop => Reply::Stopped {
                was_playing: self.stop(),
            },
            Command::Resume => {
                self.resume();
                Reply::Done
            }
            Command::Status => Reply::Status {
                status: self.status(),
            },
            Command::Connect {
                address,
                baud_rate,
            } => {
                self.connect(&address, baud_rate)?;
                Reply::Done
            }
            Command::Disconnect => {
                self.disconnect()?;
                Reply::Done
            }
            Command::ListDevices => Reply::Devices {
                devices: self.list_devices()?,
            },
        };
        Ok(reply)
    }

    /// Converts the file and queues it. Conversion failures are returned and nothing is queued.
    pub fn submit_path(&self, path: &Path) -> Result<SongRef, CoordinatorError> {
        let events = self.source.convert_path(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.submit(name, events)
    }

    /// Queues a song and starts playback if nothing is streaming.
    pub fn submit(
        &self,
        name: impl Into<String>,
        events: Vec<NoteEvent>,
    ) -> Result<SongRef, CoordinatorError> {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down {
            return Err(CoordinatorError::ShutDown);
        }

        let song = SongRef::new(SongId(inner.next_song_id), name, events);
        inner.next_song_id += 1;
        log::info!("queued {} ({} events)", song, song.event_count());
        inner.queue.enqueue(song.clone());

        if inner.active.is_none() {
            advance_locked(&self.shared, &mut inner);
        }
        Ok(song)
    }

    /// Requests cancellation of the active session. Returns whether one was running.
    ///
    /// The session stops at its next line boundary; the queue is not advanced.
    pub fn stop(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        match inner.active.as_mut() {
            Some(active) => {
                log::info!("stop requested for {}", active.song_id);
                active.stop_requested = true;
                active.cancel.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Re-checks the queue after a stop or abort and starts the next song if idle.
    pub fn resume(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.active.is_none() && !inner.shut_down {
            advance_locked(&self.shared, &mut inner);
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        let inner = self.shared.inner.lock();
        let (state, link) = match (&inner.active, &inner.link) {
            (Some(_), _) => (PlaybackState::Playing, LinkState::Connected),
            (None, Some(link)) => (PlaybackState::Idle, link.state()),
            (None, None) => (PlaybackState::Idle, LinkState::Disconnected),
        };
        PlaybackStatus {
            state,
            link,
            current: inner.queue.current().cloned(),
            pending: inner.queue.snapshot(),
            last_report: inner.last_report.clone(),
        }
    }

    pub fn current_song(&self) -> Option<SongRef> {
        self.shared.inner.lock().queue.current().cloned()
    }

    pub fn peek_queue(&self) -> Vec<SongRef> {
        self.shared.inner.lock().queue.snapshot()
    }

    pub fn drain_events(&self) -> Vec<Event> {
        self.shared.inner.lock().events.drain(..).collect()
    }

    /// Blocks until no session is active. Returns `false` on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.shared.inner.lock();
        while inner.active.is_some() {
            if self
                .shared
                .changed
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return inner.active.is_none();
            }
        }
        true
    }

    /// Opens the link; pending songs start once it is up.
    pub fn connect(&self, address: &str, baud_rate: u32) -> Result<(), CoordinatorError> {
        log::info!("connecting to {} at {} baud", address, baud_rate);
        let result = self.with_idle_link(|link| link.connect(address, baud_rate))?;
        match &result {
            Ok(()) => log::info!("connected to {}", address),
            Err(err) => log::warn!("failed to connect to {}: {}", address, err),
        }
        Ok(result?)
    }

    pub fn disconnect(&self) -> Result<(), CoordinatorError> {
        self.with_idle_link(|link| link.close())?;
        log::info!("link closed");
        Ok(())
    }

    pub fn list_devices(&self) -> Result<Vec<LinkDevice>, CoordinatorError> {
        Ok(self.with_idle_link(|link| link.list_devices())??)
    }

    /// Cancels any active session, waits for it to wind down and closes the link. Idempotent.
    pub fn shutdown(&self) {
        let Some(control_thread) = self.control_thread.lock().take() else {
            return;
        };

        {
            let mut inner = self.shared.inner.lock();
            inner.shut_down = true;
            if let Some(active) = inner.active.as_mut() {
                active.stop_requested = true;
                active.cancel.store(true, Ordering::Release);
            }
            while inner.active.is_some() {
                self.shared.changed.wait(&mut inner);
            }
        }

        let _ = self.shared.control_tx.send(ControlMsg::Shutdown);
        let _ = control_thread.join();

        let mut inner = self.shared.inner.lock();
        if let Some(link) = inner.link.as_mut() {
            link.close();
        }
        log::info!("coordinator shut down");
    }

    /// Borrows the link for a lifecycle call without holding the state lock during I/O.
    fn with_idle_link<R>(
        &self,
        f: impl FnOnce(&mut dyn LinkPort) -> R,
    ) -> Result<R, CoordinatorError> {
        let mut link = {
            let mut inner = self.shared.inner.lock();
            if inner.shut_down {
                return Err(CoordinatorError::ShutDown);
            }
            if inner.active.is_some() {
                return Err(CoordinatorError::Busy);
            }
            inner.link.take().ok_or(CoordinatorError::Busy)?
        };

        let before = link.state();
        let result = f(link.as_mut());
        let after = link.state();

        let mut inner = self.shared.inner.lock();
        inner.link = Some(link);
        if before != after {
            push_event(&mut inner, Event::LinkStateChanged { state: after });
        }
        if inner.active.is_none() {
            advance_locked(&self.shared, &mut inner);
        }
        self.shared.changed.notify_all();
        Ok(result)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn control_loop(shared: Arc<Shared>, rx: Receiver<ControlMsg>) {
    for msg in rx.iter() {
        match msg {
            ControlMsg::Finished { link, report } => on_session_finished(&shared, link, report),
            ControlMsg::Shutdown => break,
        }
    }
}

fn on_session_finished(shared: &Arc<Shared>, mut link: Box<dyn LinkPort>, report: SessionReport) {
    let mut inner = shared.inner.lock();
    let stop_requested = match inner.active.take() {
        Some(active) => {
            // The session thread has already sent its report; this join is immediate.
            let _ = active.handle.join();
            active.stop_requested
        }
        None => false,
    };

    if matches!(report.outcome, SessionOutcome::TransportFailed { .. }) {
        link.close();
        push_event(
            &mut inner,
            Event::LinkStateChanged {
                state: link.state(),
            },
        );
    }
    inner.link = Some(link);
    inner.last_report = Some(report.clone());

    let chain = report.outcome.is_completed() && !stop_requested && !inner.shut_down;
    push_event(&mut inner, Event::SessionFinished { report });

    if chain {
        advance_locked(shared, &mut inner);
    } else {
        go_idle(&mut inner);
    }
    shared.changed.notify_all();
}

/// Starts the next queued song, or settles into idle when there is nothing to play.
///
/// Caller holds the state lock and guarantees no session is active.
fn advance_locked(shared: &Arc<Shared>, inner: &mut Inner) {
    let link = match inner.link.take() {
        Some(link) if link.state() == LinkState::Connected => link,
        other => {
            inner.link = other;
            if !inner.queue.is_empty() {
                log::warn!(
                    "link not connected; {} song(s) waiting",
                    inner.queue.len()
                );
            }
            go_idle(inner);
            return;
        }
    };

    let Some(song) = inner.queue.dequeue_next() else {
        inner.link = Some(link);
        go_idle(inner);
        return;
    };

    spawn_session(shared, inner, song, link);
}

fn spawn_session(
    shared: &Arc<Shared>,
    inner: &mut Inner,
    song: SongRef,
    mut link: Box<dyn LinkPort>,
) {
    let cancel = Arc::new(AtomicBool::new(false));
    let song_id = song.id;
    push_event(inner, Event::SessionStarted { song: song.clone() });

    let thread_shared = Arc::clone(shared);
    let thread_cancel = Arc::clone(&cancel);
    let handle = thread::spawn(move || {
        let config = thread_shared.config.clone();
        let mut session = TransmissionSession::new(song, &config, &thread_cancel);
        let report = session.run(link.as_mut(), &mut |song, unacked| {
            let mut inner = thread_shared.inner.lock();
            push_event(
                &mut inner,
                Event::LineUnacknowledged {
                    song_id: song.id,
                    line_index: unacked.line_index,
                    reason: unacked.reason.clone(),
                },
            );
        });
        let _ = thread_shared
            .control_tx
            .send(ControlMsg::Finished { link, report });
    });

    inner.active = Some(ActiveSession {
        song_id,
        cancel,
        stop_requested: false,
        handle,
    });
}

fn go_idle(inner: &mut Inner) {
    if let Some(song) = inner.queue.clear_current() {
        log::info!("idle after {}", song);
        push_event(inner, Event::Idle);
    }
}

fn push_event(inner: &mut Inner, event: Event) {
    if inner.events.len() >= MAX_BUFFERED_EVENTS {
        inner.events.pop_front();
    }
    inner.events.push_back(event);
}
