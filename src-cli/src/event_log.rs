use ostinato_core::{Coordinator, Event, SessionOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Background thread that drains coordinator events into the log.
pub struct EventLogger {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventLogger {
    pub fn spawn(coordinator: Arc<Coordinator>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !thread_stop.load(Ordering::Acquire) {
                for event in coordinator.drain_events() {
                    log_event(&event);
                }
                thread::sleep(POLL_INTERVAL);
            }
            for event in coordinator.drain_events() {
                log_event(&event);
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Flushes the remaining events and joins the thread.
    pub fn finish(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn log_event(event: &Event) {
    match event {
        Event::SessionStarted { song } => {
            log::info!("playing {} ({} events)", song, song.event_count())
        }
        Event::LineUnacknowledged {
            song_id,
            line_index,
            reason,
        } => log::debug!("{}: line {} unacknowledged: {:?}", song_id, line_index, reason),
        Event::SessionFinished { report } => match &report.outcome {
            SessionOutcome::Completed => log::info!(
                "finished {}: {} lines, {} unacknowledged",
                report.song_id,
                report.lines_sent,
                report.unacknowledged
            ),
            SessionOutcome::Cancelled => log::info!("stopped {}", report.song_id),
            SessionOutcome::Stalled { consecutive } => log::warn!(
                "gave up on {} after {} silent lines",
                report.song_id,
                consecutive
            ),
            SessionOutcome::TransportFailed { message } => {
                log::error!("{} aborted: {}", report.song_id, message)
            }
        },
        Event::Idle => log::info!("idle"),
        Event::LinkStateChanged { state } => log::info!("link {:?}", state),
    }
}
