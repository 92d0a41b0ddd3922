use ostinato_ports::types::SongRef;
use std::collections::VecDeque;

/// FIFO of pending songs plus the song currently being streamed.
///
/// Not synchronized on its own; the coordinator keeps it behind its state lock.
#[derive(Debug, Default)]
pub struct SongQueue {
    pending: VecDeque<SongRef>,
    current: Option<SongRef>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, song: SongRef) {
        self.pending.push_back(song);
    }

    /// Pops the head and makes it current. An empty queue leaves `current` untouched.
    pub fn dequeue_next(&mut self) -> Option<SongRef> {
        let song = self.pending.pop_front()?;
        self.current = Some(song.clone());
        Some(song)
    }

    pub fn snapshot(&self) -> Vec<SongRef> {
        self.pending.iter().cloned().collect()
    }

    pub fn current(&self) -> Option<&SongRef> {
        self.current.as_ref()
    }

    pub fn clear_current(&mut self) -> Option<SongRef> {
        self.current.take()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
