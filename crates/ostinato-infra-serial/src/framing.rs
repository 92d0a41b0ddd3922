/// Longest partial line kept while waiting for a terminator.
const MAX_PENDING: usize = 4096;

/// Reassembles `\n`-terminated lines from arbitrary read chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING && !self.pending.contains(&b'\n') {
            log::warn!(
                "discarding {} bytes of unterminated device output",
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// Pops the oldest complete line with its `\r\n` or `\n` stripped.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
