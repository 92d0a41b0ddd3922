use crate::types::*;
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("link not connected")]
    NotConnected,
    #[error("io error: {0}")]
    Io(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result of waiting for a device response. A timeout is a routine outcome, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkRead {
    Line(String),
    Timeout,
}

/// Byte-oriented, newline-framed channel to the playback device.
///
/// Thread model: a link is owned by exactly one party at a time. The coordinator
/// holds it while idle and moves it into the streaming thread for a session.
pub trait LinkPort: Send {
    fn list_devices(&self) -> Result<Vec<LinkDevice>, LinkError>;

    fn connect(&mut self, address: &str, baud_rate: u32) -> Result<(), LinkError>;

    /// Writes bytes verbatim. A failure leaves the link `Disconnected`.
    fn write_line(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Blocks up to `timeout` for one `\n`-terminated line (terminator stripped).
    fn read_line_timeout(&mut self, timeout: Duration) -> Result<LinkRead, LinkError>;

    /// Idempotent.
    fn close(&mut self);

    fn state(&self) -> LinkState;
}
