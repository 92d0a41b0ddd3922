use serde::{Deserialize, Serialize};

fn default_port() -> String {
    if cfg!(windows) {
        "COM3".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_ack_timeout_ms() -> u64 {
    1_000
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_line_delay_ms() -> u64 {
    50
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Wait for `OK` after every line.
    #[default]
    Handshake,
    /// No acknowledgement channel: fixed pause after every line.
    FixedDelay,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    pub transport_mode: TransportMode,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_line_delay_ms")]
    pub line_delay_ms: u64,
    /// Give up on a song after this many silent lines in a row; `None` or `0` never gives up.
    pub max_consecutive_unacked: Option<u32>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            transport_mode: TransportMode::Handshake,
            ack_timeout_ms: default_ack_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            line_delay_ms: default_line_delay_ms(),
            max_consecutive_unacked: None,
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_settings(&self) -> Result<PlayerSettings, StorageError>;
    fn save_settings(&self, s: &PlayerSettings) -> Result<(), StorageError>;
}
