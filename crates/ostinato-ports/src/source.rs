use crate::types::NoteEvent;
use std::path::Path;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("io error: {0}")]
    Io(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported file: {0}")]
    Unsupported(String),
}

/// Turns an instrument event file into the ordered note events of one song.
///
/// Implementations are pure: the same input always yields the same sequence,
/// ordered by non-decreasing time.
pub trait EventSourcePort: Send + Sync {
    fn convert_path(&self, path: &Path) -> Result<Vec<NoteEvent>, ConversionError>;
}
