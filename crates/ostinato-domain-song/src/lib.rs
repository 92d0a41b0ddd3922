pub mod midi_import;
pub mod tempo;
pub mod wire;

pub use midi_import::*;
pub use tempo::*;
pub use wire::*;
