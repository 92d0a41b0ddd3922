pub mod link;
pub mod source;
pub mod storage;
pub mod types;

pub use link::*;
pub use source::*;
pub use storage::*;
pub use types::*;
