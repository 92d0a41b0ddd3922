pub mod coordinator;
pub mod ipc;
pub mod queue;
pub mod session;

pub use coordinator::*;
pub use ipc::*;
pub use queue::*;
pub use session::*;
