//! Domain model module declarations.

pub mod bootstrap;
pub mod heartbeat;
pub mod research;
pub mod session_window;
pub mod supervisor;
