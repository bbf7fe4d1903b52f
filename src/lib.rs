#![forbid(unsafe_code)]

//! Trading-session aware supervisor for a strategy worker process.

pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod research;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
