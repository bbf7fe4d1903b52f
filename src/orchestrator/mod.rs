//! Worker orchestration modules.
//!
//! Covers the supervisor control loop, worker process spawning, respawn
//! backoff and the in-worker bootstrap sequence.

pub mod backoff;
pub mod bootstrap;
pub mod spawner;
pub mod supervisor;
