//! Local status channel between supervisor, worker and ctl.
//!
//! Optional: the supervisor keeps running if the socket cannot be
//! created, and a worker whose reporter cannot connect keeps trading.

pub mod reporter;
pub mod server;
pub mod status;

use serde::{Deserialize, Serialize};

use crate::models::heartbeat::WorkerHeartbeat;

/// Inbound request, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Liveness report from the worker.
    Heartbeat(WorkerHeartbeat),
    /// Status query from `session-supervisor-ctl`.
    Status,
}

/// Outbound response, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IpcResponse {
    /// Whether the request succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    /// Successful response carrying `data`.
    #[must_use]
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed response carrying a message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}
