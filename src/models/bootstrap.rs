//! Worker bootstrap lifecycle states.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Forward-only states a worker passes through while coming online.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    /// Process started, nothing requested yet.
    Created,
    /// Connect request issued to the trading gateway.
    GatewayConnecting,
    /// Waiting for the gateway handshake to settle.
    AwaitingConnectionSettle,
    /// Strategy engine initialising and strategies loading.
    InitializingStrategies,
    /// Waiting for per-strategy initialisation to converge.
    AwaitingInitSettle,
    /// Start requested for all strategies.
    StrategiesRunning,
    /// Heartbeat loop; runs until the process is terminated.
    SteadyState,
}

impl BootstrapState {
    /// The state that follows this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::GatewayConnecting),
            Self::GatewayConnecting => Some(Self::AwaitingConnectionSettle),
            Self::AwaitingConnectionSettle => Some(Self::InitializingStrategies),
            Self::InitializingStrategies => Some(Self::AwaitingInitSettle),
            Self::AwaitingInitSettle => Some(Self::StrategiesRunning),
            Self::StrategiesRunning => Some(Self::SteadyState),
            Self::SteadyState => None,
        }
    }

    /// Only single-step forward transitions are permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.next() == Some(next)
    }

    /// Stable `snake_case` label used in logs and heartbeats.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::GatewayConnecting => "gateway_connecting",
            Self::AwaitingConnectionSettle => "awaiting_connection_settle",
            Self::InitializingStrategies => "initializing_strategies",
            Self::AwaitingInitSettle => "awaiting_init_settle",
            Self::StrategiesRunning => "strategies_running",
            Self::SteadyState => "steady_state",
        }
    }
}

impl Display for BootstrapState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
