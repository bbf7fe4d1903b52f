//! Global configuration parsing, validation, and credential loading.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fmt::{Debug, Formatter};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::session_window::SessionWindow;
use crate::{AppError, Result};

/// Keychain service under which gateway secrets are stored.
pub const KEYRING_SERVICE: &str = "session-supervisor";

/// Environment fallback for the gateway password.
pub const PASSWORD_ENV: &str = "SESSION_SUPERVISOR_PASSWORD";

/// Environment fallback for the gateway authorisation code.
pub const AUTH_CODE_ENV: &str = "SESSION_SUPERVISOR_AUTH_CODE";

/// Optional fixed UTC offset for the wall clock.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClockConfig {
    /// Minutes east of UTC; absent means the host's local zone.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

/// Bounded waits used when stopping the worker.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ShutdownConfig {
    /// Wait after the graceful stop request before a forced kill.
    #[serde(default = "default_grace_seconds")]
    pub grace_seconds: u64,
    /// Wait after the forced kill for the exit status.
    #[serde(default = "default_kill_wait_seconds")]
    pub kill_wait_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_seconds: default_grace_seconds(),
            kill_wait_seconds: default_kill_wait_seconds(),
        }
    }
}

fn default_grace_seconds() -> u64 {
    10
}

fn default_kill_wait_seconds() -> u64 {
    5
}

/// Respawn throttling after worker crashes or spawn failures.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackoffConfig {
    /// Delay applied to the second consecutive failure.
    #[serde(default = "default_backoff_initial")]
    pub initial_seconds: u64,
    /// Upper bound on the respawn delay.
    #[serde(default = "default_backoff_max")]
    pub max_seconds: u64,
    /// Uptime after which a crash no longer counts as consecutive.
    #[serde(default = "default_backoff_reset")]
    pub reset_after_seconds: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_seconds: default_backoff_initial(),
            max_seconds: default_backoff_max(),
            reset_after_seconds: default_backoff_reset(),
        }
    }
}

fn default_backoff_initial() -> u64 {
    5
}

fn default_backoff_max() -> u64 {
    300
}

fn default_backoff_reset() -> u64 {
    300
}

/// Dwell times and behaviour of the worker bootstrap sequence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BootstrapConfig {
    /// Maximum wait for the gateway handshake.
    #[serde(default = "default_connect_settle")]
    pub connect_settle_seconds: u64,
    /// Maximum wait for strategy initialisation.
    #[serde(default = "default_init_settle")]
    pub init_settle_seconds: u64,
    /// Steady-state heartbeat cadence.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Abort the worker on collaborator errors or readiness timeouts.
    #[serde(default)]
    pub strict: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            connect_settle_seconds: default_connect_settle(),
            init_settle_seconds: default_init_settle(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            strict: false,
        }
    }
}

fn default_connect_settle() -> u64 {
    10
}

fn default_init_settle() -> u64 {
    60
}

fn default_heartbeat_interval() -> u64 {
    1
}

/// Non-secret trading gateway settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GatewayConfig {
    /// Gateway identifier passed to the engine.
    #[serde(default = "default_gateway_name")]
    pub name: String,
    /// Investor account id.
    #[serde(default)]
    pub user_id: String,
    /// Broker code.
    #[serde(default)]
    pub broker_id: String,
    /// Trading front address.
    #[serde(default)]
    pub trade_server: String,
    /// Market-data front address.
    #[serde(default)]
    pub market_server: String,
    /// Registered product name.
    #[serde(default)]
    pub product_name: String,
    /// Free-form product information.
    #[serde(default)]
    pub product_info: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            user_id: String::new(),
            broker_id: String::new(),
            trade_server: String::new(),
            market_server: String::new(),
            product_name: String::new(),
            product_info: String::new(),
        }
    }
}

fn default_gateway_name() -> String {
    "CTP".into()
}

/// One live strategy instance run by the worker.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StrategyConfig {
    /// Unique instance name.
    pub name: String,
    /// Strategy class registered with the engine.
    pub class_name: String,
    /// Instrument key, `SYMBOL.EXCHANGE`.
    pub vt_symbol: String,
    /// Numeric strategy parameters.
    #[serde(default)]
    pub setting: BTreeMap<String, f64>,
}

/// How the supervisor launches and listens to its worker.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Program to launch; defaults to the current executable.
    #[serde(default)]
    pub program: Option<String>,
    /// Arguments for `program`; defaults to `worker --config <path>`.
    #[serde(default)]
    pub args: Vec<String>,
    /// Named pipe / Unix socket identifier for the status channel.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// Heartbeat age after which the worker is reported unhealthy.
    #[serde(default = "default_heartbeat_stale")]
    pub heartbeat_stale_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            ipc_name: default_ipc_name(),
            heartbeat_stale_seconds: default_heartbeat_stale(),
        }
    }
}

fn default_ipc_name() -> String {
    "session-supervisor".into()
}

fn default_heartbeat_stale() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    5
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Supervisor polling cadence.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Daily windows during which the worker should be alive.
    #[serde(default)]
    pub sessions: Vec<SessionWindow>,
    /// Wall clock settings.
    #[serde(default)]
    pub clock: ClockConfig,
    /// Worker stop timeouts.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    /// Respawn throttling.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Worker bootstrap timings.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    /// Trading gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Strategies run by the worker.
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
    /// Worker launch and status channel settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Supervisor polling cadence.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.shutdown.grace_seconds == 0 {
            return Err(AppError::Config(
                "shutdown.grace_seconds must be greater than zero".into(),
            ));
        }

        if self.bootstrap.heartbeat_interval_seconds == 0 {
            return Err(AppError::Config(
                "bootstrap.heartbeat_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.worker.heartbeat_stale_seconds <= self.bootstrap.heartbeat_interval_seconds {
            return Err(AppError::Config(
                "worker.heartbeat_stale_seconds must be greater than \
                 bootstrap.heartbeat_interval_seconds"
                    .into(),
            ));
        }

        if self.backoff.max_seconds < self.backoff.initial_seconds {
            return Err(AppError::Config(
                "backoff.max_seconds must not be less than backoff.initial_seconds".into(),
            ));
        }

        let mut seen = HashSet::new();
        for strategy in &self.strategies {
            if !seen.insert(strategy.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate strategy name '{}'",
                    strategy.name
                )));
            }
        }

        if self.sessions.is_empty() {
            warn!("no session windows configured; the worker will never start");
        }

        Ok(())
    }
}

/// Full credential set handed to the gateway's connect request.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
    /// Investor account id.
    pub user_id: String,
    /// Account password (secret).
    pub password: String,
    /// Broker code.
    pub broker_id: String,
    /// Trading front address.
    pub trade_server: String,
    /// Market-data front address.
    pub market_server: String,
    /// Registered product name.
    pub product_name: String,
    /// Product authorisation code (secret).
    pub auth_code: String,
    /// Free-form product information.
    pub product_info: String,
}

impl GatewayCredentials {
    /// Combine TOML settings with secrets loaded at runtime.
    #[must_use]
    pub fn from_parts(gateway: &GatewayConfig, password: String, auth_code: String) -> Self {
        Self {
            user_id: gateway.user_id.clone(),
            password,
            broker_id: gateway.broker_id.clone(),
            trade_server: gateway.trade_server.clone(),
            market_server: gateway.market_server.clone(),
            product_name: gateway.product_name.clone(),
            auth_code,
            product_info: gateway.product_info.clone(),
        }
    }

    /// Load gateway secrets from OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// the required secrets.
    pub async fn load(gateway: &GatewayConfig) -> Result<Self> {
        let password = load_credential("gateway_password", PASSWORD_ENV).await?;
        let auth_code = load_credential("gateway_auth_code", AUTH_CODE_ENV).await?;
        Ok(Self::from_parts(gateway, password, auth_code))
    }
}

impl Debug for GatewayCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("broker_id", &self.broker_id)
            .field("trade_server", &self.trade_server)
            .field("market_server", &self.market_server)
            .field("product_name", &self.product_name)
            .field("auth_code", &"<redacted>")
            .field("product_info", &self.product_info)
            .finish()
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
