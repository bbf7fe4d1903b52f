//! Worker bootstrap sequencer.
//!
//! Brings the trading engine online in a fixed order:
//!
//! 1. connect the gateway, then let the connection settle;
//! 2. initialise the strategy engine and every strategy, then let
//!    initialisation settle;
//! 3. start every strategy and enter the heartbeat loop.
//!
//! Each settle phase waits for the collaborator's readiness
//! acknowledgement, bounded by the configured dwell. Collaborators that
//! cannot acknowledge, or drop their signal unsent, get the full dwell as a
//! fixed delay.
//!
//! The sequence never rolls back. Outside strict mode a failed request or
//! an unconfirmed settle is logged and the sequence advances anyway, so a
//! worker can reach steady state with strategies that are not actually
//! trading. Strict mode turns both into [`AppError::Bootstrap`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{BootstrapConfig, GatewayCredentials};
use crate::engine::{Gateway, Readiness, StrategyEngine};
use crate::models::bootstrap::BootstrapState;
use crate::{AppError, Result};

/// Dwell times and strictness of the sequence.
#[derive(Debug, Clone)]
pub struct BootstrapTiming {
    /// Maximum wait for the gateway handshake.
    pub connect_settle: Duration,
    /// Maximum wait for strategy initialisation.
    pub init_settle: Duration,
    /// Steady-state heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// Abort on collaborator errors or readiness timeouts.
    pub strict: bool,
}

impl BootstrapTiming {
    /// Derive timings from the `[bootstrap]` section.
    #[must_use]
    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self {
            connect_settle: Duration::from_secs(config.connect_settle_seconds),
            init_settle: Duration::from_secs(config.init_settle_seconds),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_seconds),
            strict: config.strict,
        }
    }
}

impl Default for BootstrapTiming {
    fn default() -> Self {
        Self::from_config(&BootstrapConfig::default())
    }
}

/// One-shot forward state machine run inside the worker process.
pub struct BootstrapSequencer {
    gateway: Arc<dyn Gateway>,
    engine: Arc<dyn StrategyEngine>,
    credentials: GatewayCredentials,
    timing: BootstrapTiming,
    state: watch::Sender<BootstrapState>,
}

impl BootstrapSequencer {
    /// Create a sequencer in the `Created` state.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn Gateway>,
        engine: Arc<dyn StrategyEngine>,
        credentials: GatewayCredentials,
        timing: BootstrapTiming,
    ) -> Self {
        let (state, _) = watch::channel(BootstrapState::Created);
        Self {
            gateway,
            engine,
            credentials,
            timing,
            state,
        }
    }

    /// Current bootstrap state.
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        *self.state.borrow()
    }

    /// Observe state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    /// Run the whole sequence until `cancel` fires.
    ///
    /// Cancellation is honoured in every phase, including the settle waits.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bootstrap` in strict mode when a request fails or
    /// a readiness acknowledgement does not arrive.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        tokio::select! {
            result = self.bring_online() => result?,
            () = cancel.cancelled() => {
                info!(state = %self.state(), "stop requested during bootstrap");
                return Ok(());
            }
        }

        let beats = self.run_steady_state(&cancel).await;
        info!(beats, "worker stopped");
        Ok(())
    }

    /// Steps from `Created` through `StrategiesRunning`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bootstrap` in strict mode when a request fails or
    /// a readiness acknowledgement does not arrive.
    pub async fn bring_online(&self) -> Result<()> {
        let span = info_span!("bootstrap", gateway_user = %self.credentials.user_id);
        async {
            self.advance(BootstrapState::GatewayConnecting);
            let readiness = match self.gateway.connect(&self.credentials).await {
                Ok(readiness) => readiness,
                Err(err) => self.tolerate("gateway connect", err)?,
            };
            info!("gateway connect requested");

            self.advance(BootstrapState::AwaitingConnectionSettle);
            self.settle("gateway connection", readiness, self.timing.connect_settle)
                .await?;

            self.advance(BootstrapState::InitializingStrategies);
            match self.engine.initialize().await {
                Ok(()) => info!("strategy engine initialized"),
                Err(err) => {
                    self.tolerate("strategy engine initialize", err)?;
                }
            }
            let readiness = match self.engine.init_all_strategies().await {
                Ok(readiness) => readiness,
                Err(err) => self.tolerate("strategy initialization", err)?,
            };
            info!("strategy initialization requested");

            self.advance(BootstrapState::AwaitingInitSettle);
            self.settle("strategy initialization", readiness, self.timing.init_settle)
                .await?;

            self.advance(BootstrapState::StrategiesRunning);
            match self.engine.start_all_strategies().await {
                Ok(()) => info!("all strategies started"),
                Err(err) => {
                    self.tolerate("strategy start", err)?;
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Heartbeat loop; returns the number of heartbeats emitted once
    /// `cancel` fires.
    pub async fn run_steady_state(&self, cancel: &CancellationToken) -> u64 {
        self.advance(BootstrapState::SteadyState);
        let mut ticker = tokio::time::interval(self.timing.heartbeat_interval);
        let mut beats: u64 = 0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    beats += 1;
                    info!(beats, "worker heartbeat");
                }
            }
        }
        beats
    }

    fn advance(&self, next: BootstrapState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(next),
            "illegal bootstrap transition {current} -> {next}"
        );
        self.state.send_replace(next);
        info!(from = %current, to = %next, "bootstrap state changed");
    }

    /// Log a failed request and fall back to an unsignalled wait, or abort
    /// in strict mode.
    fn tolerate(&self, step: &str, err: AppError) -> Result<Readiness> {
        if self.timing.strict {
            return Err(AppError::Bootstrap(format!("{step} failed: {err}")));
        }
        error!(step, %err, "request failed; continuing bootstrap");
        Ok(Readiness::Unsignalled)
    }

    async fn settle(&self, phase: &str, readiness: Readiness, max_wait: Duration) -> Result<()> {
        match readiness {
            Readiness::Unsignalled => {
                info!(phase, dwell = ?max_wait, "no readiness signal; waiting fixed dwell");
                tokio::time::sleep(max_wait).await;
                Ok(())
            }
            Readiness::Acknowledged(rx) => {
                let deadline = Instant::now() + max_wait;
                match tokio::time::timeout_at(deadline, rx).await {
                    Ok(Ok(())) => {
                        info!(phase, "readiness acknowledged");
                        Ok(())
                    }
                    Ok(Err(_)) => {
                        self.unconfirmed(phase, "readiness signal dropped")?;
                        // An unconfirmed request still gets the full dwell.
                        tokio::time::sleep_until(deadline).await;
                        Ok(())
                    }
                    Err(_elapsed) => {
                        self.unconfirmed(phase, &format!("no readiness within {max_wait:?}"))
                    }
                }
            }
        }
    }

    fn unconfirmed(&self, phase: &str, reason: &str) -> Result<()> {
        if self.timing.strict {
            return Err(AppError::Bootstrap(format!("{phase}: {reason}")));
        }
        warn!(phase, reason, "advancing without readiness confirmation");
        Ok(())
    }
}
