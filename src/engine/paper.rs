//! In-process paper implementation of the engine collaborators.
//!
//! Stands in for the external trading engine: requests are validated and
//! logged, readiness is acknowledged immediately, and backtests return an
//! empty table. Useful for dry runs of the supervisor and for exercising
//! the bootstrap choreography end to end.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{GatewayCredentials, StrategyConfig};
use crate::engine::{EngineFuture, Gateway, Readiness, ResearchEngine, StrategyEngine};
use crate::models::research::{BacktestParameters, HistoryRequest, ResultTable};
use crate::AppError;

/// Strategy classes known to the paper engine.
pub const BUILTIN_STRATEGY_CLASSES: &[&str] = &["AtrRsiStrategy"];

/// Lifecycle of a strategy instance inside the paper engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    /// Configuration loaded.
    Loaded,
    /// Initialisation completed.
    Initialized,
    /// Receiving market data and emitting orders.
    Trading,
}

#[derive(Debug, Default)]
struct PaperState {
    connected: bool,
    engine_ready: bool,
    strategies: HashMap<String, StrategyStatus>,
}

/// Paper trading engine.
#[derive(Debug)]
pub struct PaperEngine {
    gateway_name: String,
    strategies: Vec<StrategyConfig>,
    strategy_classes: Vec<String>,
    state: Mutex<PaperState>,
}

impl PaperEngine {
    /// Create a paper engine for the given gateway and strategy set.
    #[must_use]
    pub fn new(gateway_name: impl Into<String>, strategies: Vec<StrategyConfig>) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            strategies,
            strategy_classes: BUILTIN_STRATEGY_CLASSES
                .iter()
                .map(|&class| class.to_owned())
                .collect(),
            state: Mutex::new(PaperState::default()),
        }
    }

    /// Whether a connect request has been accepted.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Current status of a strategy instance, if loaded.
    pub async fn strategy_status(&self, name: &str) -> Option<StrategyStatus> {
        self.state.lock().await.strategies.get(name).copied()
    }

    fn ensure_known_class(&self, class_name: &str) -> crate::Result<()> {
        if self.strategy_classes.iter().any(|known| known == class_name) {
            Ok(())
        } else {
            Err(AppError::Engine(format!(
                "unknown strategy class '{class_name}'"
            )))
        }
    }
}

impl Gateway for PaperEngine {
    fn connect<'a>(&'a self, credentials: &'a GatewayCredentials) -> EngineFuture<'a, Readiness> {
        Box::pin(async move {
            info!(
                gateway = %self.gateway_name,
                user_id = %credentials.user_id,
                broker_id = %credentials.broker_id,
                trade_server = %credentials.trade_server,
                "paper gateway connect requested"
            );
            self.state.lock().await.connected = true;

            let (tx, readiness) = Readiness::channel();
            // Receiver is still held by `readiness`; send cannot fail here.
            let _ = tx.send(());
            Ok(readiness)
        })
    }
}

impl StrategyEngine for PaperEngine {
    fn initialize(&self) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for strategy in &self.strategies {
                self.ensure_known_class(&strategy.class_name)?;
                state
                    .strategies
                    .insert(strategy.name.clone(), StrategyStatus::Loaded);
                info!(
                    strategy = %strategy.name,
                    class_name = %strategy.class_name,
                    vt_symbol = %strategy.vt_symbol,
                    "strategy loaded"
                );
            }
            state.engine_ready = true;
            Ok(())
        })
    }

    fn init_all_strategies(&self) -> EngineFuture<'_, Readiness> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !state.engine_ready {
                return Err(AppError::Engine(
                    "strategy engine has not been initialized".into(),
                ));
            }
            for (name, status) in &mut state.strategies {
                *status = StrategyStatus::Initialized;
                info!(strategy = %name, "strategy initialized");
            }

            let (tx, readiness) = Readiness::channel();
            // Receiver is still held by `readiness`; send cannot fail here.
            let _ = tx.send(());
            Ok(readiness)
        })
    }

    fn start_all_strategies(&self) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for (name, status) in &mut state.strategies {
                if *status == StrategyStatus::Loaded {
                    warn!(strategy = %name, "strategy not initialized, cannot start");
                    continue;
                }
                *status = StrategyStatus::Trading;
                info!(strategy = %name, "strategy started");
            }
            Ok(())
        })
    }
}

impl ResearchEngine for PaperEngine {
    fn strategy_classes(&self) -> Vec<String> {
        self.strategy_classes.clone()
    }

    fn request_history<'a>(&'a self, request: &'a HistoryRequest) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            if request.start > request.end {
                return Err(AppError::Engine(format!(
                    "history range is inverted: {} > {}",
                    request.start, request.end
                )));
            }
            info!(
                vt_symbol = %request.vt_symbol(),
                interval = %request.interval,
                start = %request.start,
                end = %request.end,
                "paper history download requested"
            );
            Ok(())
        })
    }

    fn run_backtest<'a>(
        &'a self,
        parameters: &'a BacktestParameters,
    ) -> EngineFuture<'a, ResultTable> {
        Box::pin(async move {
            self.ensure_known_class(&parameters.strategy_class)?;
            if parameters.history.start > parameters.history.end {
                return Err(AppError::Engine(format!(
                    "backtest range is inverted: {} > {}",
                    parameters.history.start, parameters.history.end
                )));
            }
            info!(
                vt_symbol = %parameters.history.vt_symbol(),
                strategy_class = %parameters.strategy_class,
                capital = parameters.capital,
                setting_keys = parameters.setting.len(),
                "paper backtest run"
            );
            warn!("paper engine has no market data; backtest produced no fills");
            Ok(ResultTable::default())
        })
    }

    fn render_chart<'a>(&'a self, table: &'a ResultTable) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            if table.is_empty() {
                info!("no backtest rows to chart");
                return Ok(());
            }
            for row in &table.rows {
                info!(
                    date = %row.date,
                    net_pnl = row.net_pnl,
                    balance = row.balance,
                    trades = row.trade_count,
                    "daily result"
                );
            }
            info!(
                days = table.rows.len(),
                total_net_pnl = table.total_net_pnl(),
                "backtest summary"
            );
            Ok(())
        })
    }
}
