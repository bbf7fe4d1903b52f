//! Trading engine collaborator seams.
//!
//! The worker and the research commands never talk to a concrete trading
//! engine directly. Gateway connection, strategy lifecycle and
//! history/backtest requests all route through the traits below so the
//! engine can be swapped (or faked in tests) without touching the
//! bootstrap sequence.
//!
//! Every request is fire-and-forget from the caller's perspective: the
//! future resolves once the request has been *issued*, not once the
//! engine has finished acting on it. Collaborators that can report
//! completion hand back [`Readiness::Acknowledged`].

pub mod paper;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;

use crate::config::GatewayCredentials;
use crate::models::research::{BacktestParameters, HistoryRequest, ResultTable};
use crate::Result;

/// Boxed future returned by collaborator requests.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Completion signal for an asynchronous collaborator request.
#[derive(Debug)]
pub enum Readiness {
    /// The collaborator fires the receiver once the request has completed.
    Acknowledged(oneshot::Receiver<()>),
    /// The collaborator cannot report completion; callers fall back to a
    /// fixed dwell.
    Unsignalled,
}

impl Readiness {
    /// Create an acknowledgement pair. The collaborator keeps the sender.
    #[must_use]
    pub fn channel() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self::Acknowledged(rx))
    }
}

/// Connection to the trading venue.
pub trait Gateway: Send + Sync {
    /// Issue a connect request with venue credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the request
    /// could not be issued.
    fn connect<'a>(&'a self, credentials: &'a GatewayCredentials) -> EngineFuture<'a, Readiness>;
}

/// Live strategy engine.
pub trait StrategyEngine: Send + Sync {
    /// Load strategy configuration and wire market-data subscriptions.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the engine
    /// rejects its configuration.
    fn initialize(&self) -> EngineFuture<'_, ()>;

    /// Request initialisation of every configured strategy.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the request
    /// could not be issued.
    fn init_all_strategies(&self) -> EngineFuture<'_, Readiness>;

    /// Request every strategy to begin trading.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the request
    /// could not be issued.
    fn start_all_strategies(&self) -> EngineFuture<'_, ()>;
}

/// History download and offline backtesting.
pub trait ResearchEngine: Send + Sync {
    /// Strategy classes this engine can instantiate.
    fn strategy_classes(&self) -> Vec<String>;

    /// Request a history download for the given range.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the download
    /// could not be started.
    fn request_history<'a>(&'a self, request: &'a HistoryRequest) -> EngineFuture<'a, ()>;

    /// Run one backtest and return its daily results.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the backtest
    /// cannot be run.
    fn run_backtest<'a>(&'a self, parameters: &'a BacktestParameters)
        -> EngineFuture<'a, ResultTable>;

    /// Present a result table to the operator.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if rendering fails.
    fn render_chart<'a>(&'a self, table: &'a ResultTable) -> EngineFuture<'a, ()>;
}
