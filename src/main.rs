#![forbid(unsafe_code)]

//! `session-supervisor`: trading-session aware worker supervisor.
//!
//! `supervise` runs the parent control loop, `worker` is the child entry
//! point it launches, and `download-data` / `backtesting` drive the
//! research engine directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use session_supervisor::clock::SystemClock;
use session_supervisor::config::{GatewayCredentials, GlobalConfig};
use session_supervisor::engine::paper::PaperEngine;
use session_supervisor::engine::{Gateway, StrategyEngine};
use session_supervisor::ipc::reporter::spawn_heartbeat_reporter;
use session_supervisor::ipc::server::spawn_status_server;
use session_supervisor::ipc::status::StatusBoard;
use session_supervisor::models::research::{
    BacktestParameters, Exchange, HistoryRequest, Interval,
};
use session_supervisor::orchestrator::backoff::RespawnBackoff;
use session_supervisor::orchestrator::bootstrap::{BootstrapSequencer, BootstrapTiming};
use session_supervisor::orchestrator::spawner::{CommandLauncher, WORKER_ID_ENV};
use session_supervisor::orchestrator::supervisor::{Supervisor, SupervisorSettings};
use session_supervisor::research;
use session_supervisor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn as_arg(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "session-supervisor",
    about = "Trading-session aware strategy worker supervisor",
    version,
    long_about = None
)]
struct Cli {
    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep a worker alive during the configured trading sessions.
    Supervise {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
    },

    /// Bootstrap the trading engine and run strategies (launched by `supervise`).
    Worker {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
    },

    /// Download the bar history the backtest engine needs.
    DownloadData(HistoryArgs),

    /// Backtest one strategy over a date range.
    Backtesting(BacktestArgs),
}

#[derive(Debug, Args)]
struct HistoryArgs {
    /// Instrument code.
    #[arg(short = 'n', long, default_value = "000001")]
    symbol: String,

    /// Listing exchange.
    #[arg(short = 'x', long, value_enum, default_value_t = Exchange::Szse)]
    exchange: Exchange,

    /// Bar interval: 1m, 1h, d (daily) or w (weekly).
    #[arg(short = 'i', long, value_enum, default_value_t = Interval::Minute)]
    interval: Interval,

    /// First day, YYYY-MM-DD (default: today).
    #[arg(short = 'b', long = "startdate", value_parser = parse_date)]
    start: Option<NaiveDate>,

    /// Last day, YYYY-MM-DD (default: today).
    #[arg(short = 'e', long = "enddate", value_parser = parse_date)]
    end: Option<NaiveDate>,
}

impl HistoryArgs {
    fn into_request(self) -> HistoryRequest {
        let today = Local::now().date_naive();
        HistoryRequest {
            symbol: self.symbol,
            exchange: self.exchange,
            interval: self.interval,
            start: self.start.unwrap_or(today),
            end: self.end.unwrap_or(today),
        }
    }
}

#[derive(Debug, Args)]
struct BacktestArgs {
    #[command(flatten)]
    history: HistoryArgs,

    /// Commission rate.
    #[arg(short = 'r', long, default_value_t = 0.0)]
    rate: f64,

    /// Slippage per fill.
    #[arg(short = 'l', long, default_value_t = 0.0)]
    slippage: f64,

    /// Contract multiplier.
    #[arg(short = 's', long, default_value_t = 0.0)]
    size: f64,

    /// Minimum price increment.
    #[arg(short = 'p', long, default_value_t = 0.0)]
    pricetick: f64,

    /// Starting capital.
    #[arg(short = 'c', long, default_value_t = 100_000)]
    capital: u64,

    /// Strategy parameter file (`key value` per line).
    #[arg(short = 'f', long, default_value = "backtesting_setting.txt")]
    setting_file: PathBuf,

    /// Strategy class to backtest.
    #[arg(short = 't', long, default_value = "AtrRsiStrategy")]
    strategy_class: String,
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| format!("expected YYYY-MM-DD, got '{raw}': {err}"))
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let log_format = args.log_format;
    match args.command {
        Command::Supervise { config } => supervise(&config, log_format).await,
        Command::Worker { config } => worker(&config).await,
        Command::DownloadData(history) => {
            let engine = PaperEngine::new("CTP", Vec::new());
            research::download_history(&engine, &history.into_request()).await
        }
        Command::Backtesting(backtest) => {
            let setting = research::load_setting_file(&backtest.setting_file)?;
            let parameters = BacktestParameters {
                history: backtest.history.into_request(),
                rate: backtest.rate,
                slippage: backtest.slippage,
                size: backtest.size,
                pricetick: backtest.pricetick,
                capital: backtest.capital,
                strategy_class: backtest.strategy_class,
                setting,
            };
            let engine = PaperEngine::new("CTP", Vec::new());
            research::run_single_backtest(&engine, &parameters)
                .await
                .map(|_| ())
        }
    }
}

async fn supervise(config_path: &Path, log_format: LogFormat) -> Result<()> {
    info!("session supervisor bootstrap");

    // ── Load configuration ──────────────────────────────
    let config_path = config_path
        .canonicalize()
        .map_err(|err| AppError::Config(format!("cannot resolve config path: {err}")))?;
    let config = Arc::new(GlobalConfig::load_from_path(&config_path)?);
    info!(sessions = config.sessions.len(), "configuration loaded");

    let default_args = vec![
        "--log-format".to_owned(),
        log_format.as_arg().to_owned(),
        "worker".to_owned(),
        "--config".to_owned(),
        config_path.to_string_lossy().into_owned(),
    ];
    let launcher = CommandLauncher::from_config(&config.worker, default_args)?;
    let clock = SystemClock::from_config(&config.clock)?;

    // ── Start status channel ────────────────────────────
    let ct = CancellationToken::new();
    let board = Arc::new(StatusBoard::new());
    let ipc_handle =
        match spawn_status_server(&config.worker.ipc_name, Arc::clone(&board), ct.clone()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(%err, "status channel unavailable; supervising without heartbeats");
                None
            }
        };

    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    // ── Supervise ───────────────────────────────────────
    let mut supervisor = Supervisor::new(
        launcher,
        clock,
        config.sessions.clone(),
        SupervisorSettings::from_config(&config),
        RespawnBackoff::from_config(&config.backoff),
    )
    .with_status_board(board);
    supervisor.run(ct.clone()).await;

    ct.cancel();
    if let Some(handle) = ipc_handle {
        let _ = handle.await;
    }
    info!("session supervisor shut down");
    Ok(())
}

async fn worker(config_path: &Path) -> Result<()> {
    let config = GlobalConfig::load_from_path(config_path)?;
    let credentials = GatewayCredentials::load(&config.gateway).await?;

    let engine = Arc::new(PaperEngine::new(
        config.gateway.name.clone(),
        config.strategies.clone(),
    ));
    info!(gateway = %config.gateway.name, strategies = config.strategies.len(), "worker engine created");

    let timing = BootstrapTiming::from_config(&config.bootstrap);
    let heartbeat_interval = timing.heartbeat_interval;
    let sequencer = BootstrapSequencer::new(
        Arc::clone(&engine) as Arc<dyn Gateway>,
        engine as Arc<dyn StrategyEngine>,
        credentials,
        timing,
    );

    let ct = CancellationToken::new();
    let reporter = match std::env::var(WORKER_ID_ENV) {
        Ok(worker_id) => Some(spawn_heartbeat_reporter(
            config.worker.ipc_name.clone(),
            worker_id,
            heartbeat_interval,
            sequencer.subscribe(),
            ct.clone(),
        )),
        Err(_) => {
            info!("not launched by a supervisor; heartbeat reporting disabled");
            None
        }
    };

    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("stop signal received");
        signal_ct.cancel();
    });

    let result = sequencer.run(ct.clone()).await;
    ct.cancel();
    if let Some(handle) = reporter {
        let _ = handle.await;
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
