//! Value objects handed to the research (history and backtest) collaborator.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Venues accepted for history and backtest requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Exchange {
    /// China Financial Futures Exchange.
    Cffex,
    /// Shanghai Futures Exchange.
    Shfe,
    /// Zhengzhou Commodity Exchange.
    Czce,
    /// Dalian Commodity Exchange.
    Dce,
    /// Shanghai International Energy Exchange.
    Ine,
    /// Shanghai Stock Exchange.
    Sse,
    /// Shenzhen Stock Exchange.
    Szse,
    /// Shanghai Gold Exchange.
    Sge,
}

impl Exchange {
    /// Venue code as used in `vt_symbol` strings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cffex => "CFFEX",
            Self::Shfe => "SHFE",
            Self::Czce => "CZCE",
            Self::Dce => "DCE",
            Self::Ine => "INE",
            Self::Sse => "SSE",
            Self::Szse => "SZSE",
            Self::Sge => "SGE",
        }
    }
}

impl Display for Exchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum Interval {
    /// One-minute bars.
    #[value(name = "1m")]
    #[serde(rename = "1m")]
    Minute,
    /// One-hour bars.
    #[value(name = "1h")]
    #[serde(rename = "1h")]
    Hour,
    /// Daily bars.
    #[value(name = "d")]
    #[serde(rename = "d")]
    Daily,
    /// Weekly bars.
    #[value(name = "w")]
    #[serde(rename = "w")]
    Weekly,
}

impl Interval {
    /// Short code (`1m`, `1h`, `d`, `w`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "1m",
            Self::Hour => "1h",
            Self::Daily => "d",
            Self::Weekly => "w",
        }
    }
}

impl Display for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request for historical bars over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HistoryRequest {
    /// Instrument code, e.g. `IF2007`.
    pub symbol: String,
    /// Listing venue.
    pub exchange: Exchange,
    /// Bar interval.
    pub interval: Interval,
    /// First day requested.
    pub start: NaiveDate,
    /// Last day requested.
    pub end: NaiveDate,
}

impl HistoryRequest {
    /// Engine-wide instrument key, `SYMBOL.EXCHANGE`.
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange)
    }
}

/// Inputs for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BacktestParameters {
    /// Instrument and date range under test.
    pub history: HistoryRequest,
    /// Commission rate.
    pub rate: f64,
    /// Slippage per fill, in price units.
    pub slippage: f64,
    /// Contract multiplier.
    pub size: f64,
    /// Minimum price increment.
    pub pricetick: f64,
    /// Starting capital.
    pub capital: u64,
    /// Strategy class to instantiate.
    pub strategy_class: String,
    /// Strategy parameters read from the setting file.
    pub setting: BTreeMap<String, f64>,
}

/// One day of backtest output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DailyResult {
    /// Trading day.
    pub date: NaiveDate,
    /// Net profit and loss for the day.
    pub net_pnl: f64,
    /// Account balance at close.
    pub balance: f64,
    /// Fills on the day.
    pub trade_count: u32,
}

/// Tabular backtest output returned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Rows in date order.
    pub rows: Vec<DailyResult>,
}

impl ResultTable {
    /// Whether the engine produced any rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of daily net PnL.
    #[must_use]
    pub fn total_net_pnl(&self) -> f64 {
        self.rows.iter().map(|row| row.net_pnl).sum()
    }
}
