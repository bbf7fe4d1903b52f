//! History download and single-run backtest commands.
//!
//! Thin glue over the [`ResearchEngine`] collaborator. The only parsing
//! owned here is the flat strategy setting file: one `key value` pair per
//! line, numeric values, blank lines and `#` comments ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{info, info_span, Instrument};

use crate::engine::ResearchEngine;
use crate::models::research::{BacktestParameters, HistoryRequest, ResultTable};
use crate::{AppError, Result};

/// Parse setting-file text into a parameter map.
///
/// # Errors
///
/// Returns `AppError::Config` naming the first malformed line.
pub fn parse_setting_str(raw: &str) -> Result<BTreeMap<String, f64>> {
    let mut setting = BTreeMap::new();

    for (index, line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(AppError::Config(format!(
                "setting line {line_no}: expected 'key value', got '{trimmed}'"
            )));
        };

        let number: f64 = value.parse().map_err(|err| {
            AppError::Config(format!(
                "setting line {line_no}: value for '{key}' is not a number: {err}"
            ))
        })?;
        setting.insert(key.to_owned(), number);
    }

    Ok(setting)
}

/// Read and parse a setting file.
///
/// # Errors
///
/// Returns `AppError::Config` if the file is missing or malformed.
pub fn load_setting_file(path: impl AsRef<Path>) -> Result<BTreeMap<String, f64>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| {
        AppError::Config(format!(
            "failed to read setting file '{}': {err}",
            path.display()
        ))
    })?;
    parse_setting_str(&raw)
}

/// Ask the engine to download history for `request`.
///
/// # Errors
///
/// Returns `AppError::Config` for an inverted date range, or the engine's
/// error if the download cannot be started.
pub async fn download_history(engine: &dyn ResearchEngine, request: &HistoryRequest) -> Result<()> {
    ensure_ordered(request)?;
    let span = info_span!("download_history", vt_symbol = %request.vt_symbol());
    async {
        engine.request_history(request).await?;
        info!(interval = %request.interval, "history download requested");
        Ok(())
    }
    .instrument(span)
    .await
}

/// Run one backtest and render its result table.
///
/// # Errors
///
/// Returns `AppError::Config` for an unknown strategy class or an inverted
/// date range, or the engine's error if the run fails.
pub async fn run_single_backtest(
    engine: &dyn ResearchEngine,
    parameters: &BacktestParameters,
) -> Result<ResultTable> {
    ensure_ordered(&parameters.history)?;

    let classes = engine.strategy_classes();
    if !classes.iter().any(|class| *class == parameters.strategy_class) {
        return Err(AppError::Config(format!(
            "unknown strategy class '{}' (available: {})",
            parameters.strategy_class,
            classes.join(", ")
        )));
    }

    let span = info_span!(
        "backtest",
        vt_symbol = %parameters.history.vt_symbol(),
        strategy_class = %parameters.strategy_class
    );
    async {
        let table = engine.run_backtest(parameters).await?;
        info!(days = table.rows.len(), "backtest finished");
        engine.render_chart(&table).await?;
        Ok(table)
    }
    .instrument(span)
    .await
}

fn ensure_ordered(request: &HistoryRequest) -> Result<()> {
    if request.start > request.end {
        return Err(AppError::Config(format!(
            "start date {} is after end date {}",
            request.start, request.end
        )));
    }
    Ok(())
}
