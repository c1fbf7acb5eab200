//! Backtest runner: wires together config, data source, engine and metrics.
//!
//! Entry points:
//! - `run_backtest()`: picks the data source named by the config. Used by the CLI.
//! - `run_with_source()`: takes any `HistoricalDataSource`, plus an optional
//!   cancellation flag.
//! - `run_batch()`: independent configs in parallel, one engine each.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use replaylab_core::data::{CsvDataSource, DataError, HistoricalDataSource, SyntheticDataSource};
use replaylab_core::domain::{equity_values, Bar, EquityPoint, RunFingerprint, Timeframe, TradeRecord};
use replaylab_core::engine::{BacktestEngine, RunResult};
use replaylab_core::error::EngineError;

use crate::config::{ConfigError, RunConfig};
use crate::metrics::PerformanceMetrics;
use crate::tail_metrics::{compute_tail_metrics, TailMetrics};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("failed to fingerprint run inputs: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Where the bars came from and what the engine did with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// BLAKE3 over the config and the primary bars.
    pub run_id: RunFingerprint,
    pub strategy_id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub data_source: String,
    pub bar_count: usize,
    pub bars_processed: usize,
    /// Bars loaded per confirmation timeframe.
    pub confirmation_bars: BTreeMap<Timeframe, usize>,
    pub cancelled: bool,
    pub mtf_rejections: usize,
    pub sizing_blocked: usize,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub metrics: PerformanceMetrics,
    pub tail: TailMetrics,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub metadata: RunMetadata,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// Attach metrics to an engine result.
    pub fn from_run(run: RunResult, metadata: RunMetadata) -> Self {
        let metrics = PerformanceMetrics::compute(&run.trades, &run.equity_curve, run.initial_balance);
        let profits: Vec<f64> = run.trades.iter().map(|t| t.profit).collect();
        Self {
            schema_version: SCHEMA_VERSION,
            initial_balance: run.initial_balance,
            final_balance: run.final_balance,
            metrics,
            tail: compute_tail_metrics(&profits),
            trades: run.trades,
            equity_curve: run.equity_curve,
            metadata,
        }
    }

    /// Equity values with the initial balance in front.
    pub fn equity_values(&self) -> Vec<f64> {
        let mut values = vec![self.initial_balance];
        values.extend(equity_values(&self.equity_curve));
        values
    }
}

/// The data source a config asks for.
pub fn source_for(config: &RunConfig) -> Box<dyn HistoricalDataSource> {
    match &config.run.data_dir {
        Some(dir) => Box::new(CsvDataSource::new(dir)),
        None => Box::new(SyntheticDataSource::default()),
    }
}

/// Run one backtest, loading bars from the config's data source.
pub fn run_backtest(config: &RunConfig) -> Result<BacktestResult, RunError> {
    let source = source_for(config);
    run_with_source(config, source.as_ref(), None)
}

/// Run one backtest against `source`.
///
/// A missing confirmation stream is not an error: the run goes ahead and
/// every confirmation on that timeframe fails.
pub fn run_with_source(
    config: &RunConfig,
    source: &dyn HistoricalDataSource,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let run = &config.run;
    let strategy = config.strategy();

    let bars = source.fetch(&run.symbol, run.timeframe, run.start, run.end)?;
    debug!(source = source.name(), bars = bars.len(), "primary bars loaded");
    let confirmations = load_confirmations(config, source)?;

    let mut engine = BacktestEngine::new(config.symbol_table().into_shared(), config.engine_config());
    if let Some(flag) = cancel {
        engine = engine.with_cancel_flag(flag);
    }
    let result = engine.run_with_confirmations(&strategy, &bars, &confirmations)?;

    let metadata = RunMetadata {
        run_id: fingerprint(config, &bars)?,
        strategy_id: strategy.id.clone(),
        symbol: run.symbol.clone(),
        timeframe: run.timeframe,
        start: run.start,
        end: run.end,
        data_source: source.name().to_string(),
        bar_count: bars.len(),
        bars_processed: result.bars_processed,
        confirmation_bars: confirmations.iter().map(|(tf, b)| (*tf, b.len())).collect(),
        cancelled: result.cancelled,
        mtf_rejections: result.mtf_rejections,
        sizing_blocked: result.sizing_blocked,
    };
    let result = BacktestResult::from_run(result, metadata);

    info!(
        run_id = %result.metadata.run_id,
        trades = result.metrics.trade_count,
        net_profit = result.metrics.net_profit,
        max_drawdown = result.metrics.max_drawdown,
        "run complete"
    );
    Ok(result)
}

/// Run independent configs in parallel. Results keep the input order.
pub fn run_batch(configs: &[RunConfig]) -> Vec<Result<BacktestResult, RunError>> {
    info!(runs = configs.len(), "starting batch");
    configs.par_iter().map(run_backtest).collect()
}

fn load_confirmations(
    config: &RunConfig,
    source: &dyn HistoricalDataSource,
) -> Result<HashMap<Timeframe, Vec<Bar>>, RunError> {
    let mut streams = HashMap::new();
    let Some(mtf) = &config.strategy.mtf else {
        return Ok(streams);
    };
    let run = &config.run;
    for timeframe in mtf.timeframes() {
        match source.fetch(&run.symbol, timeframe, run.start, run.end) {
            Ok(bars) => {
                streams.insert(timeframe, bars);
            }
            Err(DataError::NotFound { .. }) => {
                warn!(%timeframe, symbol = %run.symbol, "no confirmation bars; confirmations on this timeframe will fail");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(streams)
}

fn fingerprint(config: &RunConfig, bars: &[Bar]) -> Result<RunFingerprint, RunError> {
    let config_json = serde_json::to_vec(config)?;
    let bars_json = serde_json::to_vec(bars)?;
    Ok(RunFingerprint::from_parts(&[&config_json, &bars_json]))
}
