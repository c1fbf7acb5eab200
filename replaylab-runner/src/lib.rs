//! ReplayLab Runner: run orchestration, performance analysis, sizing simulation.
//!
//! This crate builds on `replaylab-core` to provide:
//! - TOML run configuration
//! - Single and parallel batch runs producing `BacktestResult`
//! - Performance metrics and tail statistics
//! - Position sizing simulation over a list of trades

pub mod config;
pub mod metrics;
pub mod runner;
pub mod sizing_sim;
pub mod tail_metrics;

pub use config::{load_config, load_sizing_config, load_trades, ConfigError, RunConfig, SizingFile};
pub use metrics::PerformanceMetrics;
pub use runner::{run_backtest, run_batch, run_with_source, BacktestResult, RunError, RunMetadata};
pub use sizing_sim::{
    PositionSizingSimulator, SimulatedTrade, SimulatedTradeResult, SimulationConfig, SimulationError,
    SimulationResults,
};
pub use tail_metrics::{compute_tail_metrics, TailMetrics};
