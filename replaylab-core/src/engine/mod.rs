//! Backtesting engine: bar-by-bar event loop and position bookkeeping.
//!
//! The engine validates the inputs, precomputes every indicator series the
//! run reads, then runs three phases per bar:
//!
//! 1. Exits: exit policy of each open position, then exit rules
//! 2. Entries: entry rules, MTF confirmation, sizing
//! 3. Post-bar: equity sample

pub mod loop_runner;
pub mod position_manager;
pub mod precompute;
pub mod state;

pub use loop_runner::BacktestEngine;
pub use position_manager::{OpenPosition, PositionManager};
pub use precompute::{entry_atr_name, precompute_indicators, required_indicators, BAR_ATR};
pub use state::{EngineConfig, RunResult};
