//! ReplayLab Core: rule-driven bar replay for FX-style instruments.
//!
//! This crate contains the backtesting engine:
//! - Domain types (bars, symbol specs, positions, trade records, equity)
//! - Indicator engine with precomputed series
//! - Strategy rule interpreter
//! - Exit policies (fixed, smart, trailing, partial ladders)
//! - Multi-timeframe confirmation
//! - Position sizers
//! - Bar-by-bar event loop and position manager

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod exits;
pub mod indicators;
pub mod market;
pub mod mtf;
pub mod rules;
pub mod sizers;

pub use engine::{BacktestEngine, EngineConfig, RunResult};
pub use error::{CalculatorError, EngineError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything a runner shares across worker threads
    /// is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();
        require_send::<domain::SymbolTable>();
        require_sync::<domain::SymbolTable>();
        require_send::<domain::RunFingerprint>();
        require_sync::<domain::RunFingerprint>();

        // Strategy and indicator types
        require_send::<rules::Strategy>();
        require_sync::<rules::Strategy>();
        require_send::<indicators::IndicatorValues>();
        require_sync::<indicators::IndicatorValues>();
        require_send::<mtf::MtfConfirmationEngine>();
        require_sync::<mtf::MtfConfirmationEngine>();

        // Collaborators
        require_send::<exits::AtrSwingExitCalculator>();
        require_sync::<exits::AtrSwingExitCalculator>();
        require_send::<exits::TriggerLadderManager>();
        require_sync::<exits::TriggerLadderManager>();
        require_send::<sizers::DynamicSizer>();
        require_sync::<sizers::DynamicSizer>();

        // Engine types
        require_send::<engine::BacktestEngine>();
        require_sync::<engine::BacktestEngine>();
        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();
        require_send::<engine::RunResult>();
        require_sync::<engine::RunResult>();
    }

    /// Exit calculators, partial managers and sizers are used as trait
    /// objects by the engine.
    #[test]
    fn collaborator_traits_are_object_safe() {
        fn _calculator(_: &dyn exits::ExitCalculator) {}
        fn _manager(_: &dyn exits::PartialExitManager) {}
        fn _sizer(_: &dyn sizers::SizingCalculator) {}
        fn _source(_: &dyn data::HistoricalDataSource) {}
    }
}
