//! Engine configuration and run result types.

use serde::{Deserialize, Serialize};

use crate::domain::{EquityPoint, TradeRecord};
use crate::error::EngineError;
use crate::exits::ExitConfig;
use crate::market::RegimeDetector;
use crate::sizers::SizingConfig;

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_balance: f64,
    /// Concurrent open positions allowed (default 1).
    pub max_positions: usize,
    /// Lots per entry when no sizer is configured, and the fallback when
    /// the sizer fails.
    pub position_size: f64,
    pub exit: ExitConfig,
    pub sizing: Option<SizingConfig>,
    pub regime: RegimeDetector,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            max_positions: 1,
            position_size: 1.0,
            exit: ExitConfig::default(),
            sizing: None,
            regime: RegimeDetector::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            ..Self::default()
        }
    }

    pub fn with_exit(mut self, exit: ExitConfig) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_position_size(mut self, lots: f64) -> Self {
        self.position_size = lots;
        self
    }

    pub fn with_max_positions(mut self, max_positions: usize) -> Self {
        self.max_positions = max_positions;
        self
    }

    pub fn with_sizing(mut self, sizing: SizingConfig) -> Self {
        self.sizing = Some(sizing);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.initial_balance > 0.0 && self.initial_balance.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }
        if self.max_positions == 0 {
            return Err(EngineError::InvalidConfig("max_positions must be at least 1".into()));
        }
        if !(self.position_size > 0.0 && self.position_size.is_finite()) {
            return Err(EngineError::InvalidConfig(format!(
                "position_size must be positive, got {}",
                self.position_size
            )));
        }
        self.exit.validate().map_err(EngineError::InvalidConfig)?;
        if let Some(sizing) = &self.sizing {
            sizing.validate().map_err(EngineError::InvalidConfig)?;
        }
        Ok(())
    }
}

/// Result of a complete backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub initial_balance: f64,
    pub final_balance: f64,
    /// Every full and partial close, in the order they happened.
    pub trades: Vec<TradeRecord>,
    /// One sample per processed bar.
    pub equity_curve: Vec<EquityPoint>,
    pub bars_processed: usize,
    /// The run stopped early on the cancellation flag.
    pub cancelled: bool,
    /// Entry signals dropped because a required confirmation failed.
    pub mtf_rejections: usize,
    /// Entry signals dropped because the sizer returned zero lots.
    pub sizing_blocked: usize,
}

impl RunResult {
    pub fn net_profit(&self) -> f64 {
        self.final_balance - self.initial_balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exits::ExitMode;

    #[test]
    fn engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.initial_balance, 10_000.0);
        assert_eq!(config.max_positions, 1);
        assert_eq!(config.position_size, 1.0);
        assert_eq!(config.exit.mode, ExitMode::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn non_positive_size_is_rejected() {
        let err = EngineConfig::default().with_position_size(0.0).validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn zero_max_positions_is_rejected() {
        assert!(EngineConfig::default().with_max_positions(0).validate().is_err());
    }

    #[test]
    fn bad_exit_config_is_rejected() {
        let config = EngineConfig::default().with_exit(ExitConfig::fixed(0.0, 0.04));
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn bad_sizing_config_is_rejected() {
        let config = EngineConfig::default().with_sizing(SizingConfig::fixed_lot(-1.0));
        assert!(config.validate().is_err());
    }
}
