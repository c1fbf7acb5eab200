//! Position sizers: how many lots an entry gets.
//!
//! Sizers read the account (balance, open positions, today's realised P&L)
//! and the market context of the entry bar. They never decide whether to
//! enter; a decision of zero lots just skips the entry.

pub mod config;
pub mod dynamic;

pub use config::{SizingConfig, SizingMethod};
pub use dynamic::DynamicSizer;

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, SymbolSpec};
use crate::error::CalculatorError;

/// Inputs for one sizing decision.
#[derive(Debug, Clone, Copy)]
pub struct SizingRequest<'a> {
    pub balance: f64,
    /// Balance plus unrealised P&L.
    pub equity: f64,
    pub direction: Direction,
    pub entry_price: f64,
    /// Distance to the planned stop, in pips.
    pub stop_loss_pips: Option<f64>,
    /// ATR at the entry bar, in price units.
    pub atr: Option<f64>,
    /// Current volatility reading, in the same unit as the configured
    /// normal volatility.
    pub volatility: Option<f64>,
    pub open_positions: usize,
    /// Realised P&L since the start of the entry's trading day.
    pub daily_pnl: f64,
    /// Profits of earlier trades, oldest first.
    pub recent_profits: &'a [f64],
    pub spec: &'a SymbolSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingDecision {
    /// Lots; zero means do not enter.
    pub size: f64,
    /// Account currency lost if the stop is hit; zero when no stop is known.
    pub risk_amount: f64,
    /// `risk_amount` as a percentage of balance.
    pub risk_percent: f64,
    pub warnings: Vec<String>,
}

impl SizingDecision {
    pub fn blocked(warning: impl Into<String>) -> Self {
        Self {
            size: 0.0,
            risk_amount: 0.0,
            risk_percent: 0.0,
            warnings: vec![warning.into()],
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.size <= 0.0
    }
}

/// Position sizing logic.
pub trait SizingCalculator: Send + Sync {
    fn calculate(&self, request: &SizingRequest<'_>) -> Result<SizingDecision, CalculatorError>;

    /// Name for logs and reports.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HalfLot;

    impl SizingCalculator for HalfLot {
        fn calculate(&self, _request: &SizingRequest<'_>) -> Result<SizingDecision, CalculatorError> {
            Ok(SizingDecision {
                size: 0.5,
                risk_amount: 0.0,
                risk_percent: 0.0,
                warnings: Vec::new(),
            })
        }

        fn name(&self) -> &str {
            "half"
        }
    }

    #[test]
    fn trait_objects_work() {
        let spec = SymbolSpec::new("EURUSD", 0.0001, 10.0);
        let sizer: Box<dyn SizingCalculator> = Box::new(HalfLot);
        let request = SizingRequest {
            balance: 10_000.0,
            equity: 10_000.0,
            direction: Direction::Long,
            entry_price: 1.1,
            stop_loss_pips: None,
            atr: None,
            volatility: None,
            open_positions: 0,
            daily_pnl: 0.0,
            recent_profits: &[],
            spec: &spec,
        };
        assert_eq!(sizer.calculate(&request).unwrap().size, 0.5);
        assert_eq!(sizer.name(), "half");
    }

    #[test]
    fn blocked_decision_has_zero_size() {
        let decision = SizingDecision::blocked("limit");
        assert!(decision.is_blocked());
        assert_eq!(decision.warnings, vec!["limit".to_string()]);
    }
}
