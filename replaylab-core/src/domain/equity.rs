use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One equity-curve sample, taken at the close of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Realized balance.
    pub balance: f64,
    /// Balance plus unrealized P&L of open positions.
    pub equity: f64,
}

/// Extract the equity values of a curve.
pub fn equity_values(curve: &[EquityPoint]) -> Vec<f64> {
    curve.iter().map(|p| p.equity).collect()
}
