//! TradeRecord: an immutable record of a full or partial close.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::PositionId;
use super::position::Direction;

/// Why a quantity was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
    PartialExit,
    MaxHoldingTime,
    ExitSignal,
    EndOfData,
}

impl CloseReason {
    pub fn label(self) -> &'static str {
        match self {
            CloseReason::StopLoss => "Stop Loss",
            CloseReason::TrailingStop => "Trailing Stop",
            CloseReason::TakeProfit => "Take Profit",
            CloseReason::PartialExit => "Partial Exit",
            CloseReason::MaxHoldingTime => "Max Holding Time",
            CloseReason::ExitSignal => "Exit Signal",
            CloseReason::EndOfData => "End of Data",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A closed quantity of a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub position_id: PositionId,
    pub symbol: String,
    pub direction: Direction,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,

    // ── Size / PnL ──
    /// Quantity closed by this record, in lots.
    pub size: f64,
    pub pips: f64,
    pub profit: f64,

    pub close_reason: CloseReason,
    /// True when the position stayed open after this close, or when it was
    /// closed by the last rung of a partial-exit ladder.
    pub partial: bool,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.profit > 0.0
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar.saturating_sub(self.entry_bar)
    }

    pub fn holding_hours(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 3_600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_trade() -> TradeRecord {
        TradeRecord {
            position_id: PositionId(3),
            symbol: "EURUSD".into(),
            direction: Direction::Long,
            entry_bar: 4,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap(),
            entry_price: 1.1000,
            exit_bar: 10,
            exit_time: Utc.with_ymd_and_hms(2024, 1, 5, 16, 30, 0).unwrap(),
            exit_price: 1.1040,
            size: 0.5,
            pips: 40.0,
            profit: 200.0,
            close_reason: CloseReason::TakeProfit,
            partial: false,
        }
    }

    #[test]
    fn holding_period() {
        let trade = sample_trade();
        assert_eq!(trade.bars_held(), 6);
        assert!((trade.holding_hours() - 6.5).abs() < 1e-9);
    }

    #[test]
    fn is_winner() {
        assert!(sample_trade().is_winner());
    }

    #[test]
    fn close_reason_labels() {
        assert_eq!(CloseReason::StopLoss.to_string(), "Stop Loss");
        assert_eq!(CloseReason::EndOfData.to_string(), "End of Data");
        assert_eq!(CloseReason::MaxHoldingTime.to_string(), "Max Holding Time");
    }

    #[test]
    fn trade_serialization_roundtrip() {
        let trade = sample_trade();
        let json = serde_json::to_string(&trade).unwrap();
        assert!(json.contains("\"take_profit\""));
        let deser: TradeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deser);
    }
}
