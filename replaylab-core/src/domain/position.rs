use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::PositionId;
use super::instrument::SymbolSpec;

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// Move `distance` away from `price` in the favourable direction.
    pub fn favourable(self, price: f64, distance: f64) -> f64 {
        price + self.sign() * distance
    }

    /// Move `distance` away from `price` in the adverse direction.
    pub fn adverse(self, price: f64, distance: f64) -> f64 {
        price - self.sign() * distance
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("long"),
            Direction::Short => f.write_str("short"),
        }
    }
}

/// Profit on a closed quantity, in account currency.
///
/// `(exit - entry) / pip_size * size * pip_value_factor`, sign-flipped for shorts.
pub fn pip_profit(
    direction: Direction,
    entry_price: f64,
    exit_price: f64,
    size: f64,
    spec: &SymbolSpec,
) -> f64 {
    direction.sign() * (exit_price - entry_price) / spec.pip_size * size * spec.pip_value_factor
}

/// An open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    /// Size at entry, in lots.
    pub original_size: f64,
    /// Size still open after partial exits.
    pub remaining_size: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Stop level at entry; the R-multiple reference.
    pub initial_stop: f64,
}

impl Position {
    /// Distance between entry and the initial stop.
    pub fn risk_distance(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    pub fn unrealized_pnl(&self, price: f64, spec: &SymbolSpec) -> f64 {
        pip_profit(self.direction, self.entry_price, price, self.remaining_size, spec)
    }

    /// True when stop and target sit on the correct side of entry.
    pub fn levels_are_consistent(&self) -> bool {
        levels_on_correct_side(self.direction, self.entry_price, self.stop_loss, self.take_profit)
    }

    /// True once the stop has moved past its entry level in the favourable direction.
    pub fn stop_was_trailed(&self) -> bool {
        match self.direction {
            Direction::Long => self.stop_loss > self.initial_stop + f64::EPSILON,
            Direction::Short => self.stop_loss < self.initial_stop - f64::EPSILON,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.remaining_size <= 1e-12
    }
}

/// Stop below and target above entry for longs; the reverse for shorts.
pub fn levels_on_correct_side(direction: Direction, entry: f64, stop: f64, target: f64) -> bool {
    if !(entry.is_finite() && stop.is_finite() && target.is_finite()) {
        return false;
    }
    match direction {
        Direction::Long => stop < entry && target > entry,
        Direction::Short => stop > entry && target < entry,
    }
}
