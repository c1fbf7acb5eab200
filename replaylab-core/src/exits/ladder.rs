//! R-multiple partial-exit ladder.
//!
//! Each rung sits at `entry ± r_multiple × original stop distance` and closes
//! `percent` of the original size once. Rungs never re-fire, even when price
//! revisits them.

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, Position};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderLevel {
    /// Target in multiples of the original stop distance.
    pub r_multiple: f64,
    /// Percent of the original size closed at this level (0–100].
    pub percent: f64,
}

impl LadderLevel {
    pub fn new(r_multiple: f64, percent: f64) -> Self {
        Self { r_multiple, percent }
    }

    pub fn is_valid(&self) -> bool {
        self.r_multiple.is_finite() && self.r_multiple > 0.0 && self.percent > 0.0 && self.percent <= 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RungStatus {
    Pending,
    Triggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rung {
    pub level: LadderLevel,
    pub price: f64,
    pub status: RungStatus,
}

/// A rung that fired on this bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RungFill {
    pub rung: usize,
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialLadder {
    rungs: Vec<Rung>,
}

impl PartialLadder {
    /// Build rungs for a position entered at `entry` with stop `stop`.
    /// Invalid levels are dropped; the rest are ordered by distance from entry.
    pub fn new(direction: Direction, entry: f64, stop: f64, levels: &[LadderLevel]) -> Self {
        let distance = (entry - stop).abs();
        let mut levels: Vec<LadderLevel> = levels.iter().copied().filter(LadderLevel::is_valid).collect();
        levels.sort_by(|a, b| a.r_multiple.total_cmp(&b.r_multiple));
        let rungs = levels
            .into_iter()
            .map(|level| Rung {
                level,
                price: direction.favourable(entry, level.r_multiple * distance),
                status: RungStatus::Pending,
            })
            .collect();
        Self { rungs }
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    /// Fire the first pending rung reached by `price`, if any.
    ///
    /// The closed size is the rung's share of the original size, capped at
    /// what is still open.
    pub fn check(&mut self, position: &Position, price: f64) -> Option<RungFill> {
        if position.risk_distance() <= 0.0 {
            return None;
        }
        let (index, rung) = self
            .rungs
            .iter_mut()
            .enumerate()
            .find(|(_, r)| r.status == RungStatus::Pending)?;
        let reached = match position.direction {
            Direction::Long => price >= rung.price,
            Direction::Short => price <= rung.price,
        };
        if !reached {
            return None;
        }
        rung.status = RungStatus::Triggered;
        let size = (position.original_size * rung.level.percent / 100.0).min(position.remaining_size);
        Some(RungFill {
            rung: index,
            price: rung.price,
            size,
        })
    }
}
