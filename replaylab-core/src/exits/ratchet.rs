//! Ratchet invariant for trailing stops.
//!
//! **Core rule:** a trailed stop may tighten, never loosen.
//! Long stops only rise; short stops only fall.

use serde::{Deserialize, Serialize};

use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatchetState {
    /// High-water mark for longs, low-water mark for shorts.
    current_level: Option<f64>,
    direction: Direction,
}

impl RatchetState {
    pub fn new(direction: Direction) -> Self {
        Self {
            current_level: None,
            direction,
        }
    }

    pub fn with_initial_level(direction: Direction, initial_level: f64) -> Self {
        Self {
            current_level: Some(initial_level),
            direction,
        }
    }

    /// Apply the ratchet to a proposed stop and return the resulting level.
    ///
    /// # Example
    /// ```
    /// use replaylab_core::domain::Direction;
    /// use replaylab_core::exits::RatchetState;
    ///
    /// let mut ratchet = RatchetState::with_initial_level(Direction::Long, 1.0950);
    /// assert_eq!(ratchet.apply(1.0975), 1.0975);
    /// assert_eq!(ratchet.apply(1.0900), 1.0975);
    /// ```
    pub fn apply(&mut self, proposed: f64) -> f64 {
        let level = match self.current_level {
            None => proposed,
            Some(current) => match self.direction {
                Direction::Long => current.max(proposed),
                Direction::Short => current.min(proposed),
            },
        };
        self.current_level = Some(level);
        level
    }

    pub fn current_level(&self) -> Option<f64> {
        self.current_level
    }
}

/// Stop that follows price at a fixed distance, through a ratchet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    ratchet: RatchetState,
    distance: f64,
}

impl TrailingStop {
    pub fn new(direction: Direction, initial_stop: f64, distance: f64) -> Self {
        Self {
            ratchet: RatchetState::with_initial_level(direction, initial_stop),
            distance,
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Propose `price ∓ distance`; returns the new stop only if it moved.
    pub fn update(&mut self, direction: Direction, price: f64) -> Option<f64> {
        let before = self.ratchet.current_level();
        let after = self.ratchet.apply(direction.adverse(price, self.distance));
        match before {
            Some(b) if (after - b).abs() <= f64::EPSILON => None,
            _ => Some(after),
        }
    }

    pub fn level(&self) -> Option<f64> {
        self.ratchet.current_level()
    }
}
