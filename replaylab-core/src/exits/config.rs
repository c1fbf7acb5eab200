use serde::{Deserialize, Serialize};

use super::calculator::SmartExitConfig;
use super::partial_manager::PartialLevelConfig;
use crate::domain::{Bar, Direction};

/// Which bar prices trigger stops, targets and ladder levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Bar close only.
    #[default]
    Close,
    /// Bar extremes: low/high for the adverse/favourable side.
    HighLow,
}

impl TriggerSource {
    /// Price that could hit a stop.
    pub fn adverse_price(self, bar: &Bar, direction: Direction) -> f64 {
        match (self, direction) {
            (TriggerSource::Close, _) => bar.close,
            (TriggerSource::HighLow, Direction::Long) => bar.low,
            (TriggerSource::HighLow, Direction::Short) => bar.high,
        }
    }

    /// Price that could reach a target.
    pub fn favourable_price(self, bar: &Bar, direction: Direction) -> f64 {
        match (self, direction) {
            (TriggerSource::Close, _) => bar.close,
            (TriggerSource::HighLow, Direction::Long) => bar.high,
            (TriggerSource::HighLow, Direction::Short) => bar.low,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancedPartialConfig {
    pub levels: Vec<PartialLevelConfig>,
    /// Minimum minutes between two partial exits of one position.
    pub cooldown_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExitMode {
    Fixed,
    Smart(SmartExitConfig),
    EnhancedPartial(EnhancedPartialConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConfig {
    #[serde(flatten)]
    pub mode: ExitMode,
    /// Stop distance as a fraction of entry. Used by fixed mode, by the
    /// smart-exit fallback and for the initial levels of enhanced partial mode.
    #[serde(default = "default_stop_fraction")]
    pub stop_fraction: f64,
    #[serde(default = "default_target_fraction")]
    pub target_fraction: f64,
    #[serde(default)]
    pub trigger: TriggerSource,
    /// Trailing distance as a fraction of the original stop distance.
    #[serde(default = "default_trail_factor")]
    pub trail_factor: f64,
}

fn default_stop_fraction() -> f64 {
    0.02
}

fn default_target_fraction() -> f64 {
    0.04
}

fn default_trail_factor() -> f64 {
    0.5
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            mode: ExitMode::Fixed,
            stop_fraction: default_stop_fraction(),
            target_fraction: default_target_fraction(),
            trigger: TriggerSource::default(),
            trail_factor: default_trail_factor(),
        }
    }
}

impl ExitConfig {
    pub fn fixed(stop_fraction: f64, target_fraction: f64) -> Self {
        Self {
            stop_fraction,
            target_fraction,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ExitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerSource) -> Self {
        self.trigger = trigger;
        self
    }

    /// Fixed-distance (stop, target) for an entry.
    pub fn fixed_levels(&self, direction: Direction, entry: f64) -> (f64, f64) {
        (
            direction.adverse(entry, entry * self.stop_fraction),
            direction.favourable(entry, entry * self.target_fraction),
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.stop_fraction > 0.0 && self.stop_fraction < 1.0) {
            return Err(format!("stop_fraction must be in (0, 1), got {}", self.stop_fraction));
        }
        if !(self.target_fraction > 0.0) {
            return Err(format!("target_fraction must be positive, got {}", self.target_fraction));
        }
        if !(self.trail_factor > 0.0 && self.trail_factor.is_finite()) {
            return Err(format!("trail_factor must be positive, got {}", self.trail_factor));
        }
        if let ExitMode::EnhancedPartial(cfg) = &self.mode {
            if cfg.cooldown_minutes < 0.0 {
                return Err("cooldown_minutes must not be negative".into());
            }
        }
        Ok(())
    }
}
