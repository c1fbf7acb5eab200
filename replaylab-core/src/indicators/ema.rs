//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2/(n+1).
//! Seed: EMA[0] = close[0], so the series is defined from the first bar.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_of_series(&closes, self.period)
    }
}

/// Running EMA state; one update per value.
#[derive(Debug, Clone, Copy)]
pub struct EmaState {
    alpha: f64,
    value: Option<f64>,
}

impl EmaState {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 2.0 / (period.max(1) as f64 + 1.0),
            value: None,
        }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        let next = match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        };
        self.value = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// EMA of an arbitrary series, seeded with its first value.
/// Used by MACD for the signal line.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut state = EmaState::new(period);
    values.iter().map(|&v| state.update(v)).collect()
}
