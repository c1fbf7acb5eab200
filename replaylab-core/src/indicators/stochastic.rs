//! Stochastic oscillator (14/3).
//!
//! %K = 100 × (close − lowest low) / (highest high − lowest low) over the
//! last `k_period` bars; %D = mean of the last `d_period` %K values.
//!
//! Warmup default: 50 for both lines until their windows fill. A window
//! with no range (highest high == lowest low) also yields 50, and %D stays
//! at 50 while any %K in its window is undefined.

use super::Indicator;
use crate::domain::Bar;

/// Neutral value for undefined bars.
pub const STOCHASTIC_NEUTRAL: f64 = 50.0;

/// Which stochastic output a series refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StochasticLine {
    K,
    D,
}

impl StochasticLine {
    pub fn name(self) -> &'static str {
        match self {
            StochasticLine::K => "stochastic_k",
            StochasticLine::D => "stochastic_d",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    d_period: usize,
    line: StochasticLine,
}

impl Stochastic {
    pub fn new(k_period: usize, d_period: usize, line: StochasticLine) -> Self {
        assert!(k_period >= 1 && d_period >= 1, "stochastic periods must be >= 1");
        Self {
            k_period,
            d_period,
            line,
        }
    }

    pub fn standard(line: StochasticLine) -> Self {
        Self::new(14, 3, line)
    }

    /// %K per bar, `None` while undefined.
    fn raw_k(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        (0..bars.len())
            .map(|i| {
                if i + 1 < self.k_period {
                    return None;
                }
                let window = &bars[i + 1 - self.k_period..=i];
                let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
                let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
                let range = highest - lowest;
                (range > 0.0).then(|| 100.0 * (bars[i].close - lowest) / range)
            })
            .collect()
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        self.line.name()
    }

    fn lookback(&self) -> usize {
        match self.line {
            StochasticLine::K => self.k_period - 1,
            StochasticLine::D => self.k_period + self.d_period - 2,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let k = self.raw_k(bars);
        match self.line {
            StochasticLine::K => k.iter().map(|v| v.unwrap_or(STOCHASTIC_NEUTRAL)).collect(),
            StochasticLine::D => (0..k.len())
                .map(|i| {
                    if i + 1 < self.d_period {
                        return STOCHASTIC_NEUTRAL;
                    }
                    let window = &k[i + 1 - self.d_period..=i];
                    window
                        .iter()
                        .copied()
                        .sum::<Option<f64>>()
                        .map_or(STOCHASTIC_NEUTRAL, |sum| sum / self.d_period as f64)
                })
                .collect(),
        }
    }
}
