//! Relative Strength Index (RSI).
//!
//! Simple mean of gains and losses over the last `period` close-to-close
//! changes. RSI = 100 - 100 / (1 + avg_gain / avg_loss).
//! Returns 50 until `period` changes are available and whenever the window
//! holds no loss, so a gains-only window reads 50 as well. avg_gain == 0
//! with some loss → 0.

use super::Indicator;
use crate::domain::Bar;

/// Neutral value used during warmup.
pub const RSI_NEUTRAL: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![RSI_NEUTRAL; n];

        let mut gains = 0.0;
        let mut losses = 0.0;
        for i in 1..n {
            let change = bars[i].close - bars[i - 1].close;
            add_change(&mut gains, &mut losses, change, 1.0);
            if i > self.period {
                let leaving = bars[i - self.period].close - bars[i - self.period - 1].close;
                add_change(&mut gains, &mut losses, leaving, -1.0);
            }
            if i >= self.period {
                let p = self.period as f64;
                result[i] = compute_rsi(gains / p, losses / p);
            }
        }

        result
    }
}

fn add_change(gains: &mut f64, losses: &mut f64, change: f64, weight: f64) {
    if change > 0.0 {
        *gains += weight * change;
    } else {
        *losses -= weight * change;
    }
    // Rolling subtraction can leave tiny negative residue.
    *gains = gains.max(0.0);
    *losses = losses.max(0.0);
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    const FLAT: f64 = 1e-15;
    if avg_loss <= FLAT {
        RSI_NEUTRAL
    } else if avg_gain <= FLAT {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
