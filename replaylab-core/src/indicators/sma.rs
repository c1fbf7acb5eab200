//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over a lookback window. Before the window
//! fills, the mean of the bars seen so far is returned, so the series is
//! defined from the first bar.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        sma_of_series(&closes, self.period)
    }
}

/// Trailing mean of `values`, expanding until `period` values are available.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= values[i - period];
        }
        let count = (i + 1).min(period);
        result.push(sum / count as f64);
    }
    result
}
