//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR is the simple mean of the last `period` true ranges, counting the
//! first bar's high-low, so the first real value lands on bar `period - 1`.
//! Before that, and whenever the mean is zero or non-finite, the symbol's
//! default ATR is returned instead.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    default: f64,
    name: String,
}

impl Atr {
    /// `default` is the fallback value, usually `SymbolSpec::default_atr()`.
    pub fn new(period: usize, default: f64) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            default,
            name: format!("atr_{period}"),
        }
    }
}

/// Compute the True Range series from bars.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            if i == 0 {
                return range;
            }
            let pc = bars[i - 1].close;
            range.max((bar.high - pc).abs()).max((bar.low - pc).abs())
        })
        .collect()
}

/// Apply Wilder smoothing to a series. Alpha = 1/period.
/// Seed: mean of the first `period` finite values. Entries before the seed
/// and any non-finite input stay NaN.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let Some(start) = values.iter().position(|v| v.is_finite()) else {
        return result;
    };
    let seed_end = start + period;
    if seed_end > n || values[start..seed_end].iter().any(|v| !v.is_finite()) {
        return result;
    }

    let mut prev = values[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if !values[i].is_finite() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![self.default; n];
        let tr = true_range(bars);

        let mut sum = 0.0;
        for i in 0..n {
            sum += tr[i];
            if i >= self.period {
                sum -= tr[i - self.period];
            }
            if i + 1 >= self.period {
                let atr = sum / self.period as f64;
                if atr.is_finite() && atr > 0.0 {
                    result[i] = atr;
                }
            }
        }

        result
    }
}
