//! Bollinger bands (20, 2σ).
//!
//! mid = SMA of closes; upper/lower = mid ± multiplier × sample standard
//! deviation over the same window.
//!
//! Warmup default: like the SMA, the window expands until `period` closes
//! are available. With a single close the deviation is zero and all three
//! bands equal that close.

use super::sma::sma_of_series;
use super::Indicator;
use crate::domain::Bar;

/// Which band a series refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BollingerBand {
    Lower,
    Mid,
    Upper,
}

impl BollingerBand {
    pub fn name(self) -> &'static str {
        match self {
            BollingerBand::Lower => "bollinger_lower",
            BollingerBand::Mid => "bollinger_mid",
            BollingerBand::Upper => "bollinger_upper",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        assert!(period >= 2, "Bollinger period must be >= 2");
        Self {
            period,
            multiplier,
            band,
        }
    }

    pub fn standard(band: BollingerBand) -> Self {
        Self::new(20, 2.0, band)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        self.band.name()
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mid = sma_of_series(&closes, self.period);
        if self.band == BollingerBand::Mid {
            return mid;
        }
        let sign = if self.band == BollingerBand::Upper { 1.0 } else { -1.0 };

        mid.iter()
            .enumerate()
            .map(|(i, &mean)| {
                let window = &closes[(i + 1).saturating_sub(self.period)..=i];
                let sd = if window.len() < 2 {
                    0.0
                } else {
                    let ss: f64 = window.iter().map(|c| (c - mean).powi(2)).sum();
                    (ss / (window.len() - 1) as f64).sqrt()
                };
                mean + sign * self.multiplier * sd
            })
            .collect()
    }
}
