//! Market regime classification from ADX, ATR and moving averages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::indicators::IndicatorValues;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Unknown,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketRegime::TrendingUp => "trending_up",
            MarketRegime::TrendingDown => "trending_down",
            MarketRegime::Ranging => "ranging",
            MarketRegime::Volatile => "volatile",
            MarketRegime::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Regime plus a 0–100 confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: MarketRegime,
    pub confidence: f64,
}

impl RegimeReading {
    pub const UNKNOWN: RegimeReading = RegimeReading {
        regime: MarketRegime::Unknown,
        confidence: 0.0,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeDetector {
    pub adx_threshold: f64,
    pub atr_percentile_threshold: f64,
    /// Trailing window of ATR values ranked for the percentile.
    pub percentile_window: usize,
    /// Bars required before any classification.
    pub min_history: usize,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            adx_threshold: 25.0,
            atr_percentile_threshold: 70.0,
            percentile_window: 100,
            min_history: 50,
        }
    }
}

const ADX: &str = "adx_14";
const ATR: &str = "atr_14";
const FAST: &str = "sma_20";
const SLOW: &str = "sma_50";
const PRICE: &str = "price";

impl RegimeDetector {
    /// Series the detector reads; precompute these before calling [`detect`](Self::detect).
    pub fn required_indicators() -> [&'static str; 5] {
        [ADX, ATR, FAST, SLOW, PRICE]
    }

    pub fn detect(&self, values: &IndicatorValues, index: usize) -> RegimeReading {
        if index + 1 < self.min_history {
            return RegimeReading::UNKNOWN;
        }
        let read = |name: &str| values.get(name, index).filter(|v| v.is_finite());
        let (Some(adx), Some(fast), Some(slow), Some(price)) =
            (read(ADX), read(FAST), read(SLOW), read(PRICE))
        else {
            return RegimeReading::UNKNOWN;
        };

        if adx > self.adx_threshold {
            let confidence = (adx / 50.0 * 100.0).min(100.0);
            let regime = if fast > slow && price > fast {
                MarketRegime::TrendingUp
            } else if fast < slow && price < fast {
                MarketRegime::TrendingDown
            } else {
                MarketRegime::Ranging
            };
            return RegimeReading { regime, confidence };
        }

        let percentile = self.atr_percentile(values, index);
        if percentile > self.atr_percentile_threshold {
            return RegimeReading {
                regime: MarketRegime::Volatile,
                confidence: percentile,
            };
        }

        RegimeReading {
            regime: MarketRegime::Ranging,
            confidence: 50.0,
        }
    }

    /// Percent of ATR values in the trailing window at or below the current one.
    fn atr_percentile(&self, values: &IndicatorValues, index: usize) -> f64 {
        let Some(series) = values.get_series(ATR) else {
            return 0.0;
        };
        let start = (index + 1).saturating_sub(self.percentile_window.max(1));
        let window = &series[start..=index];
        let current = series[index];
        let at_or_below = window.iter().filter(|&&v| v <= current).count();
        at_or_below as f64 / window.len() as f64 * 100.0
    }
}
