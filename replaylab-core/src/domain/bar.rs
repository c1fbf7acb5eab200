//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timeframe::Timeframe;

/// OHLCV bar for a single symbol on a single interval.
///
/// Bars within one stream must have strictly ascending timestamps; the engine
/// checks this before the bar loop starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub interval: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }
}

/// Index of the first bar whose timestamp is not strictly after its
/// predecessor, if any.
pub fn first_unordered(bars: &[Bar]) -> Option<usize> {
    bars.windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
        .map(|i| i + 1)
}
