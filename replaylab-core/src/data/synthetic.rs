//! Synthetic data source: a seeded random walk.
//!
//! The seed is derived from the symbol and timeframe, so the same request
//! always yields the same bars. Used for demos and for runs without a data
//! directory.

use chrono::{DateTime, Datelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, HistoricalDataSource};
use crate::domain::{Bar, Timeframe};

#[derive(Debug, Clone)]
pub struct SyntheticDataSource {
    /// Price of the first bar.
    pub start_price: f64,
    /// Maximum absolute per-bar return at the H1 scale.
    pub hourly_volatility: f64,
}

impl Default for SyntheticDataSource {
    fn default() -> Self {
        Self {
            start_price: 1.1000,
            hourly_volatility: 0.002,
        }
    }
}

impl SyntheticDataSource {
    pub fn new(start_price: f64, hourly_volatility: f64) -> Self {
        Self {
            start_price,
            hourly_volatility,
        }
    }

    fn seed(symbol: &str, timeframe: Timeframe) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.to_ascii_uppercase().as_bytes());
        hasher.update(timeframe.label().as_bytes());
        *hasher.finalize().as_bytes()
    }
}

impl HistoricalDataSource for SyntheticDataSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        if !(self.start_price > 0.0 && self.hourly_volatility >= 0.0) {
            return Err(DataError::Validation(format!(
                "synthetic source needs a positive start price, got {}",
                self.start_price
            )));
        }

        let mut rng = StdRng::from_seed(Self::seed(symbol, timeframe));
        let step = timeframe.duration();
        let scale = (timeframe.minutes() as f64 / 60.0).sqrt();
        let max_return = (self.hourly_volatility * scale).max(f64::EPSILON);

        let mut bars = Vec::new();
        let mut price = self.start_price;
        let mut current = start;

        while current <= end {
            if matches!(current.weekday(), Weekday::Sat | Weekday::Sun)
                && timeframe != Timeframe::W1
            {
                current += step;
                continue;
            }

            let ret: f64 = rng.gen_range(-max_return..max_return);
            let open = price;
            let close = (price * (1.0 + ret)).max(f64::EPSILON);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..max_return / 2.0));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..max_return / 2.0));
            let volume = rng.gen_range(100.0..10_000.0);

            bars.push(Bar {
                symbol: symbol.to_ascii_uppercase(),
                interval: timeframe,
                timestamp: current,
                open,
                high,
                low,
                close,
                volume,
            });

            price = close;
            current += step;
        }

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::first_unordered;
    use chrono::TimeZone;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn deterministic_per_symbol() {
        let (start, end) = window();
        let source = SyntheticDataSource::default();
        let a = source.fetch("EURUSD", Timeframe::H1, start, end).unwrap();
        let b = source.fetch("EURUSD", Timeframe::H1, start, end).unwrap();
        let c = source.fetch("GBPUSD", Timeframe::H1, start, end).unwrap();
        assert_eq!(a, b);
        assert_ne!(a[10].close, c[10].close);
    }

    #[test]
    fn bars_are_sane_and_ordered() {
        let (start, end) = window();
        let bars = SyntheticDataSource::default()
            .fetch("EURUSD", Timeframe::H4, start, end)
            .unwrap();
        assert!(!bars.is_empty());
        assert!(bars.iter().all(|b| b.is_sane()));
        assert_eq!(first_unordered(&bars), None);
        assert!(bars
            .iter()
            .all(|b| !matches!(b.timestamp.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[test]
    fn rejects_non_positive_start_price() {
        let (start, end) = window();
        let source = SyntheticDataSource::new(0.0, 0.01);
        assert!(source.fetch("EURUSD", Timeframe::H1, start, end).is_err());
    }
}
