//! Indicator engine.
//!
//! Indicators are pure functions: bar history in, numeric series out. Every
//! series is precomputed once per stream before the bar loop and then queried
//! by bar index. No value at bar t depends on bars after t.
//!
//! Unlike a charting library, indicators here never emit NaN during warmup.
//! Each one documents the value it returns before its window fills (RSI → 50,
//! ATR → the symbol's max-pip distance, stochastic → 50), so rule evaluation
//! never has to special-case the first bars of a replay.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod swing;

pub use adx::Adx;
pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use ema::Ema;
pub use macd::{Macd, MacdLine};
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::{Stochastic, StochasticLine};
pub use swing::{detect_swing_points, SwingKind, SwingPoint};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::{Bar, SymbolSpec};

/// Default period for `rsi`, `atr` and `adx` when the name carries none.
pub const DEFAULT_PERIOD: usize = 14;

/// Trait for indicators.
///
/// Indicators take a full bar series and produce an output series of the
/// same length, with warmup bars filled by the indicator's documented default.
pub trait Indicator: Send + Sync {
    /// Canonical name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars before the indicator leaves its warmup default.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("unknown indicator '{0}'")]
    Unknown(String),

    #[error("indicator '{name}' has invalid period {period}")]
    InvalidPeriod { name: String, period: usize },
}

/// Parsed indicator reference as it appears in strategy conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Price,
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Adx(usize),
    Macd(MacdLine),
    Stochastic(StochasticLine),
    Bollinger(BollingerBand),
}

impl IndicatorKind {
    /// Canonical series name; aliases such as `rsi` resolve to `rsi_14`.
    pub fn canonical_name(&self) -> String {
        match self {
            IndicatorKind::Price => "price".to_string(),
            IndicatorKind::Sma(p) => format!("sma_{p}"),
            IndicatorKind::Ema(p) => format!("ema_{p}"),
            IndicatorKind::Rsi(p) => format!("rsi_{p}"),
            IndicatorKind::Atr(p) => format!("atr_{p}"),
            IndicatorKind::Adx(p) => format!("adx_{p}"),
            IndicatorKind::Macd(line) => line.name().to_string(),
            IndicatorKind::Stochastic(line) => line.name().to_string(),
            IndicatorKind::Bollinger(band) => band.name().to_string(),
        }
    }

    /// Build the concrete indicator. `spec` supplies the ATR fallback.
    pub fn build(&self, spec: &SymbolSpec) -> Box<dyn Indicator> {
        match *self {
            IndicatorKind::Price => Box::new(Price),
            IndicatorKind::Sma(p) => Box::new(Sma::new(p)),
            IndicatorKind::Ema(p) => Box::new(Ema::new(p)),
            IndicatorKind::Rsi(p) => Box::new(Rsi::new(p)),
            IndicatorKind::Atr(p) => Box::new(Atr::new(p, spec.default_atr())),
            IndicatorKind::Adx(p) => Box::new(Adx::new(p)),
            IndicatorKind::Macd(line) => Box::new(Macd::standard(line)),
            IndicatorKind::Stochastic(line) => Box::new(Stochastic::standard(line)),
            IndicatorKind::Bollinger(band) => Box::new(Bollinger::standard(band)),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

impl FromStr for IndicatorKind {
    type Err = IndicatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "price" | "close" => return Ok(IndicatorKind::Price),
            "rsi" => return Ok(IndicatorKind::Rsi(DEFAULT_PERIOD)),
            "atr" => return Ok(IndicatorKind::Atr(DEFAULT_PERIOD)),
            "adx" => return Ok(IndicatorKind::Adx(DEFAULT_PERIOD)),
            "macd" => return Ok(IndicatorKind::Macd(MacdLine::Line)),
            "macd_signal" => return Ok(IndicatorKind::Macd(MacdLine::Signal)),
            "macd_hist" => return Ok(IndicatorKind::Macd(MacdLine::Histogram)),
            "stochastic_k" | "stoch_k" => return Ok(IndicatorKind::Stochastic(StochasticLine::K)),
            "stochastic_d" | "stoch_d" => return Ok(IndicatorKind::Stochastic(StochasticLine::D)),
            "bollinger_lower" | "bb_lower" => return Ok(IndicatorKind::Bollinger(BollingerBand::Lower)),
            "bollinger_mid" | "bb_middle" => return Ok(IndicatorKind::Bollinger(BollingerBand::Mid)),
            "bollinger_upper" | "bb_upper" => return Ok(IndicatorKind::Bollinger(BollingerBand::Upper)),
            _ => {}
        }

        let (prefix, period) = key
            .split_once('_')
            .ok_or_else(|| IndicatorError::Unknown(s.to_string()))?;
        let period: usize = period
            .parse()
            .map_err(|_| IndicatorError::Unknown(s.to_string()))?;
        if period == 0 {
            return Err(IndicatorError::InvalidPeriod {
                name: s.to_string(),
                period,
            });
        }

        match prefix {
            "sma" => Ok(IndicatorKind::Sma(period)),
            "ema" => Ok(IndicatorKind::Ema(period)),
            "rsi" => Ok(IndicatorKind::Rsi(period)),
            "atr" => Ok(IndicatorKind::Atr(period)),
            "adx" => Ok(IndicatorKind::Adx(period)),
            _ => Err(IndicatorError::Unknown(s.to_string())),
        }
    }
}

/// The close price as a series.
#[derive(Debug, Clone, Copy)]
pub struct Price;

impl Indicator for Price {
    fn name(&self) -> &str {
        "price"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        bars.iter().map(|b| b.close).collect()
    }
}

/// Container for precomputed indicator values of one bar stream.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
    len: usize,
}

impl IndicatorValues {
    pub fn new(len: usize) -> Self {
        Self {
            series: HashMap::new(),
            len,
        }
    }

    /// Insert a named series. Its length must match the stream length.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        assert_eq!(
            values.len(),
            self.len,
            "series '{name}' has {} values for {} bars",
            values.len(),
            self.len
        );
        self.series.insert(name, values);
    }

    /// Value of `name` at `bar_index`, or `None` if the series was never computed.
    ///
    /// # Panics
    /// If `bar_index` is outside the loaded buffer.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        assert!(
            bar_index < self.len,
            "bar index {bar_index} outside indicator buffer of {} bars",
            self.len
        );
        self.series.get(name).map(|v| v[bar_index])
    }

    /// Value of an indicator reference at `bar_index`.
    pub fn value(&self, kind: &IndicatorKind, bar_index: usize) -> Option<f64> {
        self.get(&kind.canonical_name(), bar_index)
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.series.contains_key(name)
    }

    /// Number of bars each series covers.
    pub fn bar_count(&self) -> usize {
        self.len
    }

    /// Number of series stored.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Precompute every requested indicator over `bars`.
///
/// Names are parsed and deduplicated by canonical name; the stored series is
/// keyed by canonical name (`rsi` is stored as `rsi_14`).
pub fn precompute<'a, I>(
    bars: &[Bar],
    names: I,
    spec: &SymbolSpec,
) -> Result<IndicatorValues, IndicatorError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut values = IndicatorValues::new(bars.len());
    for name in names {
        let kind: IndicatorKind = name.parse()?;
        let canonical = kind.canonical_name();
        if values.contains(&canonical) {
            continue;
        }
        let indicator = kind.build(spec);
        values.insert(canonical, indicator.compute(bars));
    }
    Ok(values)
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, hourly spacing.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use crate::domain::Timeframe;
    use chrono::TimeZone;

    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                symbol: "TEST".to_string(),
                interval: Timeframe::H1,
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SymbolSpec {
        SymbolSpec::new("TEST", 0.01, 1.0).with_max_pip_distance(40.0)
    }

    #[test]
    fn parse_names() {
        assert_eq!("sma_20".parse::<IndicatorKind>().unwrap(), IndicatorKind::Sma(20));
        assert_eq!("EMA_50".parse::<IndicatorKind>().unwrap(), IndicatorKind::Ema(50));
        assert_eq!("rsi".parse::<IndicatorKind>().unwrap(), IndicatorKind::Rsi(14));
        assert_eq!("atr".parse::<IndicatorKind>().unwrap(), IndicatorKind::Atr(14));
        assert_eq!(
            "macd_hist".parse::<IndicatorKind>().unwrap(),
            IndicatorKind::Macd(MacdLine::Histogram)
        );
        assert_eq!("close".parse::<IndicatorKind>().unwrap(), IndicatorKind::Price);
        assert_eq!(
            "stoch_d".parse::<IndicatorKind>().unwrap(),
            IndicatorKind::Stochastic(StochasticLine::D)
        );
        assert_eq!(
            "bb_upper".parse::<IndicatorKind>().unwrap().canonical_name(),
            "bollinger_upper"
        );
    }

    #[test]
    fn oscillators_and_bands_precompute() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 11.5, 12.5]);
        let iv = precompute(
            &bars,
            ["stochastic_k", "stochastic_d", "bollinger_lower", "bollinger_mid", "bollinger_upper"],
            &spec(),
        )
        .unwrap();
        assert_eq!(iv.len(), 5);
        // 14-bar %K window not filled yet
        assert_eq!(iv.get("stochastic_k", 4), Some(50.0));
        let lower = iv.get("bollinger_lower", 4).unwrap();
        let mid = iv.get("bollinger_mid", 4).unwrap();
        let upper = iv.get("bollinger_upper", 4).unwrap();
        assert!(lower < mid && mid < upper);
        assert_approx(upper - mid, mid - lower, DEFAULT_EPSILON);
    }

    #[test]
    fn parse_rejects_unknown_and_zero_period() {
        assert!(matches!(
            "vwap".parse::<IndicatorKind>(),
            Err(IndicatorError::Unknown(_))
        ));
        assert!(matches!(
            "sma_x".parse::<IndicatorKind>(),
            Err(IndicatorError::Unknown(_))
        ));
        assert!(matches!(
            "sma_0".parse::<IndicatorKind>(),
            Err(IndicatorError::InvalidPeriod { .. })
        ));
    }

    #[test]
    fn precompute_dedupes_aliases() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        let iv = precompute(&bars, ["rsi", "rsi_14", "price"], &spec()).unwrap();
        assert_eq!(iv.len(), 2);
        assert!(iv.contains("rsi_14"));
        assert_eq!(iv.get("price", 3), Some(13.0));
    }

    #[test]
    fn precompute_unknown_name_fails() {
        let bars = make_bars(&[10.0, 11.0]);
        assert!(precompute(&bars, ["foo_3"], &spec()).is_err());
    }

    #[test]
    fn missing_series_is_none() {
        let bars = make_bars(&[10.0, 11.0]);
        let iv = precompute(&bars, ["price"], &spec()).unwrap();
        assert_eq!(iv.get("sma_5", 0), None);
    }

    #[test]
    #[should_panic(expected = "outside indicator buffer")]
    fn out_of_range_index_panics() {
        let bars = make_bars(&[10.0, 11.0]);
        let iv = precompute(&bars, ["price"], &spec()).unwrap();
        let _ = iv.get("price", 2);
    }

    /// Look-ahead guard: every indicator computed on a truncated prefix must
    /// agree with the full-series value at the same index.
    #[test]
    fn no_lookahead_in_any_indicator() {
        let closes: Vec<f64> = (0..80)
            .map(|i| 100.0 + (i as f64 * 0.37).sin() * 5.0 + i as f64 * 0.1)
            .collect();
        let bars = make_bars(&closes);
        let names = [
            "price", "sma_10", "ema_10", "rsi_14", "atr_14", "adx_14", "macd", "macd_signal",
            "macd_hist", "stochastic_k", "stochastic_d", "bollinger_lower", "bollinger_upper",
        ];
        let full = precompute(&bars, names, &spec()).unwrap();
        for cut in [5usize, 20, 40, 79] {
            let prefix = precompute(&bars[..=cut], names, &spec()).unwrap();
            for name in names {
                let kind: IndicatorKind = name.parse().unwrap();
                let a = full.value(&kind, cut).unwrap();
                let b = prefix.value(&kind, cut).unwrap();
                assert_approx(a, b, 1e-9);
            }
        }
    }
}
