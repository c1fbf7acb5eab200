use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Pip configuration for a tradable symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Price distance of one pip (0.0001 for EURUSD, 0.01 for USDJPY).
    pub pip_size: f64,
    /// Account currency per pip per lot.
    pub pip_value_factor: f64,
    /// Maximum stop distance in pips; also the ATR fallback before warmup.
    #[serde(default = "default_max_pip_distance")]
    pub max_pip_distance: f64,
    /// Price precision used when rounding calculated levels.
    #[serde(default = "default_digits")]
    pub digits: u32,
}

fn default_max_pip_distance() -> f64 {
    50.0
}

fn default_digits() -> u32 {
    5
}

impl SymbolSpec {
    pub fn new(symbol: impl Into<String>, pip_size: f64, pip_value_factor: f64) -> Self {
        Self {
            symbol: symbol.into(),
            pip_size,
            pip_value_factor,
            max_pip_distance: default_max_pip_distance(),
            digits: default_digits(),
        }
    }

    pub fn with_max_pip_distance(mut self, pips: f64) -> Self {
        self.max_pip_distance = pips;
        self
    }

    pub fn with_digits(mut self, digits: u32) -> Self {
        self.digits = digits;
        self
    }

    /// ATR value used while the window is not filled or the computed ATR is zero.
    pub fn default_atr(&self) -> f64 {
        self.max_pip_distance * self.pip_size
    }

    pub fn pips_to_price(&self, pips: f64) -> f64 {
        pips * self.pip_size
    }

    pub fn price_to_pips(&self, distance: f64) -> f64 {
        if self.pip_size <= 0.0 {
            return 0.0;
        }
        distance / self.pip_size
    }

    /// Round a price to the symbol's precision.
    pub fn round_price(&self, price: f64) -> f64 {
        let scale = 10f64.powi(self.digits as i32);
        (price * scale).round() / scale
    }

    pub fn is_valid(&self) -> bool {
        self.pip_size > 0.0
            && self.pip_size.is_finite()
            && self.pip_value_factor > 0.0
            && self.pip_value_factor.is_finite()
            && self.max_pip_distance > 0.0
    }
}

/// Immutable symbol → pip configuration lookup.
///
/// Built once and shared between engine instances behind an `Arc`; nothing
/// mutates it after construction.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    specs: HashMap<String, SymbolSpec>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with common FX and metal symbols.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        for (symbol, pip, value, max_pips, digits) in [
            ("EURUSD", 0.0001, 10.0, 50.0, 5),
            ("GBPUSD", 0.0001, 10.0, 60.0, 5),
            ("AUDUSD", 0.0001, 10.0, 50.0, 5),
            ("NZDUSD", 0.0001, 10.0, 50.0, 5),
            ("USDCHF", 0.0001, 10.0, 50.0, 5),
            ("USDCAD", 0.0001, 10.0, 50.0, 5),
            ("EURGBP", 0.0001, 10.0, 40.0, 5),
            ("USDJPY", 0.01, 10.0, 50.0, 3),
            ("EURJPY", 0.01, 10.0, 60.0, 3),
            ("GBPJPY", 0.01, 10.0, 80.0, 3),
            ("XAUUSD", 0.1, 10.0, 300.0, 2),
            ("XAGUSD", 0.01, 50.0, 200.0, 3),
        ] {
            table.insert(
                SymbolSpec::new(symbol, pip, value)
                    .with_max_pip_distance(max_pips)
                    .with_digits(digits),
            );
        }
        table
    }

    /// Insert or replace a spec.
    pub fn insert(&mut self, spec: SymbolSpec) {
        self.specs.insert(spec.symbol.to_ascii_uppercase(), spec);
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolSpec> {
        self.specs.get(&symbol.to_ascii_uppercase())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn into_shared(self) -> Arc<SymbolTable> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_atr_is_max_pips_in_price_units() {
        let spec = SymbolSpec::new("EURUSD", 0.0001, 10.0).with_max_pip_distance(30.0);
        assert!((spec.default_atr() - 0.003).abs() < 1e-12);
    }

    #[test]
    fn pip_conversions_roundtrip() {
        let spec = SymbolSpec::new("USDJPY", 0.01, 10.0);
        assert!((spec.price_to_pips(0.25) - 25.0).abs() < 1e-9);
        assert!((spec.pips_to_price(25.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn round_price_uses_digits() {
        let spec = SymbolSpec::new("EURUSD", 0.0001, 10.0).with_digits(5);
        assert_eq!(spec.round_price(1.1234567), 1.12346);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let table = SymbolTable::with_defaults();
        assert!(table.get("eurusd").is_some());
        assert!(table.get("NOPE").is_none());
    }

    #[test]
    fn insert_overrides_default() {
        let mut table = SymbolTable::with_defaults();
        table.insert(SymbolSpec::new("EURUSD", 0.0001, 1.0));
        assert_eq!(table.get("EURUSD").unwrap().pip_value_factor, 1.0);
    }

    #[test]
    fn invalid_spec_detected() {
        assert!(!SymbolSpec::new("BAD", 0.0, 10.0).is_valid());
        assert!(SymbolSpec::new("OK", 0.0001, 10.0).is_valid());
    }
}
