//! In-memory data source for tests and embedding callers that already hold bars.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::provider::{clip_range, DataError, HistoricalDataSource};
use crate::domain::{Bar, Timeframe};

#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    streams: HashMap<(String, Timeframe), Vec<Bar>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stream. Bars are sorted by timestamp on insert.
    pub fn insert(&mut self, symbol: &str, timeframe: Timeframe, mut bars: Vec<Bar>) {
        bars.sort_by_key(|b| b.timestamp);
        self.streams
            .insert((symbol.to_ascii_uppercase(), timeframe), bars);
    }

    pub fn with_stream(mut self, symbol: &str, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.insert(symbol, timeframe, bars);
        self
    }
}

impl HistoricalDataSource for InMemoryDataSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        let bars = self
            .streams
            .get(&(symbol.to_ascii_uppercase(), timeframe))
            .ok_or_else(|| DataError::NotFound {
                symbol: symbol.to_string(),
                timeframe,
            })?;
        Ok(clip_range(bars.clone(), start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(hour: u32, close: f64) -> Bar {
        Bar {
            symbol: "EURUSD".into(),
            interval: Timeframe::H1,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, hour, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }

    #[test]
    fn fetch_sorts_and_clips() {
        let source = InMemoryDataSource::new().with_stream(
            "eurusd",
            Timeframe::H1,
            vec![bar(3, 1.3), bar(1, 1.1), bar(2, 1.2)],
        );
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        let bars = source.fetch("EURUSD", Timeframe::H1, start, end).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.2);
        assert_eq!(bars[1].close, 1.3);
    }

    #[test]
    fn missing_stream_is_not_found() {
        let source = InMemoryDataSource::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(matches!(
            source.fetch("EURUSD", Timeframe::H4, t, t),
            Err(DataError::NotFound { .. })
        ));
    }
}
