//! Historical data source trait and structured error types.
//!
//! The `HistoricalDataSource` trait abstracts over where bars come from (CSV
//! files, in-memory fixtures, a seeded random walk) so runs can swap sources
//! and tests can inject exact series.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Bar, Timeframe};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for {symbol} {timeframe}")]
    NotFound { symbol: String, timeframe: Timeframe },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("bad timestamp '{value}' at row {row}")]
    Timestamp { value: String, row: usize },

    #[error("validation error: {0}")]
    Validation(String),
}

/// Trait for historical bar sources.
///
/// Implementations return bars for `symbol` on `timeframe` whose timestamps
/// fall within `[start, end]`, in ascending order.
pub trait HistoricalDataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError>;
}

/// Keep bars inside `[start, end]`.
pub(crate) fn clip_range(bars: Vec<Bar>, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| b.timestamp >= start && b.timestamp <= end)
        .collect()
}
