//! CSV bar source.
//!
//! Reads `<dir>/<SYMBOL>_<TF>.csv` with a header row
//! `timestamp,open,high,low,close[,volume]`. Timestamps are RFC 3339,
//! `YYYY-MM-DD HH:MM[:SS]` (UTC) or a bare `YYYY-MM-DD`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

use super::provider::{clip_range, DataError, HistoricalDataSource};
use crate::domain::{Bar, Timeframe};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Clone)]
pub struct CsvDataSource {
    dir: PathBuf,
}

impl CsvDataSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", symbol.to_ascii_uppercase(), timeframe))
    }

    /// Read every bar in a file, sorted by timestamp.
    pub fn read_file(
        path: &Path,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Bar>, DataError> {
        let display = path.display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| DataError::Csv {
                path: display.clone(),
                source,
            })?;

        let mut bars = Vec::new();
        for (row, record) in reader.deserialize::<CsvRow>().enumerate() {
            let record = record.map_err(|source| DataError::Csv {
                path: display.clone(),
                source,
            })?;
            let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
                DataError::Timestamp {
                    value: record.timestamp.clone(),
                    row: row + 1,
                }
            })?;
            bars.push(Bar {
                symbol: symbol.to_ascii_uppercase(),
                interval: timeframe,
                timestamp,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl HistoricalDataSource for CsvDataSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, DataError> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return Err(DataError::NotFound {
                symbol: symbol.to_string(),
                timeframe,
            });
        }
        let bars = Self::read_file(&path, symbol, timeframe)?;
        Ok(clip_range(bars, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_csv(dir: &Path, name: &str, body: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(body.as_bytes()).unwrap();
    }

    #[test]
    fn reads_and_clips_bars() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "EURUSD_H1.csv",
            "timestamp,open,high,low,close,volume\n\
             2024-01-02 02:00:00,1.1010,1.1030,1.1000,1.1020,120\n\
             2024-01-02T00:00:00Z,1.1000,1.1010,1.0990,1.1005,100\n\
             2024-01-02 01:00,1.1005,1.1015,1.0995,1.1010,110\n",
        );

        let source = CsvDataSource::new(dir.path());
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        let bars = source.fetch("eurusd", Timeframe::H1, start, end).unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 1.1010);
        assert_eq!(bars[1].close, 1.1020);
        assert_eq!(bars[0].symbol, "EURUSD");
        assert_eq!(bars[0].interval, Timeframe::H1);
    }

    #[test]
    fn volume_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "USDJPY_D1.csv",
            "timestamp,open,high,low,close\n2024-01-02,140.0,141.0,139.5,140.5\n",
        );
        let bars =
            CsvDataSource::read_file(&dir.path().join("USDJPY_D1.csv"), "USDJPY", Timeframe::D1)
                .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, 0.0);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvDataSource::new(dir.path());
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(matches!(
            source.fetch("GBPUSD", Timeframe::M15, t, t),
            Err(DataError::NotFound { .. })
        ));
    }

    #[test]
    fn bad_timestamp_reports_row() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "EURUSD_H1.csv",
            "timestamp,open,high,low,close\nyesterday,1,1,1,1\n",
        );
        let err = CsvDataSource::read_file(&dir.path().join("EURUSD_H1.csv"), "EURUSD", Timeframe::H1)
            .unwrap_err();
        assert!(matches!(err, DataError::Timestamp { row: 1, .. }));
    }
}
