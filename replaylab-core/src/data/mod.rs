//! Historical data sources.

pub mod csv_source;
pub mod memory;
pub mod provider;
pub mod synthetic;

pub use csv_source::CsvDataSource;
pub use memory::InMemoryDataSource;
pub use provider::{DataError, HistoricalDataSource};
pub use synthetic::SyntheticDataSource;
