//! TOML run configuration.
//!
//! A run file names the symbol, timeframe, date range and data source, and
//! carries the strategy rules plus the exit and sizing settings:
//!
//! ```toml
//! [run]
//! symbol = "EURUSD"
//! timeframe = "H1"
//! start = "2024-01-01T00:00:00Z"
//! end = "2024-03-01T00:00:00Z"
//! data_dir = "data"
//!
//! [exit]
//! mode = "fixed"
//!
//! [strategy]
//! id = "ma-cross"
//!
//! [[strategy.rules]]
//! action = "buy"
//! conditions = [{ indicator = "ema_10", operator = "crosses_above", threshold = "sma_50" }]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replaylab_core::domain::{SymbolSpec, SymbolTable, Timeframe};
use replaylab_core::engine::EngineConfig;
use replaylab_core::exits::ExitConfig;
use replaylab_core::market::RegimeDetector;
use replaylab_core::mtf::MtfConfig;
use replaylab_core::rules::{Rule, Strategy};
use replaylab_core::sizers::SizingConfig;

use crate::sizing_sim::{SimulatedTrade, SimulationConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse JSON {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything needed to reproduce one backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run: RunSection,
    #[serde(default)]
    pub exit: ExitConfig,
    pub strategy: StrategySection,
    /// Added to, or replacing, the built-in symbol table.
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    #[serde(default)]
    pub sizing: Option<SizingConfig>,
    #[serde(default)]
    pub regime: RegimeDetector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSection {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_position_size")]
    pub position_size: f64,
    /// Directory of `<SYMBOL>_<TF>.csv` files.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Use the seeded random-walk source instead of files.
    #[serde(default)]
    pub synthetic: bool,
}

fn default_initial_balance() -> f64 {
    10_000.0
}

fn default_max_positions() -> usize {
    1
}

fn default_position_size() -> f64 {
    1.0
}

/// Strategy rules; symbol and timeframe come from `[run]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySection {
    pub id: String,
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub mtf: Option<MtfConfig>,
}

impl RunConfig {
    /// Parse and validate a run file's contents.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        parse_toml::<Self>(contents, "<inline>")?.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let run = &self.run;
        if run.start >= run.end {
            return Err(ConfigError::Invalid(format!(
                "start {} must be before end {}",
                run.start, run.end
            )));
        }
        match (&run.data_dir, run.synthetic) {
            (None, false) => {
                return Err(ConfigError::Invalid(
                    "set either run.data_dir or run.synthetic = true".into(),
                ))
            }
            (Some(_), true) => {
                return Err(ConfigError::Invalid(
                    "run.data_dir and run.synthetic are mutually exclusive".into(),
                ))
            }
            _ => {}
        }
        if let Some(spec) = self.symbols.iter().find(|s| !s.is_valid()) {
            return Err(ConfigError::Invalid(format!("invalid symbol spec for {}", spec.symbol)));
        }
        if self.symbol_table().get(&run.symbol).is_none() {
            return Err(ConfigError::Invalid(format!(
                "unknown symbol {}; add it under [[symbols]]",
                run.symbol
            )));
        }
        self.engine_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.strategy()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            initial_balance: self.run.initial_balance,
            max_positions: self.run.max_positions,
            position_size: self.run.position_size,
            exit: self.exit.clone(),
            sizing: self.sizing.clone(),
            regime: self.regime.clone(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        let strategy = Strategy::new(
            self.strategy.id.clone(),
            self.run.symbol.clone(),
            self.run.timeframe,
            self.strategy.rules.clone(),
        );
        match &self.strategy.mtf {
            Some(mtf) => strategy.with_mtf(mtf.clone()),
            None => strategy,
        }
    }

    /// Built-in symbols with this file's overrides applied.
    pub fn symbol_table(&self) -> SymbolTable {
        let mut table = SymbolTable::with_defaults();
        for spec in &self.symbols {
            table.insert(spec.clone());
        }
        table
    }
}

/// Load and validate a run file.
pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let contents = read(path)?;
    parse_toml::<RunConfig>(&contents, &path.display().to_string())?.validated()
}

/// Settings of a sizing simulation: the sizer, the account and the symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingFile {
    pub symbol: String,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub sizing: SizingConfig,
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
}

impl SizingFile {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file = parse_toml::<Self>(contents, "<inline>")?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sizing.validate().map_err(ConfigError::Invalid)?;
        self.simulation
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.symbol_spec().map(|_| ())
    }

    /// The simulated symbol's spec, overrides first.
    pub fn symbol_spec(&self) -> Result<SymbolSpec, ConfigError> {
        let mut table = SymbolTable::with_defaults();
        for spec in &self.symbols {
            table.insert(spec.clone());
        }
        table
            .get(&self.symbol)
            .cloned()
            .ok_or_else(|| ConfigError::Invalid(format!("unknown symbol {}", self.symbol)))
    }
}

pub fn load_sizing_config(path: &Path) -> Result<SizingFile, ConfigError> {
    let contents = read(path)?;
    let file = parse_toml::<SizingFile>(&contents, &path.display().to_string())?;
    file.validate()?;
    Ok(file)
}

/// Read a JSON array of trades for the sizing simulator.
pub fn load_trades(path: &Path) -> Result<Vec<SimulatedTrade>, ConfigError> {
    let contents = read(path)?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn parse_toml<T: serde::de::DeserializeOwned>(contents: &str, path: &str) -> Result<T, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}
