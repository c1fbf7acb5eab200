//! Error types for the engine and its pluggable calculators.

use thiserror::Error;

use crate::data::DataError;
use crate::indicators::IndicatorError;

/// Precondition failures. Raised before the bar loop starts; a run that
/// passes validation never fails mid-stream.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no bars to replay")]
    NoData,

    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("bars out of order at index {index}: timestamps must be strictly ascending")]
    UnorderedBars { index: usize },

    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl From<IndicatorError> for EngineError {
    fn from(err: IndicatorError) -> Self {
        EngineError::InvalidStrategy(err.to_string())
    }
}

/// Failure inside an exit, partial-exit or sizing calculator.
///
/// Never fatal: the engine logs it and substitutes a default for that bar
/// or position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculatorError {
    #[error("insufficient history: need {needed} bars, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("non-finite result for {0}")]
    NonFinite(&'static str),

    #[error("unknown partial-exit level '{0}'")]
    UnknownLevel(String),
}
