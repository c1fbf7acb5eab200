//! Indicator precomputation for a run.
//!
//! All series the bar loop reads are computed once before it starts: the
//! strategy's own indicators plus whatever the exit policy, the regime
//! detector and the MTF fallback need.

use std::collections::BTreeSet;

use crate::domain::{Bar, SymbolSpec};
use crate::error::EngineError;
use crate::exits::{ExitConfig, ExitMode};
use crate::indicators::{precompute, IndicatorValues, DEFAULT_PERIOD};
use crate::market::RegimeDetector;
use crate::rules::Strategy;

/// ATR series handed to the exit policy on every bar.
pub const BAR_ATR: &str = "atr_14";

/// ATR series the smart-exit calculator sizes stops with.
pub fn entry_atr_name(exit: &ExitConfig) -> String {
    match &exit.mode {
        ExitMode::Smart(smart) => format!("atr_{}", smart.stop_loss.atr_period.max(1)),
        _ => format!("atr_{DEFAULT_PERIOD}"),
    }
}

/// Every indicator name the run needs on the primary stream.
pub fn required_indicators(strategy: &Strategy, exit: &ExitConfig) -> BTreeSet<String> {
    let mut names = strategy.indicator_names();
    names.insert(BAR_ATR.to_string());
    names.insert(entry_atr_name(exit));
    if matches!(exit.mode, ExitMode::EnhancedPartial(_)) {
        names.extend(RegimeDetector::required_indicators().map(str::to_string));
    }
    if let Some(mtf) = &strategy.mtf {
        names.extend(mtf.primary_indicators().map(str::to_string));
    }
    names
}

/// Precompute the primary stream's indicators.
pub fn precompute_indicators(
    bars: &[Bar],
    strategy: &Strategy,
    exit: &ExitConfig,
    spec: &SymbolSpec,
) -> Result<IndicatorValues, EngineError> {
    let names = required_indicators(strategy, exit);
    Ok(precompute(bars, names.iter().map(String::as_str), spec)?)
}
