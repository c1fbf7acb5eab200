//! Multi-timeframe confirmation.
//!
//! A primary entry signal is checked against one or more higher (or lower)
//! timeframe streams. For a primary bar at time `t`, each confirmation
//! stream is viewed only up to its latest bar with `timestamp <= t`, so a
//! confirmation can never see a bar that closes after the primary bar.
//!
//! Required confirmations gate the signal. Optional ones only move the
//! confidence percentage.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{first_unordered, Bar, Direction, SymbolSpec, Timeframe};
use crate::error::EngineError;
use crate::indicators::{precompute, IndicatorKind, IndicatorValues};
use crate::rules::Condition;

/// Indicators read by the `trend` check.
pub const TREND_FAST: &str = "ema_20";
pub const TREND_SLOW: &str = "ema_50";
pub const TREND_RSI: &str = "rsi_14";

/// Direction suggested by EMA20/EMA50 and RSI on one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendBias {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendBias {
    /// Bullish when EMA20 > EMA50 and RSI > 50, bearish when both are below.
    pub fn read(values: &IndicatorValues, index: usize) -> Self {
        let get = |name: &str| values.get(name, index).filter(|v| !v.is_nan());
        let (Some(fast), Some(slow), Some(rsi)) = (get(TREND_FAST), get(TREND_SLOW), get(TREND_RSI)) else {
            return TrendBias::Neutral;
        };
        if fast > slow && rsi > 50.0 {
            TrendBias::Bullish
        } else if fast < slow && rsi < 50.0 {
            TrendBias::Bearish
        } else {
            TrendBias::Neutral
        }
    }

    pub fn agrees_with(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (TrendBias::Bullish, Direction::Long) | (TrendBias::Bearish, Direction::Short)
        )
    }
}

/// What a confirmation timeframe has to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum ConfirmationCheck {
    /// Every condition holds on the confirmation bar.
    Conditions { conditions: Vec<Condition> },
    /// The timeframe's trend bias agrees with the signal direction.
    Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub timeframe: Timeframe,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(flatten)]
    pub check: ConfirmationCheck,
}

fn default_required() -> bool {
    true
}

impl Confirmation {
    pub fn conditions(timeframe: Timeframe, conditions: Vec<Condition>) -> Self {
        Self {
            timeframe,
            required: true,
            check: ConfirmationCheck::Conditions { conditions },
        }
    }

    pub fn trend(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            required: true,
            check: ConfirmationCheck::Trend,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Indicators the confirmation stream needs.
    pub fn indicator_names(&self) -> BTreeSet<String> {
        match &self.check {
            ConfirmationCheck::Conditions { conditions } => conditions
                .iter()
                .flat_map(|c| c.indicator_names())
                .map(str::to_string)
                .collect(),
            ConfirmationCheck::Trend => [TREND_FAST, TREND_SLOW, TREND_RSI]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtfConfig {
    pub confirmations: Vec<Confirmation>,
    /// Primary RSI at or below this suggests a long when the signal carries
    /// no direction.
    #[serde(default = "default_oversold")]
    pub rsi_oversold: f64,
    #[serde(default = "default_overbought")]
    pub rsi_overbought: f64,
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

impl MtfConfig {
    pub fn new(confirmations: Vec<Confirmation>) -> Self {
        Self {
            confirmations,
            rsi_oversold: default_oversold(),
            rsi_overbought: default_overbought(),
        }
    }

    /// Distinct confirmation timeframes, in declaration order.
    pub fn timeframes(&self) -> Vec<Timeframe> {
        let mut seen = Vec::new();
        for c in &self.confirmations {
            if !seen.contains(&c.timeframe) {
                seen.push(c.timeframe);
            }
        }
        seen
    }

    /// Indicators needed on the primary stream.
    pub fn primary_indicators(&self) -> [&'static str; 1] {
        [TREND_RSI]
    }

    pub fn validate(&self, primary: Timeframe) -> Result<(), EngineError> {
        if self.confirmations.is_empty() {
            return Err(EngineError::InvalidStrategy(
                "mtf block has no confirmations".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(EngineError::InvalidStrategy(format!(
                "rsi fallback thresholds {}/{} must satisfy 0 <= oversold < overbought <= 100",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        for c in &self.confirmations {
            if c.timeframe == primary {
                return Err(EngineError::InvalidStrategy(format!(
                    "confirmation timeframe {} equals the primary timeframe",
                    c.timeframe
                )));
            }
            if let ConfirmationCheck::Conditions { conditions } = &c.check {
                if conditions.is_empty() {
                    return Err(EngineError::InvalidStrategy(format!(
                        "{} confirmation has no conditions",
                        c.timeframe
                    )));
                }
                if let Some(bad) = conditions.iter().find(|cond| !cond.applies_to(c.timeframe)) {
                    return Err(EngineError::InvalidStrategy(format!(
                        "condition on '{}' is written for {:?} inside the {} confirmation",
                        bad.indicator, bad.timeframe, c.timeframe
                    )));
                }
            }
            for name in c.indicator_names() {
                name.parse::<IndicatorKind>()?;
            }
        }
        Ok(())
    }

    /// Direction hint from the primary RSI.
    pub fn rsi_hint(&self, rsi: f64) -> Option<Direction> {
        if rsi.is_nan() {
            None
        } else if rsi <= self.rsi_oversold {
            Some(Direction::Long)
        } else if rsi >= self.rsi_overbought {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

/// One confirmation timeframe's bars with indicators precomputed over the
/// whole stream.
#[derive(Debug, Clone)]
pub struct ConfirmationStream {
    timeframe: Timeframe,
    timestamps: Vec<DateTime<Utc>>,
    values: IndicatorValues,
}

impl ConfirmationStream {
    pub fn new<'a, I>(
        timeframe: Timeframe,
        bars: &[Bar],
        indicators: I,
        spec: &SymbolSpec,
    ) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if let Some(index) = first_unordered(bars) {
            return Err(EngineError::UnorderedBars { index });
        }
        Ok(Self {
            timeframe,
            timestamps: bars.iter().map(|b| b.timestamp).collect(),
            values: precompute(bars, indicators, spec)?,
        })
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Index of the latest bar at or before `at`.
    ///
    /// Bar timestamps are taken as close times. A feed stamped at bar open
    /// would expose a still-forming higher-timeframe bar here.
    pub fn latest_at(&self, at: DateTime<Utc>) -> Option<usize> {
        self.timestamps.partition_point(|t| *t <= at).checked_sub(1)
    }

    pub fn values(&self) -> &IndicatorValues {
        &self.values
    }
}

/// Result of one confirmation for one primary bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeOutcome {
    pub timeframe: Timeframe,
    pub required: bool,
    pub passed: bool,
    /// Confirmation bar used; `None` when the stream had nothing yet.
    pub bar_index: Option<usize>,
    /// Set for `trend` checks.
    pub bias: Option<TrendBias>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtfDecision {
    pub signal: bool,
    pub direction: Option<Direction>,
    /// Share of confirmations that passed, 0–100.
    pub confidence: f64,
    pub outcomes: Vec<TimeframeOutcome>,
}

impl MtfDecision {
    fn rejected(direction: Option<Direction>) -> Self {
        Self {
            signal: false,
            direction,
            confidence: 0.0,
            outcomes: Vec::new(),
        }
    }
}

/// Primary signal handed to [`MtfConfirmationEngine::confirm`].
#[derive(Debug, Clone, Copy)]
pub struct PrimarySignal<'a> {
    pub fired: bool,
    pub direction: Option<Direction>,
    pub values: &'a IndicatorValues,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
}

pub struct MtfConfirmationEngine {
    config: MtfConfig,
    streams: HashMap<Timeframe, ConfirmationStream>,
}

impl MtfConfirmationEngine {
    /// Build the confirmation streams for `config`.
    ///
    /// A confirmation timeframe with no bars in `bars` gets an empty stream;
    /// its confirmations then fail on every bar.
    pub fn new(
        config: MtfConfig,
        bars: &HashMap<Timeframe, Vec<Bar>>,
        spec: &SymbolSpec,
    ) -> Result<Self, EngineError> {
        let mut streams = HashMap::new();
        for timeframe in config.timeframes() {
            let names: BTreeSet<String> = config
                .confirmations
                .iter()
                .filter(|c| c.timeframe == timeframe)
                .flat_map(|c| c.indicator_names())
                .collect();
            let stream_bars = bars.get(&timeframe).map(Vec::as_slice).unwrap_or_default();
            if stream_bars.is_empty() {
                warn!(%timeframe, "no bars for confirmation timeframe");
            }
            let stream = ConfirmationStream::new(
                timeframe,
                stream_bars,
                names.iter().map(String::as_str),
                spec,
            )?;
            streams.insert(timeframe, stream);
        }
        Ok(Self { config, streams })
    }

    pub fn config(&self) -> &MtfConfig {
        &self.config
    }

    pub fn stream(&self, timeframe: Timeframe) -> Option<&ConfirmationStream> {
        self.streams.get(&timeframe)
    }

    /// Combine a primary signal with every confirmation.
    pub fn confirm(&self, primary: &PrimarySignal<'_>) -> MtfDecision {
        let direction = primary.direction.or_else(|| {
            primary
                .values
                .get(TREND_RSI, primary.index)
                .and_then(|rsi| self.config.rsi_hint(rsi))
        });
        if !primary.fired {
            return MtfDecision::rejected(direction);
        }

        let outcomes: Vec<TimeframeOutcome> = self
            .config
            .confirmations
            .iter()
            .map(|c| self.evaluate(c, direction, primary.timestamp))
            .collect();

        let passed = outcomes.iter().filter(|o| o.passed).count();
        let confidence = if outcomes.is_empty() {
            100.0
        } else {
            passed as f64 / outcomes.len() as f64 * 100.0
        };
        let required_ok = outcomes.iter().all(|o| o.passed || !o.required);

        MtfDecision {
            signal: direction.is_some() && required_ok,
            direction,
            confidence,
            outcomes,
        }
    }

    fn evaluate(
        &self,
        confirmation: &Confirmation,
        direction: Option<Direction>,
        at: DateTime<Utc>,
    ) -> TimeframeOutcome {
        let mut outcome = TimeframeOutcome {
            timeframe: confirmation.timeframe,
            required: confirmation.required,
            passed: false,
            bar_index: None,
            bias: None,
        };
        let Some(stream) = self.streams.get(&confirmation.timeframe) else {
            return outcome;
        };
        let Some(index) = stream.latest_at(at) else {
            return outcome;
        };
        outcome.bar_index = Some(index);

        match &confirmation.check {
            ConfirmationCheck::Conditions { conditions } => {
                outcome.passed = conditions.iter().all(|c| c.evaluate(stream.values(), index));
            }
            ConfirmationCheck::Trend => {
                let bias = TrendBias::read(stream.values(), index);
                outcome.bias = Some(bias);
                outcome.passed = direction.is_some_and(|d| bias.agrees_with(d));
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;
    use crate::rules::Operator;

    fn spec() -> SymbolSpec {
        SymbolSpec::new("TEST", 0.01, 1.0)
    }

    fn h4_bars(closes: &[f64]) -> Vec<Bar> {
        let mut bars = make_bars(closes);
        let base = bars[0].timestamp;
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.interval = Timeframe::H4;
            bar.timestamp = base + chrono::Duration::hours(4 * i as i64);
        }
        bars
    }

    #[test]
    fn latest_at_never_looks_ahead() {
        let bars = h4_bars(&[1.0, 2.0, 3.0]);
        let stream = ConfirmationStream::new(Timeframe::H4, &bars, ["price"], &spec()).unwrap();
        let t0 = bars[0].timestamp;
        assert_eq!(stream.latest_at(t0 - chrono::Duration::hours(1)), None);
        assert_eq!(stream.latest_at(t0), Some(0));
        assert_eq!(stream.latest_at(t0 + chrono::Duration::hours(3)), Some(0));
        assert_eq!(stream.latest_at(t0 + chrono::Duration::hours(4)), Some(1));
        assert_eq!(stream.latest_at(t0 + chrono::Duration::days(30)), Some(2));
    }

    #[test]
    fn trend_bias_reads_emas_and_rsi() {
        // zig-zag trends: a gains-only window would hold RSI at 50
        let rising: Vec<f64> = (0..80)
            .map(|i| 100.0 + i as f64 - 1.5 * (i % 2) as f64)
            .collect();
        let bars = make_bars(&rising);
        let values = precompute(&bars, [TREND_FAST, TREND_SLOW, TREND_RSI], &spec()).unwrap();
        assert_eq!(TrendBias::read(&values, 79), TrendBias::Bullish);

        let falling: Vec<f64> = (0..80)
            .map(|i| 200.0 - i as f64 + 1.5 * (i % 2) as f64)
            .collect();
        let bars = make_bars(&falling);
        let values = precompute(&bars, [TREND_FAST, TREND_SLOW, TREND_RSI], &spec()).unwrap();
        assert_eq!(TrendBias::read(&values, 79), TrendBias::Bearish);
        assert!(!TrendBias::Bearish.agrees_with(Direction::Long));
    }

    #[test]
    fn rsi_hint_thresholds() {
        let cfg = MtfConfig::new(vec![Confirmation::trend(Timeframe::H4)]);
        assert_eq!(cfg.rsi_hint(25.0), Some(Direction::Long));
        assert_eq!(cfg.rsi_hint(30.0), Some(Direction::Long));
        assert_eq!(cfg.rsi_hint(75.0), Some(Direction::Short));
        assert_eq!(cfg.rsi_hint(50.0), None);
        assert_eq!(cfg.rsi_hint(f64::NAN), None);
    }

    #[test]
    fn validation() {
        assert!(MtfConfig::new(vec![]).validate(Timeframe::H1).is_err());
        assert!(MtfConfig::new(vec![Confirmation::trend(Timeframe::H1)])
            .validate(Timeframe::H1)
            .is_err());
        let mismatched = Confirmation::conditions(
            Timeframe::H4,
            vec![Condition::value("rsi", Operator::Gt, 50.0).on(Timeframe::D1)],
        );
        assert!(MtfConfig::new(vec![mismatched]).validate(Timeframe::H1).is_err());
        let unknown = Confirmation::conditions(
            Timeframe::H4,
            vec![Condition::value("vwap", Operator::Gt, 50.0)],
        );
        assert!(MtfConfig::new(vec![unknown]).validate(Timeframe::H1).is_err());

        let mut cfg = MtfConfig::new(vec![Confirmation::trend(Timeframe::D1)]);
        assert!(cfg.validate(Timeframe::H1).is_ok());
        cfg.rsi_oversold = 80.0;
        assert!(cfg.validate(Timeframe::H1).is_err());
    }

    #[test]
    fn config_parses_from_toml() {
        let cfg: MtfConfig = toml::from_str(
            r#"
            rsi_oversold = 25.0

            [[confirmations]]
            timeframe = "H4"
            check = "trend"

            [[confirmations]]
            timeframe = "D1"
            required = false
            check = "conditions"
            conditions = [{ indicator = "rsi", operator = "gt", threshold = 50.0 }]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.rsi_oversold, 25.0);
        assert_eq!(cfg.rsi_overbought, 70.0);
        assert_eq!(cfg.confirmations[0].check, ConfirmationCheck::Trend);
        assert!(cfg.confirmations[0].required);
        assert!(!cfg.confirmations[1].required);
        assert_eq!(cfg.timeframes(), vec![Timeframe::H4, Timeframe::D1]);
    }
}
