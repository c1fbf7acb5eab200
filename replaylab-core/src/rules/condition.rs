//! Conditions: one comparison between an indicator and a threshold.

use serde::{Deserialize, Serialize};

use crate::domain::Timeframe;
use crate::indicators::{IndicatorKind, IndicatorValues};

/// Tolerance for `eq`.
pub const EQ_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "greater_than", alias = ">")]
    Gt,
    #[serde(alias = "less_than", alias = "<")]
    Lt,
    #[serde(alias = "equal", alias = "==")]
    Eq,
    #[serde(alias = "greater_or_equal", alias = ">=")]
    Gte,
    #[serde(alias = "less_or_equal", alias = "<=")]
    Lte,
    CrossesAbove,
    CrossesBelow,
    /// Inclusive on both ends; needs a `[low, high]` threshold.
    InRange,
    OutsideRange,
}

impl Operator {
    /// Pointwise comparison. Crossing operators need two bars and are
    /// handled by [`Condition::evaluate`].
    fn compare(self, left: f64, right: f64) -> bool {
        match self {
            Operator::Gt => left > right,
            Operator::Lt => left < right,
            Operator::Eq => (left - right).abs() < EQ_TOLERANCE,
            Operator::Gte => left >= right,
            Operator::Lte => left <= right,
            Operator::CrossesAbove
            | Operator::CrossesBelow
            | Operator::InRange
            | Operator::OutsideRange => false,
        }
    }

    pub fn is_crossing(self) -> bool {
        matches!(self, Operator::CrossesAbove | Operator::CrossesBelow)
    }

    pub fn is_range(self) -> bool {
        matches!(self, Operator::InRange | Operator::OutsideRange)
    }
}

/// Right-hand side of a condition: a constant, another indicator, or a
/// `[low, high]` pair for the range operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Value(f64),
    Indicator(String),
    Range(f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub indicator: String,
    pub operator: Operator,
    #[serde(alias = "value")]
    pub threshold: Threshold,
    /// Timeframe the condition is written for. `None` means the rule's
    /// primary timeframe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
}

impl Condition {
    pub fn new(indicator: impl Into<String>, operator: Operator, threshold: Threshold) -> Self {
        Self {
            indicator: indicator.into(),
            operator,
            threshold,
            timeframe: None,
        }
    }

    pub fn value(indicator: impl Into<String>, operator: Operator, value: f64) -> Self {
        Self::new(indicator, operator, Threshold::Value(value))
    }

    pub fn on(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = Some(timeframe);
        self
    }

    /// True when the condition is written for `primary` (or for no specific timeframe).
    pub fn applies_to(&self, primary: Timeframe) -> bool {
        self.timeframe.map_or(true, |tf| tf == primary)
    }

    /// Every indicator name the condition reads.
    pub fn indicator_names(&self) -> impl Iterator<Item = &str> {
        let threshold = match &self.threshold {
            Threshold::Indicator(name) => Some(name.as_str()),
            Threshold::Value(_) | Threshold::Range(..) => None,
        };
        std::iter::once(self.indicator.as_str()).chain(threshold)
    }

    /// Range operators take exactly a `[low, high]` threshold with
    /// `low <= high`; every other operator takes anything but a range.
    pub fn validate(&self) -> Result<(), String> {
        match (&self.threshold, self.operator.is_range()) {
            (Threshold::Range(low, high), true) if low <= high => Ok(()),
            (Threshold::Range(low, high), true) => Err(format!(
                "range [{low}, {high}] on '{}' has low above high",
                self.indicator
            )),
            (_, true) => Err(format!(
                "{:?} on '{}' needs a [low, high] threshold",
                self.operator, self.indicator
            )),
            (Threshold::Range(..), false) => Err(format!(
                "{:?} on '{}' does not take a range threshold",
                self.operator, self.indicator
            )),
            _ => Ok(()),
        }
    }

    /// Evaluate at `index` against precomputed `values`.
    ///
    /// Missing or NaN inputs make the condition false. Crossing operators
    /// are false on the first bar.
    pub fn evaluate(&self, values: &IndicatorValues, index: usize) -> bool {
        let left = |i: usize| lookup(values, &self.indicator, i);

        if let Threshold::Range(low, high) = self.threshold {
            let Some(l) = left(index) else {
                return false;
            };
            let inside = low <= l && l <= high;
            return match self.operator {
                Operator::InRange => inside,
                Operator::OutsideRange => !inside,
                _ => false,
            };
        }

        let right = |i: usize| match &self.threshold {
            Threshold::Value(v) => Some(*v),
            Threshold::Indicator(name) => lookup(values, name, i),
            Threshold::Range(..) => None,
        };

        let (Some(l), Some(r)) = (left(index), right(index)) else {
            return false;
        };

        match self.operator {
            Operator::CrossesAbove | Operator::CrossesBelow => {
                if index == 0 {
                    return false;
                }
                let (Some(pl), Some(pr)) = (left(index - 1), right(index - 1)) else {
                    return false;
                };
                if self.operator == Operator::CrossesAbove {
                    pl <= pr && l > r
                } else {
                    pl >= pr && l < r
                }
            }
            op => op.compare(l, r),
        }
    }
}

fn lookup(values: &IndicatorValues, name: &str, index: usize) -> Option<f64> {
    let kind: IndicatorKind = name.parse().ok()?;
    values.value(&kind, index).filter(|v| !v.is_nan())
}
