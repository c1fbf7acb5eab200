//! Strategy definition: rules of conditions mapped to actions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use crate::domain::{Direction, Timeframe};
use crate::error::EngineError;
use crate::indicators::IndicatorKind;
use crate::mtf::MtfConfig;

/// What a rule does when all its conditions hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Close,
}

impl Action {
    /// Entry direction, or `None` for `Close`.
    pub fn direction(self) -> Option<Direction> {
        match self {
            Action::Buy => Some(Direction::Long),
            Action::Sell => Some(Direction::Short),
            Action::Close => None,
        }
    }

    pub fn is_entry(self) -> bool {
        self != Action::Close
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub conditions: Vec<Condition>,
    pub action: Action,
}

impl Rule {
    pub fn new(action: Action, conditions: Vec<Condition>) -> Self {
        Self {
            name: None,
            conditions,
            action,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtf: Option<MtfConfig>,
}

impl Strategy {
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            timeframe,
            rules,
            mtf: None,
        }
    }

    pub fn with_mtf(mut self, mtf: MtfConfig) -> Self {
        self.mtf = Some(mtf);
        self
    }

    pub fn entry_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.action.is_entry())
    }

    pub fn exit_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.action == Action::Close)
    }

    /// Indicator names read by rules on the primary stream.
    pub fn indicator_names(&self) -> BTreeSet<String> {
        self.rules
            .iter()
            .flat_map(|r| r.conditions.iter())
            .flat_map(|c| c.indicator_names())
            .map(str::to_string)
            .collect()
    }

    /// Structural checks run before any bar is replayed.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidStrategy("strategy id is empty".into()));
        }
        if self.rules.is_empty() {
            return Err(EngineError::InvalidStrategy(format!(
                "strategy '{}' has no rules",
                self.id
            )));
        }
        for (i, rule) in self.rules.iter().enumerate() {
            if rule.conditions.is_empty() {
                return Err(EngineError::InvalidStrategy(format!(
                    "rule {} of '{}' has no conditions",
                    rule.name.clone().unwrap_or_else(|| i.to_string()),
                    self.id
                )));
            }
            for condition in &rule.conditions {
                condition.validate().map_err(|e| {
                    EngineError::InvalidStrategy(format!("strategy '{}': {e}", self.id))
                })?;
                for name in condition.indicator_names() {
                    name.parse::<IndicatorKind>()?;
                }
            }
        }
        if let Some(mtf) = &self.mtf {
            mtf.validate(self.timeframe)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Operator, Threshold};

    fn rsi_strategy() -> Strategy {
        Strategy::new(
            "rsi-revert",
            "EURUSD",
            Timeframe::H1,
            vec![
                Rule::new(Action::Buy, vec![Condition::value("rsi", Operator::Lt, 30.0)]),
                Rule::new(
                    Action::Close,
                    vec![Condition::new(
                        "price",
                        Operator::Gt,
                        Threshold::Indicator("sma_20".into()),
                    )],
                ),
            ],
        )
    }

    #[test]
    fn valid_strategy_passes() {
        assert!(rsi_strategy().validate().is_ok());
    }

    #[test]
    fn collects_indicator_names() {
        let names = rsi_strategy().indicator_names();
        assert!(names.contains("rsi"));
        assert!(names.contains("sma_20"));
        assert!(names.contains("price"));
    }

    #[test]
    fn splits_entry_and_exit_rules() {
        let s = rsi_strategy();
        assert_eq!(s.entry_rules().count(), 1);
        assert_eq!(s.exit_rules().count(), 1);
    }

    #[test]
    fn rejects_empty_rules_and_conditions() {
        let mut s = rsi_strategy();
        s.rules[0].conditions.clear();
        assert!(matches!(s.validate(), Err(EngineError::InvalidStrategy(_))));

        s.rules.clear();
        assert!(matches!(s.validate(), Err(EngineError::InvalidStrategy(_))));
    }

    #[test]
    fn rejects_unknown_indicator() {
        let mut s = rsi_strategy();
        s.rules[0].conditions[0].indicator = "stochastic".into();
        assert!(matches!(s.validate(), Err(EngineError::InvalidStrategy(_))));
    }

    #[test]
    fn rejects_range_operator_without_range() {
        let mut s = rsi_strategy();
        s.rules[0].conditions[0].operator = Operator::InRange;
        assert!(matches!(s.validate(), Err(EngineError::InvalidStrategy(_))));

        s.rules[0].conditions[0].threshold = Threshold::Range(20.0, 40.0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn action_directions() {
        assert_eq!(Action::Buy.direction(), Some(Direction::Long));
        assert_eq!(Action::Sell.direction(), Some(Direction::Short));
        assert_eq!(Action::Close.direction(), None);
    }
}
