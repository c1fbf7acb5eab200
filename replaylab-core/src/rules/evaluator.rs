//! Rule evaluation against precomputed indicator values.

use super::strategy::{Action, Rule, Strategy};
use crate::indicators::IndicatorValues;

/// A rule that fired on a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule_index: usize,
    pub action: Action,
}

/// True when every condition applies to the primary timeframe and holds.
pub fn rule_fires(rule: &Rule, strategy: &Strategy, values: &IndicatorValues, index: usize) -> bool {
    rule.conditions
        .iter()
        .all(|c| c.applies_to(strategy.timeframe) && c.evaluate(values, index))
}

/// First entry rule (Buy/Sell) firing at `index`, in declaration order.
pub fn first_entry(strategy: &Strategy, values: &IndicatorValues, index: usize) -> Option<RuleMatch> {
    first_matching(strategy, values, index, |a| a.is_entry())
}

/// First exit rule (Close) firing at `index`.
pub fn first_exit(strategy: &Strategy, values: &IndicatorValues, index: usize) -> Option<RuleMatch> {
    first_matching(strategy, values, index, |a| a == Action::Close)
}

fn first_matching(
    strategy: &Strategy,
    values: &IndicatorValues,
    index: usize,
    wanted: impl Fn(Action) -> bool,
) -> Option<RuleMatch> {
    strategy
        .rules
        .iter()
        .enumerate()
        .filter(|(_, r)| wanted(r.action))
        .find(|(_, r)| rule_fires(r, strategy, values, index))
        .map(|(rule_index, r)| RuleMatch {
            rule_index,
            action: r.action,
        })
}

/// Which rule families may act on a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleGate {
    pub exits: bool,
    pub entries: bool,
}

impl RuleGate {
    /// Exit rules need an open position. With `max_positions == 1` entries
    /// need a flat book; above that they need room under the cap and no
    /// exit rule having fired on this bar.
    pub fn for_bar(open_positions: usize, max_positions: usize, exit_fired: bool) -> Self {
        let entries = if max_positions <= 1 {
            open_positions == 0
        } else {
            open_positions < max_positions && !exit_fired
        };
        Self {
            exits: open_positions > 0,
            entries: entries && !exit_fired,
        }
    }
}
