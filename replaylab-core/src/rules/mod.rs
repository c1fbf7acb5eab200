//! Strategy rule interpreter.
//!
//! A strategy is a list of rules; a rule fires when all of its conditions
//! hold on the primary timeframe. Entry rules (Buy/Sell) and exit rules
//! (Close) never act on the same bar.

pub mod condition;
pub mod evaluator;
pub mod strategy;

pub use condition::{Condition, Operator, Threshold, EQ_TOLERANCE};
pub use evaluator::{first_entry, first_exit, rule_fires, RuleGate, RuleMatch};
pub use strategy::{Action, Rule, Strategy};
