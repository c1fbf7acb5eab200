//! Multi-trigger partial exits.
//!
//! A `PartialExitManager` looks at an open position each bar and recommends
//! levels to execute. The engine runs the top-priority recommendation that
//! has not been executed yet and is outside the cooldown window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Position, SymbolSpec};
use crate::error::CalculatorError;
use crate::market::{MarketRegime, RegimeReading, TradingSession};

/// What the manager sees for one position on one bar.
#[derive(Debug, Clone, Copy)]
pub struct PartialExitContext<'a> {
    pub position: &'a Position,
    pub price: f64,
    pub time: DateTime<Utc>,
    pub atr: f64,
    pub regime: RegimeReading,
    pub session: TradingSession,
    /// Most favourable price since entry.
    pub peak_price: f64,
    /// Level ids already executed for this position.
    pub executed: &'a [String],
    pub spec: &'a SymbolSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedLevel {
    pub level_id: String,
    /// Lower runs first.
    pub priority: u32,
    pub percent: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialExitEvaluation {
    pub recommended: Vec<RecommendedLevel>,
}

impl PartialExitEvaluation {
    /// Highest-priority recommendation not in `executed`.
    pub fn top(&self, executed: &[String]) -> Option<&RecommendedLevel> {
        self.recommended
            .iter()
            .filter(|l| !executed.contains(&l.level_id))
            .min_by_key(|l| l.priority)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialExecution {
    pub level_id: String,
    /// Lots to close.
    pub close_size: f64,
    pub price: f64,
    pub reason: String,
}

pub trait PartialExitManager: Send + Sync {
    fn evaluate(&self, ctx: &PartialExitContext<'_>) -> PartialExitEvaluation;

    fn execute(
        &self,
        level_id: &str,
        ctx: &PartialExitContext<'_>,
        price: f64,
    ) -> Result<PartialExecution, CalculatorError>;
}

/// Trigger of one partial-exit level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    ProfitPips { value: f64 },
    ProfitPercent { value: f64 },
    RiskReward { value: f64 },
    AtrMultiple { value: f64 },
    Price { value: f64 },
    ElapsedMinutes { value: f64 },
    /// Retracement from the peak since entry, in pips.
    TrailingPips { value: f64 },
    Regime {
        regime: MarketRegime,
        #[serde(default = "default_regime_confidence")]
        min_confidence: f64,
    },
}

fn default_regime_confidence() -> f64 {
    60.0
}

fn default_priority() -> u32 {
    99
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialLevelConfig {
    pub id: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Percent of the remaining size closed (0–100].
    pub percent: f64,
    pub trigger: Trigger,
    /// Restrict the level to these sessions; empty means any session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<TradingSession>,
}

impl Trigger {
    /// `Some(reason)` when the trigger condition holds.
    fn check(&self, ctx: &PartialExitContext<'_>) -> Option<String> {
        let pos = ctx.position;
        let sign = pos.direction.sign();
        let move_in_favour = sign * (ctx.price - pos.entry_price);

        match *self {
            Trigger::ProfitPips { value } => {
                let pips = ctx.spec.price_to_pips(move_in_favour);
                (pips >= value).then(|| format!("profit {pips:.1} pips"))
            }
            Trigger::ProfitPercent { value } => {
                let pct = move_in_favour / pos.entry_price * 100.0;
                (pct >= value).then(|| format!("profit {pct:.2}%"))
            }
            Trigger::RiskReward { value } => {
                let risk = pos.risk_distance();
                if risk <= 0.0 {
                    return None;
                }
                let rr = move_in_favour / risk;
                (rr >= value).then(|| format!("risk-reward {rr:.2}:1"))
            }
            Trigger::AtrMultiple { value } => {
                (ctx.atr > 0.0 && move_in_favour >= ctx.atr * value)
                    .then(|| format!("ATR target {value}x"))
            }
            Trigger::Price { value } => {
                let reached = sign * (ctx.price - value) >= 0.0;
                reached.then(|| format!("price {value}"))
            }
            Trigger::ElapsedMinutes { value } => {
                let minutes = (ctx.time - pos.entry_time).num_seconds() as f64 / 60.0;
                (minutes >= value).then(|| format!("held {minutes:.0} minutes"))
            }
            Trigger::TrailingPips { value } => {
                let retrace = sign * (ctx.peak_price - ctx.price);
                (retrace >= ctx.spec.pips_to_price(value))
                    .then(|| format!("retraced {value} pips from peak"))
            }
            Trigger::Regime {
                regime,
                min_confidence,
            } => (ctx.regime.regime == regime && ctx.regime.confidence >= min_confidence)
                .then(|| format!("regime {regime} ({:.0}%)", ctx.regime.confidence)),
        }
    }
}

/// Default manager: a fixed list of triggered levels.
#[derive(Debug, Clone, Default)]
pub struct TriggerLadderManager {
    levels: Vec<PartialLevelConfig>,
}

impl TriggerLadderManager {
    /// Levels with a percent outside (0, 100] are dropped.
    pub fn new(levels: Vec<PartialLevelConfig>) -> Self {
        let mut levels: Vec<PartialLevelConfig> = levels
            .into_iter()
            .filter(|l| l.percent > 0.0 && l.percent <= 100.0)
            .collect();
        levels.sort_by_key(|l| l.priority);
        Self { levels }
    }

    pub fn levels(&self) -> &[PartialLevelConfig] {
        &self.levels
    }
}

impl PartialExitManager for TriggerLadderManager {
    fn evaluate(&self, ctx: &PartialExitContext<'_>) -> PartialExitEvaluation {
        let recommended = self
            .levels
            .iter()
            .filter(|l| !ctx.executed.contains(&l.id))
            .filter(|l| l.sessions.is_empty() || l.sessions.contains(&ctx.session))
            .filter_map(|l| {
                l.trigger.check(ctx).map(|reason| RecommendedLevel {
                    level_id: l.id.clone(),
                    priority: l.priority,
                    percent: l.percent,
                    reason,
                })
            })
            .collect();
        PartialExitEvaluation { recommended }
    }

    fn execute(
        &self,
        level_id: &str,
        ctx: &PartialExitContext<'_>,
        price: f64,
    ) -> Result<PartialExecution, CalculatorError> {
        let level = self
            .levels
            .iter()
            .find(|l| l.id == level_id)
            .ok_or_else(|| CalculatorError::UnknownLevel(level_id.to_string()))?;
        if !price.is_finite() {
            return Err(CalculatorError::NonFinite("partial exit price"));
        }
        let remaining = ctx.position.remaining_size;
        let close_size = (remaining * level.percent / 100.0).min(remaining);
        Ok(PartialExecution {
            level_id: level.id.clone(),
            close_size,
            price,
            reason: format!("{} ({}%)", level.id, level.percent),
        })
    }
}
