//! Per-position exit state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::calculator::{ExitCalculator, ExitRequest};
use super::config::{ExitConfig, ExitMode};
use super::ladder::PartialLadder;
use super::partial_manager::{PartialExitContext, PartialExitManager};
use super::ratchet::TrailingStop;
use crate::domain::{levels_on_correct_side, Bar, CloseReason, Direction, Position, SymbolSpec};
use crate::market::{RegimeReading, TradingSession};

/// Market context for one bar.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub bar: &'a Bar,
    pub atr: f64,
    pub regime: RegimeReading,
    pub session: TradingSession,
    pub spec: &'a SymbolSpec,
}

/// What the exit policy decided for a position on a bar.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitAction {
    /// `size` lots were closed; the position's remaining size already
    /// reflects it.
    Partial { size: f64, price: f64, note: String },
    /// Close whatever remains.
    Close { price: f64, reason: CloseReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartState {
    pub ladder: PartialLadder,
    pub trailing: Option<TrailingStop>,
    pub max_holding_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialState {
    pub executed: Vec<String>,
    pub last_exit: Option<DateTime<Utc>>,
    pub peak_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExitState {
    Fixed,
    Smart(SmartState),
    Partial(PartialState),
}

/// Stop, target and exit state for a new position.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPlan {
    pub stop_loss: f64,
    pub take_profit: f64,
    pub state: ExitState,
}

/// Inputs available when a position is opened.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    pub direction: Direction,
    pub entry_price: f64,
    /// Bars up to and including the entry bar.
    pub history: &'a [Bar],
    pub atr: f64,
    pub spec: &'a SymbolSpec,
}

/// Compute initial levels for an entry.
///
/// A failing or inconsistent smart-exit calculation falls back to the fixed
/// distances of `config`.
pub fn plan_entry(
    config: &ExitConfig,
    calculator: &dyn ExitCalculator,
    ctx: &EntryContext<'_>,
) -> EntryPlan {
    let (fixed_stop, fixed_target) = config.fixed_levels(ctx.direction, ctx.entry_price);
    let fixed = EntryPlan {
        stop_loss: fixed_stop,
        take_profit: fixed_target,
        state: ExitState::Fixed,
    };

    match &config.mode {
        ExitMode::Fixed => fixed,
        ExitMode::EnhancedPartial(_) => EntryPlan {
            state: ExitState::Partial(PartialState {
                executed: Vec::new(),
                last_exit: None,
                peak_price: ctx.entry_price,
            }),
            ..fixed
        },
        ExitMode::Smart(smart) => {
            let request = ExitRequest {
                direction: ctx.direction,
                entry_price: ctx.entry_price,
                history: ctx.history,
                atr: ctx.atr,
                spec: ctx.spec,
                config: smart,
            };
            let plan = match calculator.calculate(&request) {
                Ok(plan) => plan,
                Err(err) => {
                    warn!(symbol = %ctx.spec.symbol, error = %err, "smart exit calculation failed, using fixed distances");
                    return fixed;
                }
            };
            let (stop, target) = (plan.stop_loss.price, plan.take_profit.price);
            if !levels_on_correct_side(ctx.direction, ctx.entry_price, stop, target) {
                warn!(
                    symbol = %ctx.spec.symbol,
                    direction = %ctx.direction,
                    entry = ctx.entry_price,
                    stop,
                    target,
                    "smart exit levels on wrong side of entry, using fixed distances"
                );
                return fixed;
            }

            let original_distance = (ctx.entry_price - stop).abs();
            let trailing = plan.trailing.then(|| {
                TrailingStop::new(ctx.direction, stop, original_distance * config.trail_factor)
            });
            debug!(
                stop,
                target,
                stop_reason = %plan.stop_loss.reason,
                confidence = plan.stop_loss.confidence,
                "smart exit plan"
            );
            EntryPlan {
                stop_loss: stop,
                take_profit: target,
                state: ExitState::Smart(SmartState {
                    ladder: PartialLadder::new(ctx.direction, ctx.entry_price, stop, &plan.partial_exits),
                    trailing,
                    max_holding_hours: plan.max_holding_hours,
                }),
            }
        }
    }
}

impl ExitState {
    /// Run the exit policy for one bar.
    ///
    /// Partial closes reduce `position.remaining_size` in place; a trailing
    /// stop moves `position.stop_loss`. Returns every close decided on this
    /// bar, in order. After a `Close`, or once the position is fully closed
    /// by partials, nothing further happens to it.
    pub fn on_bar(
        &mut self,
        position: &mut Position,
        ctx: &BarContext<'_>,
        config: &ExitConfig,
        manager: &dyn PartialExitManager,
    ) -> Vec<ExitAction> {
        let mut actions = Vec::new();
        let favourable = config.trigger.favourable_price(ctx.bar, position.direction);

        match self {
            ExitState::Fixed => {}
            ExitState::Smart(state) => {
                if let Some(fill) = state.ladder.check(position, favourable) {
                    position.remaining_size = (position.remaining_size - fill.size).max(0.0);
                    actions.push(ExitAction::Partial {
                        size: fill.size,
                        price: fill.price,
                        note: format!("ladder rung {}", fill.rung + 1),
                    });
                    if position.is_closed() {
                        return actions;
                    }
                }

                if let Some(trailing) = state.trailing.as_mut() {
                    if let Some(level) = trailing.update(position.direction, favourable) {
                        position.stop_loss = level;
                    }
                }

                if let Some(max_hours) = state.max_holding_hours {
                    let held = (ctx.bar.timestamp - position.entry_time).num_seconds() as f64 / 3_600.0;
                    if held >= max_hours {
                        actions.push(ExitAction::Close {
                            price: ctx.bar.close,
                            reason: CloseReason::MaxHoldingTime,
                        });
                        return actions;
                    }
                }
            }
            ExitState::Partial(state) => {
                state.peak_price = match position.direction {
                    Direction::Long => state.peak_price.max(favourable),
                    Direction::Short => state.peak_price.min(favourable),
                };
                if let Some(action) = run_partial_manager(state, position, ctx, config, manager) {
                    actions.push(action);
                    if position.is_closed() {
                        return actions;
                    }
                }
            }
        }

        if let Some(close) = check_stop_target(position, ctx.bar, config) {
            actions.push(close);
        }
        actions
    }
}

fn run_partial_manager(
    state: &mut PartialState,
    position: &mut Position,
    ctx: &BarContext<'_>,
    config: &ExitConfig,
    manager: &dyn PartialExitManager,
) -> Option<ExitAction> {
    let now = ctx.bar.timestamp;
    if let (Some(last), ExitMode::EnhancedPartial(cfg)) = (state.last_exit, &config.mode) {
        let since = (now - last).num_seconds() as f64 / 60.0;
        if since < cfg.cooldown_minutes {
            return None;
        }
    }

    let price = ctx.bar.close;
    let partial_ctx = PartialExitContext {
        position: &*position,
        price,
        time: now,
        atr: ctx.atr,
        regime: ctx.regime,
        session: ctx.session,
        peak_price: state.peak_price,
        executed: &state.executed,
        spec: ctx.spec,
    };
    let evaluation = manager.evaluate(&partial_ctx);
    let level = evaluation.top(&state.executed)?;

    let execution = match manager.execute(&level.level_id, &partial_ctx, price) {
        Ok(execution) => execution,
        Err(err) => {
            warn!(position = %position.id, level = %level.level_id, error = %err, "partial exit failed, skipping");
            return None;
        }
    };

    let size = execution.close_size.min(position.remaining_size);
    if !(size > 0.0) {
        return None;
    }
    state.executed.push(execution.level_id);
    state.last_exit = Some(now);
    position.remaining_size = (position.remaining_size - size).max(0.0);
    Some(ExitAction::Partial {
        size,
        price: execution.price,
        note: execution.reason,
    })
}

/// Regular stop/target check. Stop first; fills at the level.
pub fn check_stop_target(position: &Position, bar: &Bar, config: &ExitConfig) -> Option<ExitAction> {
    let dir = position.direction;
    let adverse = config.trigger.adverse_price(bar, dir);
    let favourable = config.trigger.favourable_price(bar, dir);

    let stop_hit = match dir {
        Direction::Long => adverse <= position.stop_loss,
        Direction::Short => adverse >= position.stop_loss,
    };
    if stop_hit {
        let reason = if position.stop_was_trailed() {
            CloseReason::TrailingStop
        } else {
            CloseReason::StopLoss
        };
        return Some(ExitAction::Close {
            price: position.stop_loss,
            reason,
        });
    }

    let target_hit = match dir {
        Direction::Long => favourable >= position.take_profit,
        Direction::Short => favourable <= position.take_profit,
    };
    target_hit.then_some(ExitAction::Close {
        price: position.take_profit,
        reason: CloseReason::TakeProfit,
    })
}
