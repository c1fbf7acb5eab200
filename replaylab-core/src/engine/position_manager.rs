//! Open positions, realised balance and the trade log of one run.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{
    pip_profit, Bar, CloseReason, Direction, Position, PositionId, SymbolSpec, TradeRecord,
};
use crate::exits::{BarContext, EntryPlan, ExitAction, ExitConfig, ExitState, PartialExitManager};

/// An open position with its exit state machine.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub position: Position,
    pub exit: ExitState,
}

/// Owns every open position of a run.
///
/// Closing a position removes it from the open list and appends an
/// immutable [`TradeRecord`]; partial closes append a record and keep the
/// position. The balance changes only by trade profits.
#[derive(Debug)]
pub struct PositionManager {
    spec: SymbolSpec,
    balance: f64,
    open: Vec<OpenPosition>,
    trades: Vec<TradeRecord>,
    next_id: u64,
}

impl PositionManager {
    pub fn new(spec: SymbolSpec, initial_balance: f64) -> Self {
        Self {
            spec,
            balance: initial_balance,
            open: Vec::new(),
            trades: Vec::new(),
            next_id: 1,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn open_positions(&self) -> &[OpenPosition] {
        &self.open
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    pub fn unrealized(&self, price: f64) -> f64 {
        self.open
            .iter()
            .map(|o| o.position.unrealized_pnl(price, &self.spec))
            .sum()
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.balance + self.unrealized(price)
    }

    /// Realised profit of trades closed at or after `since`.
    pub fn realised_since(&self, since: DateTime<Utc>) -> f64 {
        self.trades
            .iter()
            .rev()
            .take_while(|t| t.exit_time >= since)
            .map(|t| t.profit)
            .sum()
    }

    /// Open a position at `bar.close` with the levels of `plan`.
    pub fn open(
        &mut self,
        direction: Direction,
        size: f64,
        bar_index: usize,
        bar: &Bar,
        plan: EntryPlan,
    ) -> PositionId {
        let id = PositionId(self.next_id);
        self.next_id += 1;
        let position = Position {
            id,
            symbol: self.spec.symbol.clone(),
            direction,
            original_size: size,
            remaining_size: size,
            entry_price: bar.close,
            entry_time: bar.timestamp,
            entry_bar: bar_index,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            initial_stop: plan.stop_loss,
        };
        debug!(
            position = %id,
            %direction,
            size,
            entry = bar.close,
            stop = plan.stop_loss,
            target = plan.take_profit,
            "position opened"
        );
        self.open.push(OpenPosition {
            position,
            exit: plan.state,
        });
        id
    }

    /// Run every open position's exit policy for one bar.
    pub fn apply_exit_policy(
        &mut self,
        bar_index: usize,
        ctx: &BarContext<'_>,
        config: &ExitConfig,
        manager: &dyn PartialExitManager,
    ) {
        let Self {
            spec,
            balance,
            open,
            trades,
            ..
        } = self;
        let time = ctx.bar.timestamp;

        open.retain_mut(|slot| {
            let actions = slot.exit.on_bar(&mut slot.position, ctx, config, manager);
            let mut keep = true;
            for action in actions {
                let fill = match action {
                    ExitAction::Partial { size, price, note } => {
                        debug!(position = %slot.position.id, size, price, %note, "partial exit");
                        keep = !slot.position.is_closed();
                        Fill {
                            size,
                            price,
                            reason: CloseReason::PartialExit,
                            partial: true,
                        }
                    }
                    ExitAction::Close { price, reason } => {
                        keep = false;
                        Fill {
                            size: slot.position.remaining_size,
                            price,
                            reason,
                            partial: false,
                        }
                    }
                };
                trades.push(settle(spec, balance, &slot.position, fill, bar_index, time));
            }
            keep
        });
    }

    /// Close every open position at `price`.
    pub fn close_all(&mut self, bar_index: usize, bar: &Bar, price: f64, reason: CloseReason) {
        for slot in std::mem::take(&mut self.open) {
            let fill = Fill {
                size: slot.position.remaining_size,
                price,
                reason,
                partial: false,
            };
            let record = settle(&self.spec, &mut self.balance, &slot.position, fill, bar_index, bar.timestamp);
            self.trades.push(record);
        }
    }
}

struct Fill {
    size: f64,
    price: f64,
    reason: CloseReason,
    partial: bool,
}

/// Book a closed quantity: credit the balance and build its trade record.
fn settle(
    spec: &SymbolSpec,
    balance: &mut f64,
    position: &Position,
    fill: Fill,
    bar_index: usize,
    time: DateTime<Utc>,
) -> TradeRecord {
    let profit = pip_profit(position.direction, position.entry_price, fill.price, fill.size, spec);
    *balance += profit;
    let pips = spec.price_to_pips(position.direction.sign() * (fill.price - position.entry_price));
    debug!(
        position = %position.id,
        reason = %fill.reason,
        size = fill.size,
        exit = fill.price,
        profit,
        "trade closed"
    );
    TradeRecord {
        position_id: position.id,
        symbol: position.symbol.clone(),
        direction: position.direction,
        entry_bar: position.entry_bar,
        entry_time: position.entry_time,
        entry_price: position.entry_price,
        exit_bar: bar_index,
        exit_time: time,
        exit_price: fill.price,
        size: fill.size,
        pips,
        profit,
        close_reason: fill.reason,
        partial: fill.partial,
    }
}
