//! Position sizing simulator.
//!
//! Replays a list of already-decided trades through a [`SizingCalculator`]
//! to see what a sizing method does to the account: each trade is sized
//! from the balance left by the trades before it, charged commission and
//! spread, and the run stops once the drawdown limit is reached.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use replaylab_core::domain::{Direction, SymbolSpec};
use replaylab_core::sizers::{SizingCalculator, SizingRequest};

use crate::metrics::{max_drawdown, PerformanceMetrics};
use crate::tail_metrics::{compute_tail_metrics, TailMetrics};

/// Drawdown above which the results carry a warning.
const DRAWDOWN_WARNING_PCT: f64 = 25.0;
/// Risk of ruin above which the results carry a warning.
const RUIN_WARNING_PCT: f64 = 10.0;
/// Average risk per trade considered aggressive.
const AGGRESSIVE_RISK_PCT: f64 = 2.0;

/// One trade to replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub entry_price: f64,
    pub exit_price: f64,
    pub direction: Direction,
    /// Result of the trade in pips, positive when it went the trade's way.
    pub pip_movement: f64,
    #[serde(default)]
    pub stop_loss_pips: Option<f64>,
    /// ATR at entry, in price units.
    #[serde(default)]
    pub atr: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub holding_hours: f64,
}

/// Account and cost settings of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_balance: f64,
    /// Account currency per lot, charged once per trade.
    pub commission_per_lot: f64,
    pub spread_pips: f64,
    /// Stop replaying once drawdown reaches this percentage.
    pub max_drawdown_limit: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
            commission_per_lot: 0.0,
            spread_pips: 0.0,
            max_drawdown_limit: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.initial_balance > 0.0 && self.initial_balance.is_finite()) {
            return Err(SimulationError::InvalidConfig(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }
        if !(self.commission_per_lot >= 0.0 && self.spread_pips >= 0.0) {
            return Err(SimulationError::InvalidConfig(
                "commission_per_lot and spread_pips must not be negative".into(),
            ));
        }
        if let Some(limit) = self.max_drawdown_limit {
            if !(limit > 0.0 && limit <= 100.0) {
                return Err(SimulationError::InvalidConfig(format!(
                    "max_drawdown_limit must be in (0, 100], got {limit}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("no trades to simulate")]
    NoTrades,

    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("invalid symbol spec for {0}")]
    InvalidSymbol(String),

    #[error("trade {index}: {reason}")]
    InvalidTrade { index: usize, reason: String },
}

/// What happened to one replayed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedTradeResult {
    pub index: usize,
    /// Lots; zero when the sizer skipped the trade.
    pub size: f64,
    /// Net of commission and spread.
    pub profit: f64,
    pub commission: f64,
    pub spread_cost: f64,
    pub balance: f64,
    /// Drawdown from the running peak after this trade, in percent.
    pub drawdown: f64,
    pub risk_amount: f64,
    pub risk_percent: f64,
    pub skipped: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub sizer: String,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub trades: Vec<SimulatedTradeResult>,
    /// Starting balance followed by the balance after each replayed trade.
    pub equity_curve: Vec<f64>,
    pub metrics: PerformanceMetrics,
    pub tail: TailMetrics,
    pub average_size: f64,
    pub min_size: f64,
    pub max_size: f64,
    pub average_risk_percent: f64,
    pub risk_of_ruin: f64,
    pub skipped_trades: usize,
    /// The drawdown limit stopped the replay early.
    pub halted: bool,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

impl SimulationResults {
    /// Drawdown of the last equity point from the running peak, in percent.
    pub fn final_drawdown(&self) -> f64 {
        let peak = self.equity_curve.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        match self.equity_curve.last() {
            Some(&last) => drawdown_pct(peak, last),
            None => 0.0,
        }
    }
}

/// Replays trades through a sizer.
#[derive(Clone)]
pub struct PositionSizingSimulator {
    sizer: Arc<dyn SizingCalculator>,
    spec: SymbolSpec,
    config: SimulationConfig,
}

impl PositionSizingSimulator {
    pub fn new(sizer: Arc<dyn SizingCalculator>, spec: SymbolSpec, config: SimulationConfig) -> Self {
        Self { sizer, spec, config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn run(&self, trades: &[SimulatedTrade]) -> Result<SimulationResults, SimulationError> {
        self.config.validate()?;
        if !self.spec.is_valid() {
            return Err(SimulationError::InvalidSymbol(self.spec.symbol.clone()));
        }
        if trades.is_empty() {
            return Err(SimulationError::NoTrades);
        }
        for (index, trade) in trades.iter().enumerate() {
            validate_trade(index, trade)?;
        }

        info!(
            sizer = self.sizer.name(),
            symbol = %self.spec.symbol,
            trades = trades.len(),
            "starting sizing simulation"
        );

        let pvf = self.spec.pip_value_factor;
        let mut balance = self.config.initial_balance;
        let mut peak = balance;
        let mut equity_curve = vec![balance];
        let mut results = Vec::with_capacity(trades.len());
        let mut profits: Vec<f64> = Vec::new();
        let mut holding_hours: Vec<f64> = Vec::new();
        let mut risk_amounts: Vec<f64> = Vec::new();
        let mut risk_percents: Vec<f64> = Vec::new();
        let mut sizes: Vec<f64> = Vec::new();
        let mut warnings = Vec::new();
        let mut halted = false;

        for (index, trade) in trades.iter().enumerate() {
            let request = SizingRequest {
                balance,
                equity: balance,
                direction: trade.direction,
                entry_price: trade.entry_price,
                stop_loss_pips: trade.stop_loss_pips,
                atr: trade.atr,
                volatility: trade.volatility,
                open_positions: 0,
                daily_pnl: 0.0,
                recent_profits: &profits,
                spec: &self.spec,
            };

            let decision = match self.sizer.calculate(&request) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(trade = index, error = %e, "sizer failed, trade skipped");
                    results.push(skipped(index, balance, peak, vec![e.to_string()]));
                    equity_curve.push(balance);
                    continue;
                }
            };
            if decision.is_blocked() {
                debug!(trade = index, warnings = ?decision.warnings, "sizer blocked trade");
                results.push(skipped(index, balance, peak, decision.warnings));
                equity_curve.push(balance);
                continue;
            }

            let size = decision.size;
            let commission = self.config.commission_per_lot * size;
            let spread_cost = self.config.spread_pips * size * pvf;
            let profit = trade.pip_movement * size * pvf - commission - spread_cost;

            balance += profit;
            peak = peak.max(balance);
            let drawdown = drawdown_pct(peak, balance);

            debug!(trade = index, size, profit, balance, drawdown, "trade replayed");

            profits.push(profit);
            holding_hours.push(trade.holding_hours);
            sizes.push(size);
            risk_amounts.push(decision.risk_amount);
            risk_percents.push(decision.risk_percent);
            equity_curve.push(balance);
            results.push(SimulatedTradeResult {
                index,
                size,
                profit,
                commission,
                spread_cost,
                balance,
                drawdown,
                risk_amount: decision.risk_amount,
                risk_percent: decision.risk_percent,
                skipped: false,
                warnings: decision.warnings,
            });

            if let Some(limit) = self.config.max_drawdown_limit {
                if drawdown >= limit {
                    warn!(trade = index, drawdown, limit, "drawdown limit reached, simulation halted");
                    warnings.push(format!(
                        "Simulation halted after trade {}: drawdown {drawdown:.1}% reached the {limit:.1}% limit",
                        index + 1
                    ));
                    halted = true;
                    break;
                }
            }
        }

        let mut metrics = PerformanceMetrics::from_series(&profits, &equity_curve);
        metrics.avg_holding_hours = mean(&holding_hours);
        let tail = compute_tail_metrics(&profits);
        let skipped_trades = results.iter().filter(|r| r.skipped).count();

        let average_risk_amount = mean(&risk_amounts);
        let risk_of_ruin = risk_of_ruin(&profits, balance, average_risk_amount);
        let average_risk_percent = mean(&risk_percents);

        let max_dd = max_drawdown(&equity_curve);
        if max_dd > DRAWDOWN_WARNING_PCT {
            warnings.push(format!(
                "Maximum drawdown {max_dd:.1}% exceeds {DRAWDOWN_WARNING_PCT:.0}%"
            ));
        }
        if risk_of_ruin > RUIN_WARNING_PCT {
            warnings.push(format!("Risk of ruin is {risk_of_ruin:.1}%"));
        }
        if skipped_trades > 0 {
            warnings.push(format!("{skipped_trades} trades were skipped by the sizer"));
        }

        let results = SimulationResults {
            sizer: self.sizer.name().to_string(),
            initial_balance: self.config.initial_balance,
            final_balance: balance,
            recommendations: recommendations(&metrics, average_risk_percent, risk_of_ruin),
            trades: results,
            equity_curve,
            tail,
            average_size: mean(&sizes),
            min_size: sizes.iter().copied().reduce(f64::min).unwrap_or(0.0),
            max_size: sizes.iter().copied().fold(0.0, f64::max),
            average_risk_percent,
            risk_of_ruin,
            skipped_trades,
            halted,
            warnings,
            metrics,
        };

        info!(
            final_balance = results.final_balance,
            max_drawdown = results.metrics.max_drawdown,
            halted = results.halted,
            "sizing simulation finished"
        );
        Ok(results)
    }
}

fn validate_trade(index: usize, trade: &SimulatedTrade) -> Result<(), SimulationError> {
    let invalid = |reason: &str| SimulationError::InvalidTrade {
        index,
        reason: reason.to_string(),
    };
    if !(trade.entry_price > 0.0 && trade.entry_price.is_finite()) {
        return Err(invalid("entry_price must be positive"));
    }
    if !(trade.exit_price > 0.0 && trade.exit_price.is_finite()) {
        return Err(invalid("exit_price must be positive"));
    }
    if !trade.pip_movement.is_finite() {
        return Err(invalid("pip_movement is not finite"));
    }
    if trade.holding_hours < 0.0 {
        return Err(invalid("holding_hours must not be negative"));
    }
    Ok(())
}

fn skipped(index: usize, balance: f64, peak: f64, warnings: Vec<String>) -> SimulatedTradeResult {
    SimulatedTradeResult {
        index,
        size: 0.0,
        profit: 0.0,
        commission: 0.0,
        spread_cost: 0.0,
        balance,
        drawdown: drawdown_pct(peak, balance),
        risk_amount: 0.0,
        risk_percent: 0.0,
        skipped: true,
        warnings,
    }
}

fn drawdown_pct(peak: f64, balance: f64) -> f64 {
    if peak <= 0.0 {
        return 0.0;
    }
    ((peak - balance) / peak * 100.0).clamp(0.0, 100.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Probability (0..100) of losing the account, from the trade edge.
///
/// `((1 − E) / (1 + E))^U × 100` with `E = (p·W − q·L) / (p·W + q·L)` and
/// `U = balance / average risk`. The average loss stands in for the risk
/// when the sizer reported none.
pub fn risk_of_ruin(profits: &[f64], balance: f64, average_risk: f64) -> f64 {
    let losses: Vec<f64> = profits.iter().copied().filter(|p| *p < 0.0).map(f64::abs).collect();
    if losses.is_empty() {
        return 0.0;
    }
    let wins: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
    let n = profits.len() as f64;
    let p = wins.len() as f64 / n;
    let q = losses.len() as f64 / n;
    let avg_win = mean(&wins);
    let avg_loss = mean(&losses);

    let favourable = p * avg_win;
    let adverse = q * avg_loss;
    let edge = (favourable - adverse) / (favourable + adverse);
    if edge <= 0.0 {
        return 100.0;
    }
    if balance <= 0.0 {
        return 100.0;
    }

    let unit = if average_risk > 0.0 { average_risk } else { avg_loss };
    let units = balance / unit;
    (((1.0 - edge) / (1.0 + edge)).powf(units) * 100.0).clamp(0.0, 100.0)
}

fn recommendations(metrics: &PerformanceMetrics, average_risk_percent: f64, risk_of_ruin: f64) -> Vec<String> {
    let mut out = Vec::new();
    if average_risk_percent > AGGRESSIVE_RISK_PCT {
        out.push(format!(
            "Average risk per trade is {average_risk_percent:.2}%; consider 1-2% of balance"
        ));
    }
    if metrics.max_drawdown > DRAWDOWN_WARNING_PCT {
        out.push("Lower the risk percentage or max_size to keep drawdown under 25%".to_string());
    }
    if metrics.trade_count > 0 && metrics.profit_factor < 1.0 {
        out.push("Profit factor is below 1.0; no sizing method recovers a negative edge".to_string());
    }
    if metrics.trade_count > 0 && metrics.win_rate < 40.0 {
        out.push("Win rate is below 40%; prefer fixed-risk sizing over Kelly".to_string());
    }
    if risk_of_ruin > RUIN_WARNING_PCT {
        out.push("Reduce position size until the risk of ruin is below 10%".to_string());
    }
    out
}
