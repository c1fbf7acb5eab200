//! Performance metrics: pure functions that compute strategy statistics.
//!
//! Every metric is a pure function: equity curve and/or trade profits in,
//! scalar out. Percentages are expressed on a 0..100 scale. Statistics that
//! are undefined for the given sample (no trades, zero variance, no
//! drawdown) come back as neutral values rather than errors.

use serde::{Deserialize, Deserializer, Serialize};

use replaylab_core::domain::{EquityPoint, TradeRecord};

/// Bar returns are annualised as if they were daily.
const PERIODS_PER_YEAR: f64 = 252.0;

/// Aggregate performance metrics for a single backtest or simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Winners / trades × 100.
    pub win_rate: f64,
    /// Gross profit / gross loss. Infinite when there are no losers and the
    /// gross profit is positive; serialised as `null` in that case.
    #[serde(deserialize_with = "null_as_infinity")]
    pub profit_factor: f64,

    // ── Money ──
    /// Sum of trade profits.
    pub total_profit: f64,
    /// Final equity minus the initial balance.
    pub net_profit: f64,
    pub gross_profit: f64,
    /// Sum of losing trades, as a positive amount.
    pub gross_loss: f64,
    pub average_win: f64,
    /// Mean losing trade, as a positive amount.
    pub average_loss: f64,
    pub largest_win: f64,
    /// Worst trade, as a positive amount.
    pub largest_loss: f64,
    /// Expected profit per trade.
    pub expectancy: f64,

    // ── Curve ──
    pub total_return: f64,
    /// Deepest peak-to-trough fall of equity, 0..100.
    pub max_drawdown: f64,
    /// Same drawdown in account currency.
    pub max_drawdown_amount: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    /// Net profit / max drawdown amount.
    pub recovery_factor: f64,

    // ── Trades ──
    pub longest_win_streak: usize,
    pub longest_loss_streak: usize,
    pub avg_holding_hours: f64,
    pub partial_exits: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics for an engine run.
    ///
    /// The initial balance is treated as the first point of the curve, so a
    /// loss on the very first bar still counts as drawdown.
    pub fn compute(trades: &[TradeRecord], equity_curve: &[EquityPoint], initial_balance: f64) -> Self {
        let profits: Vec<f64> = trades.iter().map(|t| t.profit).collect();
        let mut equity = Vec::with_capacity(equity_curve.len() + 1);
        equity.push(initial_balance);
        equity.extend(equity_curve.iter().map(|p| p.equity));

        let mut metrics = Self::from_series(&profits, &equity);
        if !trades.is_empty() {
            metrics.avg_holding_hours =
                trades.iter().map(|t| t.holding_hours()).sum::<f64>() / trades.len() as f64;
        }
        metrics.partial_exits = trades.iter().filter(|t| t.partial).count();
        metrics
    }

    /// Compute the metric family from trade profits and an equity curve
    /// whose first point is the starting balance.
    ///
    /// Holding time and partial-exit count are left at zero.
    pub fn from_series(profits: &[f64], equity_curve: &[f64]) -> Self {
        let initial = equity_curve.first().copied().unwrap_or(0.0);
        let final_equity = equity_curve.last().copied().unwrap_or(initial);

        let wins: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = profits.iter().copied().filter(|p| *p < 0.0).map(f64::abs).collect();

        let total_return = total_return(initial, final_equity);
        let max_drawdown = max_drawdown(equity_curve);
        let max_drawdown_amount = max_drawdown_amount(equity_curve);
        let net_profit = final_equity - initial;

        Self {
            trade_count: profits.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: win_rate(profits),
            profit_factor: profit_factor(profits),
            total_profit: profits.iter().sum(),
            net_profit,
            gross_profit: wins.iter().sum(),
            gross_loss: losses.iter().sum(),
            average_win: mean_f64(&wins),
            average_loss: mean_f64(&losses),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::max),
            expectancy: expectancy(profits),
            total_return,
            max_drawdown,
            max_drawdown_amount,
            sharpe: sharpe_ratio(equity_curve),
            sortino: sortino_ratio(equity_curve),
            calmar: calmar_ratio(total_return, max_drawdown),
            recovery_factor: recovery_factor(net_profit, max_drawdown_amount),
            longest_win_streak: longest_streak(profits, true),
            longest_loss_streak: longest_streak(profits, false),
            avg_holding_hours: 0.0,
            partial_exits: 0,
        }
    }
}

fn null_as_infinity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return in percent: (final - initial) / initial × 100.
pub fn total_return(initial: f64, final_equity: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    (final_equity - initial) / initial * 100.0
}

/// Annualized Sharpe ratio from bar returns.
///
/// Sharpe = mean(returns) / std(returns) * sqrt(252).
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean_f64(&returns) / std) * PERIODS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio.
///
/// Sortino = mean(returns) / std(negative returns) * sqrt(252).
/// Returns 0.0 with fewer than two negative returns or zero downside spread.
pub fn sortino_ratio(equity_curve: &[f64]) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_std = std_dev(&downside);
    if downside_std < 1e-15 {
        return 0.0;
    }
    (mean_f64(&returns) / downside_std) * PERIODS_PER_YEAR.sqrt()
}

/// Calmar ratio: total return % / |max drawdown %|.
///
/// Returns 0.0 when there was no drawdown.
pub fn calmar_ratio(total_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown.abs() < 1e-12 {
        return 0.0;
    }
    total_return / max_drawdown.abs()
}

/// Maximum drawdown in percent of the running peak (e.g. 15.0 = 15%).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = match equity_curve.first() {
        Some(&first) => first,
        None => return 0.0,
    };
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak * 100.0);
        }
    }
    // equity below zero is a total loss, not more than one
    max_dd.clamp(0.0, 100.0)
}

/// Maximum drawdown in account currency.
pub fn max_drawdown_amount(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        max_dd = max_dd.max(peak - eq);
    }
    max_dd
}

/// Win rate in percent.
pub fn win_rate(profits: &[f64]) -> f64 {
    if profits.is_empty() {
        return 0.0;
    }
    let winners = profits.iter().filter(|p| **p > 0.0).count();
    winners as f64 / profits.len() as f64 * 100.0
}

/// Profit factor: gross profits / gross losses.
///
/// Infinite when nothing lost and something was won; 0.0 when nothing was
/// won either.
pub fn profit_factor(profits: &[f64]) -> f64 {
    let gross_profit: f64 = profits.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = profits.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();

    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    gross_profit / gross_loss
}

/// Expected profit per trade: winRate × avgWin − lossRate × avgLoss.
pub fn expectancy(profits: &[f64]) -> f64 {
    if profits.is_empty() {
        return 0.0;
    }
    let n = profits.len() as f64;
    let wins: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = profits.iter().copied().filter(|p| *p < 0.0).map(f64::abs).collect();
    let win_rate = wins.len() as f64 / n;
    let loss_rate = losses.len() as f64 / n;
    win_rate * mean_f64(&wins) - loss_rate * mean_f64(&losses)
}

/// Net profit recovered per unit of maximum drawdown.
pub fn recovery_factor(net_profit: f64, max_drawdown_amount: f64) -> f64 {
    if max_drawdown_amount < 1e-12 {
        return 0.0;
    }
    net_profit / max_drawdown_amount
}

/// Longest run of consecutive winners (`winners = true`) or losers.
///
/// A break-even trade ends both kinds of streak.
pub fn longest_streak(profits: &[f64], winners: bool) -> usize {
    let mut max_streak = 0;
    let mut current = 0;

    for &profit in profits {
        let counts = if winners { profit > 0.0 } else { profit < 0.0 };
        if counts {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity samples.
pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use replaylab_core::domain::{CloseReason, Direction, PositionId};

    fn make_trade(profit: f64, hours: i64, partial: bool) -> TradeRecord {
        let entry_time = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        TradeRecord {
            position_id: PositionId(1),
            symbol: "EURUSD".into(),
            direction: Direction::Long,
            entry_bar: 0,
            entry_time,
            entry_price: 1.1,
            exit_bar: hours as usize,
            exit_time: entry_time + chrono::Duration::hours(hours),
            exit_price: 1.1 + profit / 100_000.0,
            size: 1.0,
            pips: profit / 10.0,
            profit,
            close_reason: if partial { CloseReason::PartialExit } else { CloseReason::TakeProfit },
            partial,
        }
    }

    // ── Total return ──

    #[test]
    fn total_return_in_percent() {
        assert!((total_return(10_000.0, 11_000.0) - 10.0).abs() < 1e-10);
        assert!((total_return(10_000.0, 9_000.0) + 10.0).abs() < 1e-10);
        assert_eq!(total_return(0.0, 5.0), 0.0);
    }

    // ── Sharpe ──

    #[test]
    fn sharpe_constant_equity_is_zero() {
        assert_eq!(sharpe_ratio(&[10_000.0; 50]), 0.0);
    }

    #[test]
    fn sharpe_constant_return_is_zero() {
        let mut eq = vec![10_000.0];
        for i in 1..100 {
            eq.push(eq[i - 1] * 1.001);
        }
        assert_eq!(sharpe_ratio(&eq), 0.0);
    }

    #[test]
    fn sharpe_positive_for_consistent_gains() {
        let mut eq = vec![10_000.0];
        for i in 1..100 {
            let r = if i % 2 == 0 { 1.002 } else { 1.0005 };
            eq.push(eq[i - 1] * r);
        }
        assert!(sharpe_ratio(&eq) > 5.0);
    }

    #[test]
    fn sharpe_single_point() {
        assert_eq!(sharpe_ratio(&[10_000.0]), 0.0);
    }

    // ── Sortino ──

    #[test]
    fn sortino_no_downside_is_zero() {
        let eq: Vec<f64> = (0..50).map(|i| 10_000.0 + i as f64 * 10.0).collect();
        assert_eq!(sortino_ratio(&eq), 0.0);
    }

    #[test]
    fn sortino_uses_negative_returns_only() {
        // returns: +10%, -5%, +10%, -10%
        let eq = [100.0, 110.0, 104.5, 114.95, 103.455];
        let returns = bar_returns(&eq);
        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        let expected = mean_f64(&returns) / std_dev(&downside) * 252.0_f64.sqrt();
        assert!((sortino_ratio(&eq) - expected).abs() < 1e-9);
        assert!(sortino_ratio(&eq) > sharpe_ratio(&eq));
    }

    // ── Drawdown ──

    #[test]
    fn max_drawdown_caps_at_total_loss() {
        let eq = [10_000.0, 10_500.0, -4_000.0, 2_000.0];
        assert_eq!(max_drawdown(&eq), 100.0);
        assert!((max_drawdown_amount(&eq) - 14_500.0).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_uses_running_peak() {
        let eq = [10_000.0, 11_000.0, 9_000.0, 9_500.0];
        let expected = (11_000.0 - 9_000.0) / 11_000.0 * 100.0;
        assert!((max_drawdown(&eq) - expected).abs() < 1e-10);
        assert!((max_drawdown_amount(&eq) - 2_000.0).abs() < 1e-10);
    }

    #[test]
    fn max_drawdown_monotonic_increase() {
        let eq: Vec<f64> = (0..20).map(|i| 10_000.0 + i as f64).collect();
        assert_eq!(max_drawdown(&eq), 0.0);
        assert_eq!(max_drawdown_amount(&eq), 0.0);
    }

    #[test]
    fn max_drawdown_empty() {
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown_amount(&[]), 0.0);
    }

    // ── Calmar / recovery ──

    #[test]
    fn calmar_divides_by_drawdown_magnitude() {
        assert!((calmar_ratio(20.0, 10.0) - 2.0).abs() < 1e-12);
        assert!((calmar_ratio(-5.0, 10.0) + 0.5).abs() < 1e-12);
        assert_eq!(calmar_ratio(20.0, 0.0), 0.0);
    }

    #[test]
    fn recovery_factor_zero_without_drawdown() {
        assert_eq!(recovery_factor(500.0, 0.0), 0.0);
        assert!((recovery_factor(500.0, 250.0) - 2.0).abs() < 1e-12);
    }

    // ── Trade statistics ──

    #[test]
    fn win_rate_in_percent() {
        assert!((win_rate(&[10.0, -5.0, 3.0, -1.0]) - 50.0).abs() < 1e-10);
        assert_eq!(win_rate(&[]), 0.0);
    }

    #[test]
    fn profit_factor_known() {
        assert!((profit_factor(&[300.0, -100.0, 200.0, -100.0]) - 2.5).abs() < 1e-10);
    }

    #[test]
    fn profit_factor_without_losers() {
        assert_eq!(profit_factor(&[10.0, 20.0]), f64::INFINITY);
        assert_eq!(profit_factor(&[]), 0.0);
        assert_eq!(profit_factor(&[0.0]), 0.0);
    }

    #[test]
    fn expectancy_known() {
        // 50% × 150 − 50% × 50
        assert!((expectancy(&[100.0, 200.0, -50.0, -50.0]) - 50.0).abs() < 1e-10);
        assert_eq!(expectancy(&[]), 0.0);
    }

    #[test]
    fn streaks() {
        let profits = [1.0, 2.0, 3.0, -1.0, -2.0, 1.0, -1.0, -1.0, -1.0, -1.0, 0.0, -1.0];
        assert_eq!(longest_streak(&profits, true), 3);
        assert_eq!(longest_streak(&profits, false), 4);
        assert_eq!(longest_streak(&[], true), 0);
    }

    // ── Compute ──

    #[test]
    fn compute_from_engine_output() {
        let trades = vec![make_trade(200.0, 4, true), make_trade(-100.0, 2, false), make_trade(50.0, 6, false)];
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let curve: Vec<EquityPoint> = [10_200.0, 10_100.0, 10_150.0]
            .iter()
            .enumerate()
            .map(|(i, &eq)| EquityPoint {
                timestamp: base + chrono::Duration::hours(i as i64),
                balance: eq,
                equity: eq,
            })
            .collect();

        let m = PerformanceMetrics::compute(&trades, &curve, 10_000.0);
        assert_eq!(m.trade_count, 3);
        assert_eq!(m.winning_trades, 2);
        assert_eq!(m.losing_trades, 1);
        assert!((m.total_profit - 150.0).abs() < 1e-10);
        assert!((m.net_profit - 150.0).abs() < 1e-10);
        assert!((m.gross_profit - 250.0).abs() < 1e-10);
        assert!((m.gross_loss - 100.0).abs() < 1e-10);
        assert!((m.average_win - 125.0).abs() < 1e-10);
        assert!((m.largest_win - 200.0).abs() < 1e-10);
        assert!((m.largest_loss - 100.0).abs() < 1e-10);
        assert!((m.profit_factor - 2.5).abs() < 1e-10);
        assert!((m.total_return - 1.5).abs() < 1e-10);
        assert!((m.max_drawdown_amount - 100.0).abs() < 1e-10);
        assert!((m.recovery_factor - 1.5).abs() < 1e-10);
        assert!((m.avg_holding_hours - 4.0).abs() < 1e-10);
        assert_eq!(m.partial_exits, 1);
    }

    #[test]
    fn compute_without_trades_is_neutral() {
        let m = PerformanceMetrics::compute(&[], &[], 10_000.0);
        assert_eq!(m.trade_count, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.total_return, 0.0);
    }

    #[test]
    fn infinite_profit_factor_survives_json() {
        let m = PerformanceMetrics::from_series(&[100.0], &[10_000.0, 10_100.0]);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"profit_factor\":null"));
        let back: PerformanceMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.profit_factor, f64::INFINITY);
    }
}
