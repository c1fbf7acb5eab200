//! Tail risk metrics: VaR, skewness, kurtosis, win-rate stability.
//!
//! These complement the core `PerformanceMetrics` with distribution shape
//! statistics of per-trade profits. All functions are pure: trade profits
//! in, scalar out. Below the sample thresholds every statistic is 0.0.

use serde::{Deserialize, Serialize};

use crate::metrics::{mean_f64, std_dev};

/// Minimum number of trades for VaR, skewness and kurtosis.
pub const MIN_TAIL_TRADES: usize = 10;

/// Minimum number of trades for win-rate stability.
pub const MIN_STABILITY_TRADES: usize = 20;

/// Trades per rolling win-rate window.
pub const STABILITY_WINDOW: usize = 10;

/// Distribution statistics of trade profits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailMetrics {
    /// Value at Risk at 95%: magnitude of the 5th-percentile trade profit.
    pub var_95: f64,

    /// Skewness of trade profits (third standardized moment).
    /// Negative = left tail heavier (more large losses than gains).
    pub skewness: f64,

    /// Excess kurtosis of trade profits (fourth standardized moment - 3).
    pub kurtosis: f64,

    /// 1 − coefficient of variation of rolling 10-trade win rates.
    /// 1.0 means the win rate never moved.
    pub win_rate_stability: f64,

    /// Number of trades used.
    pub sample_size: usize,
}

/// Compute all tail metrics from trade profits, oldest first.
pub fn compute_tail_metrics(profits: &[f64]) -> TailMetrics {
    let n = profits.len();
    let tail_ready = n >= MIN_TAIL_TRADES;

    TailMetrics {
        var_95: if tail_ready { value_at_risk_95(profits) } else { 0.0 },
        skewness: if tail_ready { skewness(profits) } else { 0.0 },
        kurtosis: if tail_ready { excess_kurtosis(profits) } else { 0.0 },
        win_rate_stability: if n >= MIN_STABILITY_TRADES {
            win_rate_stability(profits)
        } else {
            0.0
        },
        sample_size: n,
    }
}

/// |5th-percentile profit|, nearest-rank from below.
fn value_at_risk_95(profits: &[f64]) -> f64 {
    let mut sorted = profits.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = (sorted.len() as f64 * 0.05).floor() as usize;
    sorted.get(index).map_or(0.0, |p| p.abs())
}

/// Skewness (third standardized moment).
///
/// skew = (1/n) * sum(((x_i - mean) / std)^3)
fn skewness(profits: &[f64]) -> f64 {
    let n = profits.len() as f64;
    let mean = mean_f64(profits);
    let std = std_dev(profits);

    if std < 1e-15 {
        return 0.0;
    }

    profits.iter().map(|p| ((p - mean) / std).powi(3)).sum::<f64>() / n
}

/// Excess kurtosis (fourth standardized moment minus 3).
///
/// kurt = (1/n) * sum(((x_i - mean) / std)^4) - 3
fn excess_kurtosis(profits: &[f64]) -> f64 {
    let n = profits.len() as f64;
    let mean = mean_f64(profits);
    let std = std_dev(profits);

    if std < 1e-15 {
        return 0.0;
    }

    profits.iter().map(|p| ((p - mean) / std).powi(4)).sum::<f64>() / n - 3.0
}

/// 1 − CV of win rates over every window of `STABILITY_WINDOW` trades.
///
/// 0.0 when no window contains a winner.
fn win_rate_stability(profits: &[f64]) -> f64 {
    let rates: Vec<f64> = profits
        .windows(STABILITY_WINDOW)
        .map(|w| w.iter().filter(|p| **p > 0.0).count() as f64 / STABILITY_WINDOW as f64)
        .collect();
    let mean = mean_f64(&rates);
    if mean < 1e-15 {
        return 0.0;
    }
    1.0 - std_dev(&rates) / mean
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_everything_is_zero() {
        let tm = compute_tail_metrics(&[-500.0, 20.0, 30.0, -10.0, 900.0]);
        assert_eq!(tm.var_95, 0.0);
        assert_eq!(tm.skewness, 0.0);
        assert_eq!(tm.kurtosis, 0.0);
        assert_eq!(tm.win_rate_stability, 0.0);
        assert_eq!(tm.sample_size, 5);
    }

    #[test]
    fn empty_is_zero() {
        let tm = compute_tail_metrics(&[]);
        assert_eq!(tm.var_95, 0.0);
        assert_eq!(tm.sample_size, 0);
    }

    #[test]
    fn var_95_is_worst_of_ten() {
        let profits = [10.0, -40.0, 5.0, 7.0, -3.0, 12.0, 8.0, -1.0, 4.0, 6.0];
        assert_eq!(compute_tail_metrics(&profits).var_95, 40.0);
    }

    #[test]
    fn var_95_picks_fifth_percentile_rank() {
        // 40 trades: -100..-61 sorted; rank floor(40 × 0.05) = 2
        let profits: Vec<f64> = (0..40).map(|i| -100.0 + i as f64).collect();
        assert_eq!(compute_tail_metrics(&profits).var_95, 98.0);
    }

    #[test]
    fn skewness_negative_for_left_skewed() {
        let mut profits = vec![10.0; 30];
        profits[3] = -200.0;
        profits[17] = -150.0;
        let tm = compute_tail_metrics(&profits);
        assert!(tm.skewness < 0.0, "skew {}", tm.skewness);
    }

    #[test]
    fn kurtosis_positive_for_fat_tails() {
        let mut profits = vec![5.0; 40];
        profits[10] = 300.0;
        profits[25] = -300.0;
        let tm = compute_tail_metrics(&profits);
        assert!(tm.kurtosis > 0.0, "kurtosis {}", tm.kurtosis);
    }

    #[test]
    fn constant_profits_have_no_shape() {
        let tm = compute_tail_metrics(&[25.0; 12]);
        assert_eq!(tm.skewness, 0.0);
        assert_eq!(tm.kurtosis, 0.0);
    }

    #[test]
    fn alternating_outcomes_are_perfectly_stable() {
        // Every 10-trade window has exactly 5 winners
        let profits: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 50.0 } else { -40.0 }).collect();
        let tm = compute_tail_metrics(&profits);
        assert!((tm.win_rate_stability - 1.0).abs() < 1e-12);
    }

    #[test]
    fn clustered_outcomes_are_less_stable() {
        let mut profits = vec![50.0; 12];
        profits.extend(vec![-40.0; 12]);
        let tm = compute_tail_metrics(&profits);
        assert!(tm.win_rate_stability < 1.0);
    }

    #[test]
    fn stability_needs_twenty_trades() {
        let profits: Vec<f64> = (0..19).map(|i| if i % 2 == 0 { 50.0 } else { -40.0 }).collect();
        let tm = compute_tail_metrics(&profits);
        assert_eq!(tm.win_rate_stability, 0.0);
        assert!(tm.var_95 > 0.0);
    }

    #[test]
    fn all_losers_have_zero_stability() {
        let tm = compute_tail_metrics(&[-5.0; 25]);
        assert_eq!(tm.win_rate_stability, 0.0);
    }
}
