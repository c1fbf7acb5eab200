//! Configurable sizer covering every [`SizingMethod`].

use super::config::{SizingConfig, SizingMethod};
use super::{SizingCalculator, SizingDecision, SizingRequest};
use crate::error::CalculatorError;

/// Sizer driven by a [`SizingConfig`].
///
/// The raw size from the configured method is clamped to
/// `[min_size, max_size]`. The daily-loss and open-position limits are
/// checked first and block the entry with a warning instead of failing.
#[derive(Debug, Clone)]
pub struct DynamicSizer {
    config: SizingConfig,
}

impl DynamicSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    fn limit_warning(&self, req: &SizingRequest<'_>) -> Option<String> {
        if let Some(max_open) = self.config.max_open_positions {
            if req.open_positions >= max_open {
                return Some(format!(
                    "max open positions reached ({}/{max_open})",
                    req.open_positions
                ));
            }
        }
        if let Some(max_loss) = self.config.max_daily_loss {
            if -req.daily_pnl >= max_loss {
                return Some(format!(
                    "daily loss limit reached ({:.2} >= {max_loss:.2})",
                    -req.daily_pnl
                ));
            }
        }
        None
    }

    /// Lots from risking `amount` over `stop_pips`.
    fn lots_for_risk(amount: f64, stop_pips: f64, req: &SizingRequest<'_>) -> Result<f64, CalculatorError> {
        if !(stop_pips > 0.0 && stop_pips.is_finite()) {
            return Err(CalculatorError::InvalidInput(format!("stop distance {stop_pips} pips")));
        }
        Ok(amount / (stop_pips * req.spec.pip_value_factor))
    }

    /// Unclamped size plus the stop distance (pips) it was sized against.
    fn raw_size(&self, req: &SizingRequest<'_>) -> Result<(f64, Option<f64>), CalculatorError> {
        match &self.config.method {
            SizingMethod::FixedLot { lot_size } => Ok((*lot_size, req.stop_loss_pips)),
            SizingMethod::PercentRisk { risk_percent, default_stop_pips } => {
                let stop_pips = req.stop_loss_pips.unwrap_or(*default_stop_pips);
                let amount = req.balance * risk_percent / 100.0;
                Ok((Self::lots_for_risk(amount, stop_pips, req)?, Some(stop_pips)))
            }
            SizingMethod::AtrBased { risk_percent, atr_multiplier, fallback_atr } => {
                let atr = req
                    .atr
                    .filter(|a| a.is_finite() && *a > 0.0)
                    .or(*fallback_atr)
                    .unwrap_or_else(|| req.spec.default_atr());
                let stop_pips = req.spec.price_to_pips(atr * atr_multiplier);
                let amount = req.equity * risk_percent / 100.0;
                Ok((Self::lots_for_risk(amount, stop_pips, req)?, Some(stop_pips)))
            }
            SizingMethod::VolatilityBased { base_lot, normal_volatility } => {
                let current = req.volatility.filter(|v| *v > 0.0 && v.is_finite()).unwrap_or(*normal_volatility);
                Ok((base_lot * normal_volatility / current, req.stop_loss_pips))
            }
            SizingMethod::AccountEquity { equity_percent, contract_value } => Ok((
                req.equity * equity_percent / 100.0 / contract_value,
                req.stop_loss_pips,
            )),
            SizingMethod::Kelly { fraction, max_fraction, contract_value, min_trades } => {
                let size = match kelly_fraction(req.recent_profits, *min_trades) {
                    Some(k) => req.equity * (k * fraction).clamp(0.0, *max_fraction) / contract_value,
                    None => self.config.min_size,
                };
                Ok((size, req.stop_loss_pips))
            }
        }
    }
}

/// Full Kelly fraction `(p·b − q) / b` over `profits`.
///
/// `None` with fewer than `min_trades` profits or without both wins and
/// losses.
pub fn kelly_fraction(profits: &[f64], min_trades: usize) -> Option<f64> {
    if profits.len() < min_trades || profits.is_empty() {
        return None;
    }
    let wins: Vec<f64> = profits.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = profits.iter().copied().filter(|p| *p < 0.0).collect();
    if wins.is_empty() || losses.is_empty() {
        return None;
    }
    let p = wins.len() as f64 / profits.len() as f64;
    let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
    let avg_loss = losses.iter().sum::<f64>().abs() / losses.len() as f64;
    let b = avg_win / avg_loss;
    Some((p * b - (1.0 - p)) / b)
}

impl SizingCalculator for DynamicSizer {
    fn calculate(&self, req: &SizingRequest<'_>) -> Result<SizingDecision, CalculatorError> {
        if !(req.balance.is_finite() && req.equity.is_finite()) {
            return Err(CalculatorError::NonFinite("account balance"));
        }
        if let Some(warning) = self.limit_warning(req) {
            return Ok(SizingDecision::blocked(warning));
        }
        if req.equity <= 0.0 {
            return Ok(SizingDecision::blocked("account equity is not positive"));
        }

        let (raw, stop_pips) = self.raw_size(req)?;
        if !raw.is_finite() {
            return Err(CalculatorError::NonFinite("position size"));
        }

        let mut warnings = Vec::new();
        let size = self.config.clamp(raw);
        if size != raw {
            warnings.push(format!("size {raw:.4} clamped to {size:.2}"));
        }

        let risk_amount = stop_pips.map_or(0.0, |pips| size * pips * req.spec.pip_value_factor);
        let risk_percent = if req.balance > 0.0 {
            risk_amount / req.balance * 100.0
        } else {
            0.0
        };

        Ok(SizingDecision {
            size,
            risk_amount,
            risk_percent,
            warnings,
        })
    }

    fn name(&self) -> &str {
        match self.config.method {
            SizingMethod::FixedLot { .. } => "fixed_lot",
            SizingMethod::PercentRisk { .. } => "percent_risk",
            SizingMethod::AtrBased { .. } => "atr_based",
            SizingMethod::VolatilityBased { .. } => "volatility_based",
            SizingMethod::AccountEquity { .. } => "account_equity",
            SizingMethod::Kelly { .. } => "kelly",
        }
    }
}
