//! Smart exit levels: stop and target computed at entry from ATR, swing
//! points or fixed pip distances.

use serde::{Deserialize, Serialize};

use super::ladder::LadderLevel;
use crate::domain::{Bar, Direction, SymbolSpec};
use crate::error::CalculatorError;
use crate::indicators::swing::{detect_swing_points, nearest_swing_high_above, nearest_swing_low_below};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopType {
    Atr,
    Swing,
    FixedPips,
    Trailing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    #[serde(rename = "type")]
    pub kind: StopType,
    pub atr_period: usize,
    pub atr_multiplier: f64,
    /// Distance for `fixed_pips` and `trailing`.
    pub pips: f64,
    /// Bars searched for swing points.
    pub swing_window: usize,
    /// Neighbours on each side used to score swing strength.
    pub swing_strength_lookback: usize,
    /// ATR fraction placed beyond the swing point.
    pub swing_buffer_atr: f64,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            kind: StopType::Atr,
            atr_period: 14,
            atr_multiplier: 2.0,
            pips: 25.0,
            swing_window: 50,
            swing_strength_lookback: 5,
            swing_buffer_atr: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeProfitType {
    RrRatio,
    Pips,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeProfitConfig {
    #[serde(rename = "type")]
    pub kind: TakeProfitType,
    pub rr_ratio: f64,
    pub pips: f64,
}

impl Default for TakeProfitConfig {
    fn default() -> Self {
        Self {
            kind: TakeProfitType::RrRatio,
            rr_ratio: 2.0,
            pips: 40.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartExitConfig {
    pub stop_loss: StopConfig,
    pub take_profit: TakeProfitConfig,
    pub partial_exits: Vec<LadderLevel>,
    pub max_holding_hours: Option<f64>,
}

/// Inputs for one exit calculation.
#[derive(Debug, Clone, Copy)]
pub struct ExitRequest<'a> {
    pub direction: Direction,
    pub entry_price: f64,
    /// Bars up to and including the entry bar.
    pub history: &'a [Bar],
    /// ATR at the entry bar.
    pub atr: f64,
    pub spec: &'a SymbolSpec,
    pub config: &'a SmartExitConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitLevel {
    pub price: f64,
    pub reason: String,
    /// 0–1.
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub stop_loss: ExitLevel,
    pub take_profit: ExitLevel,
    pub partial_exits: Vec<LadderLevel>,
    pub max_holding_hours: Option<f64>,
    /// Stop should trail price after entry.
    pub trailing: bool,
}

/// Computes initial stop/target for smart exits.
pub trait ExitCalculator: Send + Sync {
    fn calculate(&self, request: &ExitRequest<'_>) -> Result<ExitPlan, CalculatorError>;
}

/// Default calculator: ATR, swing, fixed-pip or trailing stop; target by
/// risk-reward ratio or pips.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtrSwingExitCalculator;

impl AtrSwingExitCalculator {
    fn atr_stop(&self, req: &ExitRequest<'_>) -> Result<(f64, ExitLevel), CalculatorError> {
        if !(req.atr.is_finite() && req.atr > 0.0) {
            return Err(CalculatorError::NonFinite("atr"));
        }
        let mult = req.config.stop_loss.atr_multiplier;
        Ok((
            req.atr * mult,
            ExitLevel {
                price: 0.0,
                reason: format!("ATR x{mult}"),
                confidence: 0.7,
            },
        ))
    }

    fn swing_stop(&self, req: &ExitRequest<'_>) -> Result<(f64, ExitLevel), CalculatorError> {
        let cfg = &req.config.stop_loss;
        let start = req.history.len().saturating_sub(cfg.swing_window);
        let window = &req.history[start..];
        let points = detect_swing_points(window, cfg.swing_strength_lookback);
        let buffer = req.atr.max(0.0) * cfg.swing_buffer_atr;

        let swing = match req.direction {
            Direction::Long => nearest_swing_low_below(&points, req.entry_price),
            Direction::Short => nearest_swing_high_above(&points, req.entry_price),
        };

        match swing {
            Some(point) => {
                let distance = (req.entry_price - point.price).abs() + buffer;
                Ok((
                    distance,
                    ExitLevel {
                        price: 0.0,
                        reason: format!("swing {:?} (strength {})", point.kind, point.strength),
                        confidence: 0.5 + 0.1 * f64::from(point.strength),
                    },
                ))
            }
            None => {
                let (distance, mut level) = self.atr_stop(req)?;
                level.reason = format!("no swing point; {}", level.reason);
                level.confidence = 0.6;
                Ok((distance, level))
            }
        }
    }
}

impl ExitCalculator for AtrSwingExitCalculator {
    fn calculate(&self, req: &ExitRequest<'_>) -> Result<ExitPlan, CalculatorError> {
        if !(req.entry_price.is_finite() && req.entry_price > 0.0) {
            return Err(CalculatorError::InvalidInput(format!(
                "entry price {}",
                req.entry_price
            )));
        }
        let cfg = req.config;

        let (distance, mut stop) = match cfg.stop_loss.kind {
            StopType::Atr => self.atr_stop(req)?,
            StopType::Swing => self.swing_stop(req)?,
            StopType::FixedPips => (
                req.spec.pips_to_price(cfg.stop_loss.pips),
                ExitLevel {
                    price: 0.0,
                    reason: format!("{} pips", cfg.stop_loss.pips),
                    confidence: 1.0,
                },
            ),
            StopType::Trailing => (
                req.spec.pips_to_price(cfg.stop_loss.pips),
                ExitLevel {
                    price: 0.0,
                    reason: format!("trailing {} pips", cfg.stop_loss.pips),
                    confidence: 0.8,
                },
            ),
        };
        if !(distance.is_finite() && distance > 0.0) {
            return Err(CalculatorError::NonFinite("stop distance"));
        }
        stop.price = req.spec.round_price(req.direction.adverse(req.entry_price, distance));

        let risk = (req.entry_price - stop.price).abs();
        let (target_distance, target_reason) = match cfg.take_profit.kind {
            TakeProfitType::RrRatio => (
                risk * cfg.take_profit.rr_ratio,
                format!("{}R", cfg.take_profit.rr_ratio),
            ),
            TakeProfitType::Pips => (
                req.spec.pips_to_price(cfg.take_profit.pips),
                format!("{} pips", cfg.take_profit.pips),
            ),
        };
        let take_profit = ExitLevel {
            price: req
                .spec
                .round_price(req.direction.favourable(req.entry_price, target_distance)),
            reason: target_reason,
            confidence: stop.confidence,
        };

        Ok(ExitPlan {
            stop_loss: stop,
            take_profit,
            partial_exits: cfg.partial_exits.clone(),
            max_holding_hours: cfg.max_holding_hours,
            trailing: cfg.stop_loss.kind == StopType::Trailing,
        })
    }
}
