use serde::{Deserialize, Serialize};

/// How the raw lot size is derived before clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SizingMethod {
    FixedLot {
        lot_size: f64,
    },
    /// Risk `risk_percent` of balance over the stop distance.
    PercentRisk {
        risk_percent: f64,
        /// Used when the request carries no stop distance.
        #[serde(default = "default_stop_pips")]
        default_stop_pips: f64,
    },
    /// Risk `risk_percent` of equity over `atr × atr_multiplier`.
    AtrBased {
        risk_percent: f64,
        #[serde(default = "default_atr_multiplier")]
        atr_multiplier: f64,
        /// ATR (price units) used when the request has none.
        fallback_atr: Option<f64>,
    },
    /// `base_lot × normal_volatility / current volatility`. The engine
    /// reports volatility as ATR in pips.
    VolatilityBased {
        base_lot: f64,
        normal_volatility: f64,
    },
    /// `equity × equity_percent / 100 / contract_value`.
    AccountEquity {
        equity_percent: f64,
        #[serde(default = "default_contract_value")]
        contract_value: f64,
    },
    /// Fractional Kelly over recent trade profits.
    Kelly {
        #[serde(default = "default_kelly_fraction")]
        fraction: f64,
        /// Cap on the Kelly-scaled equity fraction.
        #[serde(default = "default_kelly_cap")]
        max_fraction: f64,
        #[serde(default = "default_kelly_contract")]
        contract_value: f64,
        #[serde(default = "default_kelly_history")]
        min_trades: usize,
    },
}

fn default_stop_pips() -> f64 {
    30.0
}

fn default_atr_multiplier() -> f64 {
    2.0
}

fn default_contract_value() -> f64 {
    100_000.0
}

fn default_kelly_fraction() -> f64 {
    0.25
}

fn default_kelly_cap() -> f64 {
    0.1
}

fn default_kelly_contract() -> f64 {
    10_000.0
}

fn default_kelly_history() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(flatten)]
    pub method: SizingMethod,
    #[serde(default = "default_min_size")]
    pub min_size: f64,
    #[serde(default = "default_max_size")]
    pub max_size: f64,
    /// Stop opening positions once today's realised loss reaches this amount.
    #[serde(default)]
    pub max_daily_loss: Option<f64>,
    #[serde(default)]
    pub max_open_positions: Option<usize>,
}

fn default_min_size() -> f64 {
    0.01
}

fn default_max_size() -> f64 {
    2.0
}

impl SizingConfig {
    pub fn new(method: SizingMethod) -> Self {
        Self {
            method,
            min_size: default_min_size(),
            max_size: default_max_size(),
            max_daily_loss: None,
            max_open_positions: None,
        }
    }

    pub fn fixed_lot(lot_size: f64) -> Self {
        Self::new(SizingMethod::FixedLot { lot_size })
    }

    pub fn percent_risk(risk_percent: f64) -> Self {
        Self::new(SizingMethod::PercentRisk {
            risk_percent,
            default_stop_pips: default_stop_pips(),
        })
    }

    pub fn with_bounds(mut self, min_size: f64, max_size: f64) -> Self {
        self.min_size = min_size;
        self.max_size = max_size;
        self
    }

    pub fn clamp(&self, size: f64) -> f64 {
        size.clamp(self.min_size, self.max_size)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_size > 0.0 && self.min_size.is_finite()) {
            return Err(format!("min_size must be positive, got {}", self.min_size));
        }
        if !(self.max_size >= self.min_size && self.max_size.is_finite()) {
            return Err(format!(
                "max_size {} must be at least min_size {}",
                self.max_size, self.min_size
            ));
        }
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(format!("{name} must be positive, got {v}"))
            }
        };
        match &self.method {
            SizingMethod::FixedLot { lot_size } => positive("lot_size", *lot_size),
            SizingMethod::PercentRisk { risk_percent, default_stop_pips } => {
                positive("risk_percent", *risk_percent)?;
                positive("default_stop_pips", *default_stop_pips)
            }
            SizingMethod::AtrBased { risk_percent, atr_multiplier, .. } => {
                positive("risk_percent", *risk_percent)?;
                positive("atr_multiplier", *atr_multiplier)
            }
            SizingMethod::VolatilityBased { base_lot, normal_volatility } => {
                positive("base_lot", *base_lot)?;
                positive("normal_volatility", *normal_volatility)
            }
            SizingMethod::AccountEquity { equity_percent, contract_value } => {
                positive("equity_percent", *equity_percent)?;
                positive("contract_value", *contract_value)
            }
            SizingMethod::Kelly { fraction, max_fraction, contract_value, .. } => {
                positive("fraction", *fraction)?;
                positive("max_fraction", *max_fraction)?;
                positive("contract_value", *contract_value)
            }
        }
    }
}
