//! Bar-by-bar event loop.
//!
//! Three phases per primary bar:
//! 1. Exits: every open position's exit policy, then exit rules
//! 2. Entries: entry rules (plus MTF confirmation), at most one new position
//! 3. Post-bar: equity sample at the close
//!
//! When the stream runs out, or the cancellation flag is raised, whatever
//! is still open is closed at the last processed close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{first_unordered, Bar, CloseReason, Direction, EquityPoint, SymbolSpec, SymbolTable, Timeframe};
use crate::error::EngineError;
use crate::exits::{
    plan_entry, AtrSwingExitCalculator, BarContext, EntryContext, EntryPlan, ExitCalculator, ExitMode,
    PartialExitManager, TriggerLadderManager,
};
use crate::indicators::IndicatorValues;
use crate::market::{RegimeReading, TradingSession};
use crate::mtf::{MtfConfirmationEngine, PrimarySignal};
use crate::rules::{first_entry, first_exit, RuleGate, Strategy};
use crate::sizers::{DynamicSizer, SizingCalculator, SizingRequest};

use super::position_manager::PositionManager;
use super::precompute::{entry_atr_name, precompute_indicators, BAR_ATR};
use super::state::{EngineConfig, RunResult};

/// Replays one strategy over one symbol's bars.
///
/// The engine holds no per-run state; one instance can run many strategies,
/// and clones share the symbol table and collaborators.
#[derive(Clone)]
pub struct BacktestEngine {
    symbols: Arc<SymbolTable>,
    config: EngineConfig,
    calculator: Arc<dyn ExitCalculator>,
    partial_manager: Arc<dyn PartialExitManager>,
    sizer: Option<Arc<dyn SizingCalculator>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl BacktestEngine {
    /// Engine with the default collaborators for `config`: the ATR/swing
    /// exit calculator, a trigger-ladder partial manager built from the
    /// enhanced-partial levels, and a [`DynamicSizer`] when sizing is set.
    pub fn new(symbols: Arc<SymbolTable>, config: EngineConfig) -> Self {
        let levels = match &config.exit.mode {
            ExitMode::EnhancedPartial(partial) => partial.levels.clone(),
            _ => Vec::new(),
        };
        let sizer = config
            .sizing
            .clone()
            .map(|sizing| Arc::new(DynamicSizer::new(sizing)) as Arc<dyn SizingCalculator>);
        Self {
            symbols,
            config,
            calculator: Arc::new(AtrSwingExitCalculator),
            partial_manager: Arc::new(TriggerLadderManager::new(levels)),
            sizer,
            cancel: None,
        }
    }

    pub fn with_exit_calculator(mut self, calculator: Arc<dyn ExitCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_partial_manager(mut self, manager: Arc<dyn PartialExitManager>) -> Self {
        self.partial_manager = manager;
        self
    }

    pub fn with_sizer(mut self, sizer: Arc<dyn SizingCalculator>) -> Self {
        self.sizer = Some(sizer);
        self
    }

    /// Checked between bars; once set the run stops and reports `cancelled`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run(&self, strategy: &Strategy, bars: &[Bar]) -> Result<RunResult, EngineError> {
        self.run_with_confirmations(strategy, bars, &HashMap::new())
    }

    /// Run with bars for the strategy's MTF confirmation timeframes.
    pub fn run_with_confirmations(
        &self,
        strategy: &Strategy,
        bars: &[Bar],
        confirmations: &HashMap<Timeframe, Vec<Bar>>,
    ) -> Result<RunResult, EngineError> {
        if bars.is_empty() {
            return Err(EngineError::NoData);
        }
        if let Some(index) = first_unordered(bars) {
            return Err(EngineError::UnorderedBars { index });
        }
        let spec = self
            .symbols
            .get(&strategy.symbol)
            .cloned()
            .ok_or_else(|| EngineError::UnknownSymbol(strategy.symbol.clone()))?;
        if !spec.is_valid() {
            return Err(EngineError::InvalidConfig(format!(
                "symbol spec for {} has non-positive pip settings",
                spec.symbol
            )));
        }
        strategy.validate()?;
        self.config.validate()?;

        let values = precompute_indicators(bars, strategy, &self.config.exit, &spec)?;
        let mtf = strategy
            .mtf
            .as_ref()
            .map(|cfg| MtfConfirmationEngine::new(cfg.clone(), confirmations, &spec))
            .transpose()?;

        info!(
            strategy = %strategy.id,
            symbol = %spec.symbol,
            timeframe = %strategy.timeframe,
            bars = bars.len(),
            "backtest started"
        );

        let run = Run {
            engine: self,
            strategy,
            bars,
            spec: &spec,
            values: &values,
            mtf: mtf.as_ref(),
            entry_atr: entry_atr_name(&self.config.exit),
        };
        let result = run.replay();

        info!(
            strategy = %strategy.id,
            trades = result.trades.len(),
            final_balance = result.final_balance,
            cancelled = result.cancelled,
            "backtest finished"
        );
        Ok(result)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Borrowed inputs of one validated run.
struct Run<'a> {
    engine: &'a BacktestEngine,
    strategy: &'a Strategy,
    bars: &'a [Bar],
    spec: &'a SymbolSpec,
    values: &'a IndicatorValues,
    mtf: Option<&'a MtfConfirmationEngine>,
    entry_atr: String,
}

impl Run<'_> {
    fn replay(&self) -> RunResult {
        let config = &self.engine.config;
        let mut pm = PositionManager::new(self.spec.clone(), config.initial_balance);
        let mut equity_curve = Vec::with_capacity(self.bars.len());
        let mut cancelled = false;
        let mut mtf_rejections = 0;
        let mut sizing_blocked = 0;
        let mut ruined = false;
        let track_regime = matches!(config.exit.mode, ExitMode::EnhancedPartial(_));

        for (i, bar) in self.bars.iter().enumerate() {
            if self.engine.is_cancelled() {
                warn!(strategy = %self.strategy.id, bar = i, "backtest cancelled");
                cancelled = true;
                break;
            }

            // ─── Phase 1: exits ───
            let regime = if track_regime {
                config.regime.detect(self.values, i)
            } else {
                RegimeReading::UNKNOWN
            };
            let ctx = BarContext {
                bar,
                atr: self.atr(BAR_ATR, i),
                regime,
                session: TradingSession::at(bar.timestamp),
                spec: self.spec,
            };
            pm.apply_exit_policy(i, &ctx, &config.exit, self.engine.partial_manager.as_ref());

            let mut exit_fired = false;
            if RuleGate::for_bar(pm.open_count(), config.max_positions, false).exits {
                if let Some(rule) = first_exit(self.strategy, self.values, i) {
                    debug!(bar = i, rule = rule.rule_index, "exit rule fired");
                    pm.close_all(i, bar, bar.close, CloseReason::ExitSignal);
                    exit_fired = true;
                }
            }

            // ─── Phase 2: entries ───
            if pm.balance() <= 0.0 {
                if !ruined {
                    warn!(strategy = %self.strategy.id, bar = i, balance = pm.balance(), "account depleted, no further entries");
                    ruined = true;
                }
            } else if RuleGate::for_bar(pm.open_count(), config.max_positions, exit_fired).entries {
                if let Some(direction) = self.entry_signal(i, bar, &mut mtf_rejections) {
                    if !self.open_position(&mut pm, direction, i, bar) {
                        sizing_blocked += 1;
                    }
                }
            }

            // ─── Phase 3: post-bar ───
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                balance: pm.balance(),
                equity: pm.equity(bar.close),
            });
        }

        let processed = equity_curve.len();
        if let Some(last) = processed.checked_sub(1) {
            let bar = &self.bars[last];
            if pm.open_count() > 0 {
                pm.close_all(last, bar, bar.close, CloseReason::EndOfData);
            }
        }

        RunResult {
            initial_balance: config.initial_balance,
            final_balance: pm.balance(),
            trades: pm.into_trades(),
            equity_curve,
            bars_processed: processed,
            cancelled,
            mtf_rejections,
            sizing_blocked,
        }
    }

    fn atr(&self, name: &str, index: usize) -> f64 {
        self.values
            .get(name, index)
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or_else(|| self.spec.default_atr())
    }

    /// Direction of the first firing entry rule, after MTF confirmation.
    fn entry_signal(&self, index: usize, bar: &Bar, rejections: &mut usize) -> Option<Direction> {
        let rule = first_entry(self.strategy, self.values, index)?;
        let direction = rule.action.direction();
        let Some(mtf) = self.mtf else {
            return direction;
        };

        let decision = mtf.confirm(&PrimarySignal {
            fired: true,
            direction,
            values: self.values,
            index,
            timestamp: bar.timestamp,
        });
        if !decision.signal {
            *rejections += 1;
            debug!(bar = index, confidence = decision.confidence, "entry not confirmed on higher timeframes");
            return None;
        }
        decision.direction
    }

    /// Returns false when the sizer blocked the entry.
    fn open_position(&self, pm: &mut PositionManager, direction: Direction, index: usize, bar: &Bar) -> bool {
        let atr = self.atr(&self.entry_atr, index);
        let plan = plan_entry(
            &self.engine.config.exit,
            self.engine.calculator.as_ref(),
            &EntryContext {
                direction,
                entry_price: bar.close,
                history: &self.bars[..=index],
                atr,
                spec: self.spec,
            },
        );

        let size = self.size_for(pm, direction, &plan, index, bar);
        if !(size > 0.0) {
            return false;
        }
        pm.open(direction, size, index, bar, plan);
        true
    }

    fn size_for(&self, pm: &PositionManager, direction: Direction, plan: &EntryPlan, index: usize, bar: &Bar) -> f64 {
        let fallback = self.engine.config.position_size;
        let Some(sizer) = &self.engine.sizer else {
            return fallback;
        };

        let atr = self.atr(BAR_ATR, index);
        let profits: Vec<f64> = pm.trades().iter().map(|t| t.profit).collect();
        let request = SizingRequest {
            balance: pm.balance(),
            equity: pm.equity(bar.close),
            direction,
            entry_price: bar.close,
            stop_loss_pips: Some(self.spec.price_to_pips((bar.close - plan.stop_loss).abs())),
            atr: Some(atr),
            volatility: Some(self.spec.price_to_pips(atr)),
            open_positions: pm.open_count(),
            daily_pnl: pm.realised_since(start_of_day(bar.timestamp)),
            recent_profits: &profits,
            spec: self.spec,
        };
        match sizer.calculate(&request) {
            Ok(decision) => {
                for warning in &decision.warnings {
                    debug!(bar = index, sizer = sizer.name(), %warning, "sizing");
                }
                decision.size
            }
            Err(err) => {
                warn!(bar = index, sizer = sizer.name(), error = %err, "sizing failed, using configured position size");
                fallback
            }
        }
    }
}

fn start_of_day(time: DateTime<Utc>) -> DateTime<Utc> {
    time.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exits::ExitConfig;
    use crate::indicators::make_bars;
    use crate::rules::{Action, Condition, Operator, Rule};
    use crate::sizers::SizingConfig;
    use chrono::TimeZone;

    fn table() -> Arc<SymbolTable> {
        let mut table = SymbolTable::new();
        table.insert(SymbolSpec::new("TEST", 0.01, 1.0).with_digits(2));
        table.into_shared()
    }

    fn buy_above(level: f64) -> Strategy {
        Strategy::new(
            format!("buy-above-{level}"),
            "TEST",
            Timeframe::H1,
            vec![Rule::new(Action::Buy, vec![Condition::value("price", Operator::Gt, level)])],
        )
    }

    #[test]
    fn empty_bars_is_no_data() {
        let engine = BacktestEngine::new(table(), EngineConfig::default());
        assert!(matches!(engine.run(&buy_above(0.0), &[]), Err(EngineError::NoData)));
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let engine = BacktestEngine::new(table(), EngineConfig::default());
        let mut strategy = buy_above(0.0);
        strategy.symbol = "NOPE".into();
        let err = engine.run(&strategy, &make_bars(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(err, EngineError::UnknownSymbol(s) if s == "NOPE"));
    }

    #[test]
    fn unordered_bars_are_rejected() {
        let engine = BacktestEngine::new(table(), EngineConfig::default());
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        bars[2].timestamp = bars[0].timestamp;
        let err = engine.run(&buy_above(0.0), &bars).unwrap_err();
        assert!(matches!(err, EngineError::UnorderedBars { index: 2 }));
    }

    #[test]
    fn open_position_is_closed_at_end_of_data() {
        let engine = BacktestEngine::new(table(), EngineConfig::default());
        let result = engine.run(&buy_above(100.0), &make_bars(&[100.0, 101.0, 101.5])).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.close_reason, CloseReason::EndOfData);
        assert_eq!(trade.entry_price, 101.0);
        assert_eq!(trade.exit_price, 101.5);
        // 50 pips * 1 lot * 1.0
        assert!((result.final_balance - 10_050.0).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 3);
    }

    #[test]
    fn exit_rule_closes_and_blocks_same_bar_entry() {
        let strategy = Strategy::new(
            "in-out",
            "TEST",
            Timeframe::H1,
            vec![
                Rule::new(Action::Buy, vec![Condition::value("price", Operator::Gt, 0.0)]),
                Rule::new(Action::Close, vec![Condition::value("price", Operator::Gt, 101.5)]),
            ],
        );
        let engine = BacktestEngine::new(table(), EngineConfig::default());
        let result = engine.run(&strategy, &make_bars(&[100.0, 101.0, 102.0, 101.0])).unwrap();

        // entry bar 0, exit signal bar 2, no entry on bar 2, re-entry bar 3
        assert_eq!(result.trades[0].close_reason, CloseReason::ExitSignal);
        assert_eq!(result.trades[0].exit_bar, 2);
        assert_eq!(result.trades[1].entry_bar, 3);
        assert_eq!(result.trades[1].close_reason, CloseReason::EndOfData);
    }

    #[test]
    fn max_positions_allows_pyramiding() {
        let config = EngineConfig::default()
            .with_max_positions(3)
            .with_exit(ExitConfig::fixed(0.5, 0.5));
        let engine = BacktestEngine::new(table(), config);
        let result = engine.run(&buy_above(0.0), &make_bars(&[100.0, 100.5, 101.0, 101.5, 102.0])).unwrap();
        let entries: Vec<usize> = result.trades.iter().map(|t| t.entry_bar).collect();
        assert_eq!(entries, vec![0, 1, 2]);
    }

    #[test]
    fn depleted_account_takes_no_new_entries() {
        let engine = BacktestEngine::new(table(), EngineConfig::default().with_position_size(100.0));
        let result = engine.run(&buy_above(99.0), &make_bars(&[100.0, 100.0, 70.0])).unwrap();

        // stop at 98: 200 pips * 100 lots
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].close_reason, CloseReason::StopLoss);
        assert!((result.final_balance + 10_000.0).abs() < 1e-9);
        assert_eq!(result.equity_curve.len(), 3);
    }

    #[test]
    fn cancelled_flag_stops_before_first_bar() {
        let flag = Arc::new(AtomicBool::new(true));
        let engine = BacktestEngine::new(table(), EngineConfig::default()).with_cancel_flag(flag);
        let result = engine.run(&buy_above(0.0), &make_bars(&[100.0, 101.0])).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.bars_processed, 0);
        assert!(result.trades.is_empty());
        assert_eq!(result.final_balance, result.initial_balance);
    }

    #[test]
    fn sizer_decides_lot_size() {
        let config = EngineConfig::default().with_sizing(SizingConfig::fixed_lot(0.5));
        let engine = BacktestEngine::new(table(), config);
        let result = engine.run(&buy_above(0.0), &make_bars(&[100.0, 101.0])).unwrap();
        assert_eq!(result.trades[0].size, 0.5);
    }

    #[test]
    fn blocked_sizing_skips_entry() {
        let mut sizing = SizingConfig::fixed_lot(0.5);
        sizing.max_open_positions = Some(0);
        let engine = BacktestEngine::new(table(), EngineConfig::default().with_sizing(sizing));
        let result = engine.run(&buy_above(0.0), &make_bars(&[100.0, 101.0])).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.sizing_blocked, 2);
    }

    #[test]
    fn start_of_day_truncates_to_midnight() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 17, 45, 0).unwrap();
        assert_eq!(start_of_day(t), Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
    }
}
