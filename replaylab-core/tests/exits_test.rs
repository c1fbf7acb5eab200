//! Exit policy tests driven through the full bar loop.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use replaylab_core::domain::{Bar, CloseReason, SymbolSpec, SymbolTable, Timeframe};
use replaylab_core::engine::{BacktestEngine, EngineConfig};
use replaylab_core::error::CalculatorError;
use replaylab_core::exits::{
    EnhancedPartialConfig, ExitCalculator, ExitConfig, ExitLevel, ExitMode, ExitPlan, ExitRequest,
    LadderLevel, PartialLevelConfig, SmartExitConfig, Trigger,
};
use replaylab_core::rules::{Action, Condition, Operator, Rule, Strategy};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn bars(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            symbol: "TEST".into(),
            interval: Timeframe::H1,
            timestamp: base_time() + chrono::Duration::hours(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        })
        .collect()
}

fn symbols() -> Arc<SymbolTable> {
    let mut table = SymbolTable::new();
    table.insert(SymbolSpec::new("TEST", 0.01, 1.0).with_digits(2));
    table.into_shared()
}

/// Enters once, on the first bar only.
fn enter_first_bar() -> Strategy {
    Strategy::new(
        "first-bar",
        "TEST",
        Timeframe::H1,
        vec![Rule::new(Action::Buy, vec![Condition::value("price", Operator::Lt, 100.1)])],
    )
}

/// Stop 1.0 below entry, target 5R, and a two-rung ladder.
struct LadderPlan {
    levels: Vec<LadderLevel>,
}

impl ExitCalculator for LadderPlan {
    fn calculate(&self, request: &ExitRequest<'_>) -> Result<ExitPlan, CalculatorError> {
        let level = |price: f64, reason: &str| ExitLevel {
            price,
            reason: reason.into(),
            confidence: 1.0,
        };
        Ok(ExitPlan {
            stop_loss: level(request.entry_price - 1.0, "test stop"),
            take_profit: level(request.entry_price + 5.0, "test target"),
            partial_exits: self.levels.clone(),
            max_holding_hours: None,
            trailing: false,
        })
    }
}

fn ladder_engine() -> BacktestEngine {
    let config = EngineConfig::default()
        .with_exit(ExitConfig::default().with_mode(ExitMode::Smart(SmartExitConfig::default())));
    BacktestEngine::new(symbols(), config).with_exit_calculator(Arc::new(LadderPlan {
        levels: vec![LadderLevel::new(1.0, 50.0), LadderLevel::new(2.0, 50.0)],
    }))
}

#[test]
fn ladder_closes_half_at_1r_and_half_at_2r() {
    let result = ladder_engine()
        .run(&enter_first_bar(), &bars(&[100.0, 101.2, 100.5, 101.5, 102.3, 101.0]))
        .unwrap();

    assert_eq!(result.trades.len(), 2);
    assert!(result.trades.iter().all(|t| t.close_reason == CloseReason::PartialExit));
    let total: f64 = result.trades.iter().map(|t| t.size).sum();
    assert!((total - 1.0).abs() < 1e-12);
    assert_eq!(result.trades[0].exit_price, 101.0);
    assert_eq!(result.trades[0].exit_bar, 1);
    assert_eq!(result.trades[1].exit_price, 102.0);
    assert_eq!(result.trades[1].exit_bar, 4);
}

#[test]
fn revisiting_1r_does_not_fire_again() {
    let result = ladder_engine()
        .run(&enter_first_bar(), &bars(&[100.0, 101.2, 100.5, 101.5, 100.4, 101.1]))
        .unwrap();

    let partials: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.close_reason == CloseReason::PartialExit)
        .collect();
    assert_eq!(partials.len(), 1);
    assert_eq!(partials[0].size, 0.5);
    // the other half is closed by the end of data
    let last = result.trades.last().unwrap();
    assert_eq!(last.close_reason, CloseReason::EndOfData);
    assert_eq!(last.size, 0.5);
}

#[test]
fn enhanced_partial_closes_share_of_remaining_size() {
    let level = |id: &str, rr: f64| PartialLevelConfig {
        id: id.into(),
        priority: 1,
        percent: 50.0,
        trigger: Trigger::RiskReward { value: rr },
        sessions: Vec::new(),
    };
    let exit = ExitConfig::fixed(0.02, 0.04).with_mode(ExitMode::EnhancedPartial(EnhancedPartialConfig {
        levels: vec![level("tp1", 1.0), level("tp2", 2.0)],
        cooldown_minutes: 0.0,
    }));
    let engine = BacktestEngine::new(symbols(), EngineConfig::default().with_exit(exit));
    // entry 100, stop 98 (1R = 2.0), target 104
    let result = engine
        .run(&enter_first_bar(), &bars(&[100.0, 102.5, 103.0, 104.5]))
        .unwrap();

    let sizes: Vec<f64> = result.trades.iter().map(|t| t.size).collect();
    assert_eq!(sizes, vec![0.5, 0.25, 0.25]);
    let reasons: Vec<CloseReason> = result.trades.iter().map(|t| t.close_reason).collect();
    assert_eq!(
        reasons,
        vec![CloseReason::PartialExit, CloseReason::PartialExit, CloseReason::TakeProfit]
    );
    assert_eq!(result.trades[0].exit_price, 102.5);
    assert_eq!(result.trades[2].exit_price, 104.0);
}

fn cooldown_engine(cooldown_minutes: f64) -> BacktestEngine {
    let level = |id: &str, rr: f64| PartialLevelConfig {
        id: id.into(),
        priority: 1,
        percent: 50.0,
        trigger: Trigger::RiskReward { value: rr },
        sessions: Vec::new(),
    };
    let exit = ExitConfig::fixed(0.02, 0.04).with_mode(ExitMode::EnhancedPartial(EnhancedPartialConfig {
        levels: vec![level("tp1", 0.5), level("tp2", 1.0)],
        cooldown_minutes,
    }));
    BacktestEngine::new(symbols(), EngineConfig::default().with_exit(exit))
}

#[test]
fn partial_exit_waits_out_the_cooldown() {
    // entry 100, 1R = 2.0: tp1 at 101, tp2 at 102; both armed by bar 2
    let closes = [100.0, 101.2, 102.5, 102.6, 102.7];

    let eager = cooldown_engine(0.0).run(&enter_first_bar(), &bars(&closes)).unwrap();
    let eager_bars: Vec<usize> = eager
        .trades
        .iter()
        .filter(|t| t.close_reason == CloseReason::PartialExit)
        .map(|t| t.exit_bar)
        .collect();
    assert_eq!(eager_bars, vec![1, 2]);

    let result = cooldown_engine(90.0).run(&enter_first_bar(), &bars(&closes)).unwrap();
    let partials: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.close_reason == CloseReason::PartialExit)
        .collect();
    // 60 minutes after tp1 is inside the cooldown, 120 is not
    assert_eq!(partials.len(), 2);
    assert_eq!(partials[0].exit_bar, 1);
    assert_eq!(partials[1].exit_bar, 3);
    assert_eq!(partials[1].exit_price, 102.6);
    assert_eq!(partials[1].size, 0.25);
    let last = result.trades.last().unwrap();
    assert_eq!(last.close_reason, CloseReason::EndOfData);
    assert_eq!(last.size, 0.25);
}
