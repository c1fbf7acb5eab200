//! Position sizing simulator: halting, Kelly warmup, file inputs and
//! drawdown properties.

use std::sync::Arc;

use proptest::prelude::*;
use replaylab_core::domain::{Direction, SymbolSpec};
use replaylab_core::sizers::{DynamicSizer, SizingConfig, SizingMethod};
use replaylab_runner::config::{load_sizing_config, load_trades};
use replaylab_runner::sizing_sim::{PositionSizingSimulator, SimulatedTrade, SimulationConfig};

fn eurusd() -> SymbolSpec {
    SymbolSpec::new("EURUSD", 0.0001, 10.0)
}

fn trade(pips: f64) -> SimulatedTrade {
    SimulatedTrade {
        entry_price: 1.1000,
        exit_price: 1.1000 + pips * 0.0001,
        direction: Direction::Long,
        pip_movement: pips,
        stop_loss_pips: Some(30.0),
        atr: None,
        volatility: None,
        holding_hours: 2.0,
    }
}

fn simulator(sizing: SizingConfig, config: SimulationConfig) -> PositionSizingSimulator {
    PositionSizingSimulator::new(Arc::new(DynamicSizer::new(sizing)), eurusd(), config)
}

#[test]
fn halts_once_drawdown_limit_is_breached() {
    let mut pips = vec![50.0, -30.0, -30.0, -30.0, -30.0];
    pips.extend(vec![10.0; 15]);
    let trades: Vec<SimulatedTrade> = pips.into_iter().map(trade).collect();
    let config = SimulationConfig {
        max_drawdown_limit: Some(10.0),
        ..SimulationConfig::default()
    };

    let results = simulator(SizingConfig::fixed_lot(1.0), config).run(&trades).unwrap();

    // 10_500 peak, then 9_300 after the fourth loss: 11.4%
    assert!(results.halted);
    assert_eq!(results.trades.len(), 5);
    assert!(results.trades.len() < trades.len());
    assert!(results.final_drawdown() >= 10.0);
    assert!(results.metrics.max_drawdown >= 10.0);
    assert!((results.final_balance - 9_300.0).abs() < 1e-9);
}

#[test]
fn no_limit_replays_everything() {
    let trades: Vec<SimulatedTrade> = [-30.0, -30.0, -30.0, 40.0].into_iter().map(trade).collect();
    let results = simulator(SizingConfig::fixed_lot(1.0), SimulationConfig::default())
        .run(&trades)
        .unwrap();
    assert!(!results.halted);
    assert_eq!(results.trades.len(), 4);
    assert_eq!(results.equity_curve.len(), 5);
}

#[test]
fn loss_beyond_the_balance_caps_drawdown_at_total_loss() {
    let results = simulator(SizingConfig::fixed_lot(1.0), SimulationConfig::default())
        .run(&[trade(-2_000.0)])
        .unwrap();

    // 2000 pips × 1 lot × 10 = 20_000 on a 10_000 account
    assert!((results.final_balance + 10_000.0).abs() < 1e-9);
    assert_eq!(results.metrics.max_drawdown, 100.0);
    assert_eq!(results.trades[0].drawdown, 100.0);
    assert_eq!(results.final_drawdown(), 100.0);
}

#[test]
fn kelly_uses_minimum_size_until_twenty_trades() {
    let pattern = [30.0, 30.0, -10.0, 30.0, -10.0];
    let trades: Vec<SimulatedTrade> = pattern.iter().cycle().take(25).map(|p| trade(*p)).collect();
    let sizing = SizingConfig::new(SizingMethod::Kelly {
        fraction: 0.25,
        max_fraction: 0.1,
        contract_value: 10_000.0,
        min_trades: 20,
    });

    let results = simulator(sizing, SimulationConfig::default()).run(&trades).unwrap();

    assert!(results.trades[..20].iter().all(|t| (t.size - 0.01).abs() < 1e-12));
    // p = 0.6, b = 3: full Kelly 0.47, quarter Kelly capped at 10% of equity
    assert!(results.trades[20].size > 0.09, "size {}", results.trades[20].size);
    assert!(results.max_size > results.min_size);
}

#[test]
fn files_drive_a_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("sizing.toml");
    std::fs::write(
        &config_path,
        r#"
symbol = "EURUSD"

[simulation]
initial_balance = 10000.0
commission_per_lot = 7.0
spread_pips = 1.0
max_drawdown_limit = 30.0

[sizing]
method = "percent_risk"
risk_percent = 1.0
"#,
    )
    .unwrap();
    let trades_path = dir.path().join("trades.json");
    std::fs::write(
        &trades_path,
        r#"[
            {"entry_price": 1.1000, "exit_price": 1.1040, "direction": "long", "pip_movement": 40.0, "stop_loss_pips": 20.0},
            {"entry_price": 1.1040, "exit_price": 1.1060, "direction": "short", "pip_movement": -20.0, "stop_loss_pips": 20.0, "holding_hours": 5.0}
        ]"#,
    )
    .unwrap();

    let file = load_sizing_config(&config_path).unwrap();
    let trades = load_trades(&trades_path).unwrap();
    let sim = PositionSizingSimulator::new(
        Arc::new(DynamicSizer::new(file.sizing.clone())),
        file.symbol_spec().unwrap(),
        file.simulation.clone(),
    );
    let results = sim.run(&trades).unwrap();

    assert_eq!(results.trades.len(), 2);
    // 0.5 lots: 40 × 0.5 × 10 − 3.5 − 5
    assert!((results.trades[0].profit - 191.5).abs() < 1e-9);
    assert!(results.trades[1].profit < 0.0);
    assert_eq!(results.sizer, "percent_risk");
}

#[test]
fn malformed_trades_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades.json");
    std::fs::write(&path, "[{\"entry_price\": 1.0}]").unwrap();
    let err = load_trades(&path).unwrap_err();
    assert!(err.to_string().contains("JSON"), "{err}");
}

proptest! {
    #[test]
    fn drawdown_stays_bounded(
        pips in prop::collection::vec(-80.0..80.0_f64, 1..60),
        limit in 5.0..60.0_f64,
    ) {
        let trades: Vec<SimulatedTrade> = pips.into_iter().map(trade).collect();
        let config = SimulationConfig {
            max_drawdown_limit: Some(limit),
            ..SimulationConfig::default()
        };
        let results = simulator(SizingConfig::fixed_lot(1.0), config).run(&trades).unwrap();

        prop_assert!(results.trades.len() <= trades.len());
        prop_assert_eq!(results.equity_curve.len(), results.trades.len() + 1);
        prop_assert!(results.metrics.max_drawdown >= 0.0);
        prop_assert!(results.metrics.max_drawdown <= 100.0);
        let realised: f64 = results.trades.iter().map(|t| t.profit).sum();
        prop_assert!((results.final_balance - 10_000.0 - realised).abs() < 1e-6);
        if results.halted {
            prop_assert!(results.final_drawdown() >= limit);
        } else {
            prop_assert_eq!(results.trades.len(), trades.len());
            prop_assert!(results.trades.iter().all(|t| t.drawdown < limit));
        }
        prop_assert!(results.risk_of_ruin >= 0.0 && results.risk_of_ruin <= 100.0);
    }
}
