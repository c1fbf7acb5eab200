//! ReplayLab CLI: backtest runs and position sizing simulations.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file
//! - `batch`: execute several configs in parallel
//! - `size`: replay a trade list through a position sizer

mod obs;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use replaylab_core::sizers::DynamicSizer;
use replaylab_runner::sizing_sim::{PositionSizingSimulator, SimulationResults};
use replaylab_runner::{load_config, load_sizing_config, load_trades, run_backtest, run_batch, BacktestResult};

#[derive(Parser)]
#[command(
    name = "replaylab",
    about = "ReplayLab CLI: bar-replay backtesting and position sizing simulation"
)]
struct Cli {
    /// Log filter when REPLAYLAB_LOG is unset (e.g. info, replaylab_core=debug).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format: text or json.
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML run config.
        #[arg(long)]
        config: PathBuf,

        /// Write the full result as JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Execute several backtests in parallel.
    Batch {
        /// Paths to TOML run configs.
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Directory for one JSON result per config.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Replay a trade list through a position sizer.
    Size {
        /// Path to a TOML sizing config.
        #[arg(long)]
        config: PathBuf,

        /// Path to a JSON array of trades.
        #[arg(long)]
        trades: PathBuf,

        /// Write the full simulation result as JSON to this file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    obs::init_tracing(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Run { config, output } => run_cmd(&config, output.as_deref()),
        Commands::Batch { configs, output_dir } => batch_cmd(&configs, output_dir.as_deref()),
        Commands::Size { config, trades, output } => size_cmd(&config, &trades, output.as_deref()),
    }
}

fn run_cmd(config_path: &Path, output: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let result = run_backtest(&config)
        .with_context(|| format!("backtest failed for {}", config_path.display()))?;

    print_summary(&result);
    if let Some(path) = output {
        write_json(path, &result)?;
        println!("Result saved to: {}", path.display());
    }
    Ok(())
}

fn batch_cmd(config_paths: &[PathBuf], output_dir: Option<&Path>) -> Result<()> {
    let configs = config_paths
        .iter()
        .map(|path| load_config(path))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut failures = 0;
    for (path, result) in config_paths.iter().zip(run_batch(&configs)) {
        match result {
            Ok(result) => {
                print_summary(&result);
                if let Some(dir) = output_dir {
                    let file = dir.join(format!("{}.json", result.metadata.run_id));
                    write_json(&file, &result)?;
                }
            }
            Err(e) => {
                failures += 1;
                error!(config = %path.display(), error = %e, "run failed");
            }
        }
    }

    info!(runs = configs.len(), failures, "batch complete");
    if failures > 0 {
        anyhow::bail!("{failures} of {} runs failed", configs.len());
    }
    Ok(())
}

fn size_cmd(config_path: &Path, trades_path: &Path, output: Option<&Path>) -> Result<()> {
    let file = load_sizing_config(config_path)?;
    let trades = load_trades(trades_path)?;
    let simulator = PositionSizingSimulator::new(
        Arc::new(DynamicSizer::new(file.sizing.clone())),
        file.symbol_spec()?,
        file.simulation.clone(),
    );
    let results = simulator.run(&trades)?;

    print_sizing_summary(&file.symbol, &results);
    if let Some(path) = output {
        write_json(path, &results)?;
        println!("Result saved to: {}", path.display());
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn print_summary(result: &BacktestResult) {
    let meta = &result.metadata;
    let m = &result.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Run:            {}", meta.run_id);
    println!("Strategy:       {}", meta.strategy_id);
    println!("Symbol:         {} {}", meta.symbol, meta.timeframe);
    println!("Period:         {} to {}", meta.start, meta.end);
    println!("Bars:           {} ({})", meta.bar_count, meta.data_source);
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Final Balance:  {:.2}", result.final_balance);
    println!("Net Profit:     {:.2}", m.net_profit);
    println!("Total Return:   {:.2}%", m.total_return);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown);
    println!("Win Rate:       {:.1}%", m.win_rate);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Expectancy:     {:.2}", m.expectancy);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Calmar:         {:.3}", m.calmar);
    println!("VaR 95:         {:.2}", result.tail.var_95);
    if meta.cancelled {
        println!();
        println!("WARNING: run was cancelled after {} bars", meta.bars_processed);
    }
    if meta.mtf_rejections > 0 || meta.sizing_blocked > 0 {
        println!(
            "Rejected:       {} by confirmation, {} by sizing",
            meta.mtf_rejections, meta.sizing_blocked
        );
    }
    println!();
}

fn print_sizing_summary(symbol: &str, results: &SimulationResults) {
    println!();
    println!("=== Sizing Simulation ===");
    println!("Symbol:         {symbol}");
    println!("Sizer:          {}", results.sizer);
    println!("Trades:         {} ({} skipped)", results.trades.len(), results.skipped_trades);
    println!("Final Balance:  {:.2}", results.final_balance);
    println!("Max Drawdown:   {:.2}%", results.metrics.max_drawdown);
    println!(
        "Size:           avg {:.2}, min {:.2}, max {:.2}",
        results.average_size, results.min_size, results.max_size
    );
    println!("Avg Risk:       {:.2}%", results.average_risk_percent);
    println!("Risk of Ruin:   {:.2}%", results.risk_of_ruin);
    if results.halted {
        println!();
        println!("WARNING: replay halted at the drawdown limit");
    }
    for warning in &results.warnings {
        println!("WARNING: {warning}");
    }
    for recommendation in &results.recommendations {
        println!("NOTE: {recommendation}");
    }
    println!();
}
