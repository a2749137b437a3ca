//! backtest: drive the simulation engine from the command line.
//!
//! Usage:
//!   backtest run --data-dir data --symbols AAPL,MSFT,SPY --strategy momentum
//!   backtest run --symbols AAA,BBB,SPY --bars 756            # synthetic universe
//!   backtest walk-forward --symbols AAA,BBB,SPY --train 504 --test 126 --step 63
//!   backtest synth --symbols AAA,BBB --bars 504 --out-dir data
//!
//! Bars load from `<data-dir>/<SYMBOL>.csv` with the header
//! `timestamp,open,high,low,close,volume,adj_close`; without a data dir a
//! synthetic GBM universe is generated in memory.

mod synthetic;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use analytics::{
    compute_expectancy, compute_risk_profile, run_monte_carlo, DEFAULT_RISK_FREE_RATE,
};
use backtest_core::BacktestConfig;
use backtest_engine::{
    export, run_walk_forward, BacktestEngine, MeanReversionStrategy, MomentumStrategy, Strategy,
};
use market_data::{load_bars_csv, MarketDataStore};

#[derive(Parser)]
#[command(name = "backtest", about = "Event-driven equity backtesting engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single backtest and write the artefact CSVs.
    Run {
        #[command(flatten)]
        data: DataArgs,
        /// Strategy: momentum | mean-reversion
        #[arg(long, default_value = "momentum")]
        strategy: String,
        /// JSON config overlaying the defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for equity_curve.csv, trades.csv, metrics.csv.
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// Monte Carlo reshuffles of the trade sequence (0 disables).
        #[arg(long, default_value_t = 0)]
        monte_carlo: usize,
    },
    /// Walk-forward validation over rolling train/test windows.
    WalkForward {
        #[command(flatten)]
        data: DataArgs,
        #[arg(long, default_value = "momentum")]
        strategy: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// Training window length in bars.
        #[arg(long, default_value_t = 504)]
        train: usize,
        /// Test window length in bars.
        #[arg(long, default_value_t = 126)]
        test: usize,
        /// Step between window starts in bars.
        #[arg(long, default_value_t = 63)]
        step: usize,
    },
    /// Generate synthetic GBM bars and write one CSV per symbol.
    Synth {
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        #[arg(long, default_value_t = 504)]
        bars: usize,
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
}

#[derive(clap::Args)]
struct DataArgs {
    /// Directory of per-symbol bar CSVs; omit for a synthetic universe.
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Symbols to load or generate.
    #[arg(long, value_delimiter = ',', required = true)]
    symbols: Vec<String>,
    /// Bars per symbol when generating synthetically.
    #[arg(long, default_value_t = 504)]
    bars: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Command::Run {
            data,
            strategy,
            config,
            out_dir,
            monte_carlo,
        } => run_backtest(&data, &strategy, config.as_deref(), &out_dir, monte_carlo),
        Command::WalkForward {
            data,
            strategy,
            config,
            out_dir,
            train,
            test,
            step,
        } => walk_forward(&data, &strategy, config.as_deref(), &out_dir, train, test, step),
        Command::Synth {
            symbols,
            bars,
            out_dir,
        } => synth(&symbols, bars, &out_dir),
    }
}

fn run_backtest(
    data: &DataArgs,
    strategy_name: &str,
    config_path: Option<&Path>,
    out_dir: &Path,
    monte_carlo: usize,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = build_store(data)?;
    let mut strategy = make_strategy(strategy_name)?;

    let engine = BacktestEngine::new(config.clone(), &store);
    let run = engine.run(strategy.as_mut(), None)?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    export::write_equity_curve(&out_dir.join("equity_curve.csv"), &run.snapshots)?;
    export::write_trades(&out_dir.join("trades.csv"), &run.trades)?;
    export::write_metrics(&out_dir.join("metrics.csv"), &run.strategy_name, &run.metrics)?;

    info!(
        total_return = run.metrics.total_return,
        sharpe = run.metrics.sharpe_ratio,
        max_drawdown = run.metrics.max_drawdown,
        trades = run.metrics.total_trades,
        "backtest finished"
    );

    let profile = compute_risk_profile(&run.snapshots, DEFAULT_RISK_FREE_RATE);
    info!(
        omega = profile.omega_ratio,
        tail_ratio = profile.tail_ratio,
        ulcer = profile.ulcer_index,
        cdar_95 = profile.cdar_95,
        "risk profile"
    );
    if let Some(exp) = compute_expectancy(&run.trades) {
        info!(
            expectancy = exp.expectancy,
            payoff_ratio = exp.payoff_ratio,
            kelly = exp.kelly_fraction,
            sqn = exp.sqn,
            "trade expectancy"
        );
    }

    if monte_carlo > 0 && !run.trades.is_empty() {
        let mc = run_monte_carlo(&run.trades, config.initial_capital, monte_carlo);
        info!(
            simulations = mc.simulations,
            median_return = mc.median_return,
            p5 = mc.percentile_5,
            p95 = mc.percentile_95,
            probability_of_profit = mc.probability_of_profit,
            "monte carlo summary"
        );
    }
    Ok(())
}

fn walk_forward(
    data: &DataArgs,
    strategy_name: &str,
    config_path: Option<&Path>,
    out_dir: &Path,
    train: usize,
    test: usize,
    step: usize,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = build_store(data)?;
    let factory = strategy_factory(strategy_name)?;

    let report = run_walk_forward(&config, &store, factory.as_ref(), train, test, step)?;
    if report.windows.is_empty() {
        bail!(
            "data too short for a single walk-forward window (need {} bars)",
            train + test
        );
    }

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    export::write_walk_forward(&out_dir.join("walk_forward_results.csv"), &report)?;

    info!(
        windows = report.windows.len(),
        avg_train_sharpe = report.avg_train_sharpe,
        avg_test_sharpe = report.avg_test_sharpe,
        sharpe_decay_pct = report.sharpe_decay_pct,
        oos_win_rate = report.out_of_sample_win_rate,
        "walk-forward finished"
    );
    Ok(())
}

fn synth(symbols: &[String], bars: usize, out_dir: &Path) -> anyhow::Result<()> {
    let mut rng = rand::thread_rng();
    let store = synthetic::generate_universe(symbols, bars, &mut rng)?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    for symbol in store.symbols() {
        let path = out_dir.join(format!("{symbol}.csv"));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        for bar in store.bars(symbol)? {
            writer.serialize(bar)?;
        }
        writer.flush()?;
        info!(symbol, path = %path.display(), bars, "wrote synthetic bars");
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BacktestConfig> {
    match path {
        None => Ok(BacktestConfig::default()),
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))
        }
    }
}

fn build_store(data: &DataArgs) -> anyhow::Result<MarketDataStore> {
    if data.symbols.is_empty() {
        bail!("no symbols given");
    }
    match &data.data_dir {
        Some(dir) => {
            let mut store = MarketDataStore::new();
            for symbol in &data.symbols {
                let path = dir.join(format!("{symbol}.csv"));
                let bars = load_bars_csv(&path)
                    .with_context(|| format!("loading {symbol}"))?;
                store.add_symbol(symbol.clone(), bars)?;
            }
            Ok(store)
        }
        None => {
            info!(symbols = data.symbols.len(), bars = data.bars, "generating synthetic universe");
            let mut rng = rand::thread_rng();
            synthetic::generate_universe(&data.symbols, data.bars, &mut rng)
        }
    }
}

fn make_strategy(name: &str) -> anyhow::Result<Box<dyn Strategy>> {
    match name {
        "momentum" => Ok(Box::new(MomentumStrategy::new())),
        "mean-reversion" | "mean_reversion" => Ok(Box::new(MeanReversionStrategy::default())),
        other => bail!("unknown strategy: {other} (expected momentum | mean-reversion)"),
    }
}

fn strategy_factory(
    name: &str,
) -> anyhow::Result<Box<dyn Fn(&BacktestConfig) -> Box<dyn Strategy> + Send + Sync>> {
    // Validate the name once up front; the closure then matches infallibly.
    make_strategy(name)?;
    let name = name.to_string();
    Ok(Box::new(move |_config: &BacktestConfig| -> Box<dyn Strategy> {
        match name.as_str() {
            "mean-reversion" | "mean_reversion" => Box::new(MeanReversionStrategy::default()),
            _ => Box::new(MomentumStrategy::new()),
        }
    }))
}
