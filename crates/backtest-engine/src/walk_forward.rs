use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use analytics::PerformanceMetrics;
use backtest_core::{BacktestConfig, EngineError, WalkForwardWindow};
use market_data::MarketDataStore;

use crate::engine::BacktestEngine;
use crate::strategy::StrategyFactory;

/// Backtest results for one (train, test) window pair.
#[derive(Debug, Clone, Serialize)]
pub struct WindowResult {
    pub window: WalkForwardWindow,
    pub in_sample: PerformanceMetrics,
    pub out_of_sample: PerformanceMetrics,
    pub train_sharpe: f64,
    pub test_sharpe: f64,
    pub train_return: f64,
    pub test_return: f64,
}

/// Aggregate walk-forward report. `windows` is ordered by ascending
/// window_id.
#[derive(Debug, Clone, Serialize)]
pub struct WalkForwardReport {
    pub strategy_name: String,
    pub windows: Vec<WindowResult>,
    pub avg_train_sharpe: f64,
    pub avg_test_sharpe: f64,
    /// `(1 - avg_oos / avg_is) * 100` when the in-sample average is
    /// positive; the overfitting diagnostic.
    pub sharpe_decay_pct: f64,
    /// Fraction of windows with positive out-of-sample Sharpe.
    pub out_of_sample_win_rate: f64,
}

/// Emit rolling (train, test) windows over `total_bars`.
///
/// Windows advance by `step_bars` while a full train span and at least one
/// test bar fit; data too short for a single pair yields an empty sequence
/// (a no-op, not an error). Window ids are assigned in order from 0.
pub fn generate_windows(
    total_bars: usize,
    train_bars: usize,
    test_bars: usize,
    step_bars: usize,
) -> Vec<WalkForwardWindow> {
    let mut windows = Vec::new();
    if train_bars == 0 || test_bars == 0 || step_bars == 0 {
        return windows;
    }

    let mut start = 0usize;
    while start + train_bars + test_bars <= total_bars {
        let train_end = start + train_bars - 1;
        let test_start = start + train_bars;
        let test_end = (test_start + test_bars - 1).min(total_bars - 1);
        windows.push(WalkForwardWindow {
            window_id: windows.len(),
            train_start: start,
            train_end,
            test_start,
            test_end,
        });
        start += step_bars;
    }
    debug!(
        total_bars,
        train_bars,
        test_bars,
        step_bars,
        windows = windows.len(),
        "generated walk-forward windows"
    );
    windows
}

/// Evaluate every window concurrently and aggregate the Sharpe decay.
///
/// Each window runs two independent simulations (train range, test range),
/// each with a fresh portfolio, circuit breaker, and strategy built by
/// `strategy_factory`. The market data store is the only shared state and is
/// read-only throughout. All-or-nothing: any window error fails the whole
/// run with no partial output.
pub fn run_walk_forward(
    config: &BacktestConfig,
    market: &MarketDataStore,
    strategy_factory: &StrategyFactory,
    train_bars: usize,
    test_bars: usize,
    step_bars: usize,
) -> Result<WalkForwardReport, EngineError> {
    let (_, last) = market.common_range().ok_or(EngineError::EmptyMarket)?;
    let total_bars = last + 1;
    let windows = generate_windows(total_bars, train_bars, test_bars, step_bars);
    let strategy_name = strategy_factory(config).name().to_string();

    // rayon's indexed collect writes each window's result at its own index,
    // so output order is ascending window_id without any locking.
    let results: Vec<WindowResult> = windows
        .par_iter()
        .map(|window| evaluate_window(config, market, strategy_factory, window))
        .collect::<Result<Vec<_>, EngineError>>()?;

    let n = results.len() as f64;
    let (avg_train_sharpe, avg_test_sharpe, out_of_sample_win_rate) = if results.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        (
            results.iter().map(|r| r.train_sharpe).sum::<f64>() / n,
            results.iter().map(|r| r.test_sharpe).sum::<f64>() / n,
            results.iter().filter(|r| r.test_sharpe > 0.0).count() as f64 / n,
        )
    };
    let sharpe_decay_pct = if avg_train_sharpe > 0.0 {
        (1.0 - avg_test_sharpe / avg_train_sharpe) * 100.0
    } else {
        0.0
    };

    info!(
        strategy = %strategy_name,
        windows = results.len(),
        avg_train_sharpe,
        avg_test_sharpe,
        sharpe_decay_pct,
        out_of_sample_win_rate,
        "walk-forward complete"
    );

    Ok(WalkForwardReport {
        strategy_name,
        windows: results,
        avg_train_sharpe,
        avg_test_sharpe,
        sharpe_decay_pct,
        out_of_sample_win_rate,
    })
}

fn evaluate_window(
    config: &BacktestConfig,
    market: &MarketDataStore,
    strategy_factory: &StrategyFactory,
    window: &WalkForwardWindow,
) -> Result<WindowResult, EngineError> {
    let engine = BacktestEngine::new(config.clone(), market);

    let mut train_strategy = strategy_factory(config);
    let train = engine.run(
        train_strategy.as_mut(),
        Some((window.train_start, window.train_end)),
    )?;

    let mut test_strategy = strategy_factory(config);
    let test = engine.run(
        test_strategy.as_mut(),
        Some((window.test_start, window.test_end)),
    )?;

    debug!(
        window = window.window_id,
        train_sharpe = train.metrics.sharpe_ratio,
        test_sharpe = test.metrics.sharpe_ratio,
        "window evaluated"
    );

    Ok(WindowResult {
        window: *window,
        train_sharpe: train.metrics.sharpe_ratio,
        test_sharpe: test.metrics.sharpe_ratio,
        train_return: train.metrics.total_return,
        test_return: test.metrics.total_return,
        in_sample: train.metrics,
        out_of_sample: test.metrics,
    })
}
