//! CSV artefact writers for completed runs.
//!
//! One file per artefact: the equity curve (one row per snapshot), the trade
//! blotter, the metrics key-value table, and the per-window walk-forward
//! results.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use analytics::PerformanceMetrics;
use backtest_core::{PortfolioSnapshot, TradeRecord};

use crate::walk_forward::WalkForwardReport;

/// `equity_curve.csv`: timestamp, equity, cash, positions_value,
/// daily_return, drawdown, num_positions.
pub fn write_equity_curve(path: &Path, snapshots: &[PortfolioSnapshot]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for snap in snapshots {
        writer.serialize(snap)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = snapshots.len(), "wrote equity curve");
    Ok(())
}

/// `trades.csv`: symbol, side, quantity, entry_price, exit_price, pnl,
/// return_pct, holding_days, entry_time, exit_time. Side is the literal
/// `BUY` / `SELL`.
pub fn write_trades(path: &Path, trades: &[TradeRecord]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = trades.len(), "wrote trade blotter");
    Ok(())
}

/// `metrics.csv`: `metric,value` rows, led by a `strategy` row naming the
/// producer. Benchmark-relative metrics are omitted when absent.
pub fn write_metrics(
    path: &Path,
    strategy_name: &str,
    metrics: &PerformanceMetrics,
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(["metric", "value"])?;
    writer.write_record(["strategy", strategy_name])?;

    let mut row = |name: &str, value: f64| -> anyhow::Result<()> {
        writer.write_record([name, &value.to_string()])?;
        Ok(())
    };

    row("total_return", metrics.total_return)?;
    row("annualized_return", metrics.annualized_return)?;
    row("annualized_volatility", metrics.annualized_volatility)?;
    row("sharpe_ratio", metrics.sharpe_ratio)?;
    row("sortino_ratio", metrics.sortino_ratio)?;
    row("downside_deviation", metrics.downside_deviation)?;
    row("max_drawdown", metrics.max_drawdown)?;
    row(
        "max_drawdown_duration_days",
        metrics.max_drawdown_duration_days as f64,
    )?;
    row("calmar_ratio", metrics.calmar_ratio)?;
    row("skewness", metrics.skewness)?;
    row("kurtosis", metrics.kurtosis)?;
    row("var_95", metrics.var_95)?;
    row("cvar_95", metrics.cvar_95)?;
    row("total_trades", metrics.total_trades as f64)?;
    row("winning_trades", metrics.winning_trades as f64)?;
    row("losing_trades", metrics.losing_trades as f64)?;
    row("win_rate", metrics.win_rate)?;
    row("profit_factor", metrics.profit_factor)?;
    row("avg_trade_return", metrics.avg_trade_return)?;
    row("avg_winner", metrics.avg_winner)?;
    row("avg_loser", metrics.avg_loser)?;
    if let Some(beta) = metrics.beta {
        row("beta", beta)?;
    }
    if let Some(alpha) = metrics.alpha {
        row("alpha", alpha)?;
    }
    if let Some(ir) = metrics.information_ratio {
        row("information_ratio", ir)?;
    }
    row("turnover", metrics.turnover)?;

    writer.flush()?;
    info!(path = %path.display(), "wrote metrics");
    Ok(())
}

/// `walk_forward_results.csv`: window, train_sharpe, test_sharpe,
/// train_return, test_return, test_maxdd.
pub fn write_walk_forward(path: &Path, report: &WalkForwardReport) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "window",
        "train_sharpe",
        "test_sharpe",
        "train_return",
        "test_return",
        "test_maxdd",
    ])?;
    for result in &report.windows {
        writer.write_record([
            result.window.window_id.to_string(),
            result.train_sharpe.to_string(),
            result.test_sharpe.to_string(),
            result.train_return.to_string(),
            result.test_return.to_string(),
            result.out_of_sample.max_drawdown.to_string(),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = report.windows.len(), "wrote walk-forward results");
    Ok(())
}
