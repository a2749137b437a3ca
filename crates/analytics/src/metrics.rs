use serde::{Deserialize, Serialize};

use backtest_core::{PortfolioSnapshot, TradeRecord};

/// Annualised risk-free rate assumed when the caller has no opinion.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.04;

const TRADING_DAYS: f64 = 252.0;

/// Sentinel profit factor when there are winners but zero losses.
const PROFIT_FACTOR_CAP: f64 = 999.0;

/// The full risk/return record for one backtest run.
///
/// Ratios and returns are fractions, not percentages. Benchmark-relative
/// fields are `None` when no benchmark return series was supplied (or the
/// overlap was too short to regress).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub downside_deviation: f64,
    pub max_drawdown: f64,
    /// Longest stretch of snapshots between a peak and the next equity that
    /// exceeds it (an unrecovered tail counts).
    pub max_drawdown_duration_days: usize,
    pub calmar_ratio: f64,
    pub skewness: f64,
    /// Excess kurtosis.
    pub kurtosis: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_trade_return: f64,
    pub avg_winner: f64,
    pub avg_loser: f64,
    pub beta: Option<f64>,
    pub alpha: Option<f64>,
    pub information_ratio: Option<f64>,
    /// Gross entry notional traded per unit of average equity per year.
    pub turnover: f64,
}

/// Compute the full metrics record from a completed run.
///
/// `snapshots` carries n+1 rows for n daily returns; with fewer than 2
/// returns the record is all zeros. Degenerate denominators yield 0 for the
/// affected metric rather than NaN or infinity.
pub fn compute_metrics(
    snapshots: &[PortfolioSnapshot],
    trades: &[TradeRecord],
    benchmark_returns: Option<&[f64]>,
    risk_free_rate: f64,
) -> PerformanceMetrics {
    let returns = daily_returns(snapshots);
    let n = returns.len();
    if n < 2 {
        return PerformanceMetrics::default();
    }

    let daily_rf = risk_free_rate / TRADING_DAYS;
    let years = n as f64 / TRADING_DAYS;

    let first_equity = snapshots[0].equity;
    let last_equity = snapshots[snapshots.len() - 1].equity;
    let total_return = if first_equity > 0.0 {
        last_equity / first_equity - 1.0
    } else {
        0.0
    };
    let annualized_return = (1.0 + total_return).powf(1.0 / years) - 1.0;

    let mean = returns.iter().sum::<f64>() / n as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    let daily_std = variance.max(0.0).sqrt();
    let annualized_volatility = daily_std * TRADING_DAYS.sqrt();

    let sharpe_ratio = if daily_std > 0.0 {
        (mean - daily_rf) / daily_std * TRADING_DAYS.sqrt()
    } else {
        0.0
    };

    // Downside deviation over returns below the daily risk-free rate; the
    // divisor is the downside count, annualised like volatility.
    let downside: Vec<f64> = returns.iter().filter(|&&r| r < daily_rf).copied().collect();
    let downside_deviation = if downside.is_empty() {
        0.0
    } else {
        let ss = downside.iter().map(|r| (r - daily_rf).powi(2)).sum::<f64>();
        (ss / downside.len() as f64).sqrt() * TRADING_DAYS.sqrt()
    };
    let sortino_ratio = if downside_deviation > 0.0 {
        (annualized_return - risk_free_rate) / downside_deviation
    } else {
        0.0
    };

    let (max_drawdown, max_drawdown_duration_days) = drawdown_stats(snapshots);
    let calmar_ratio = if max_drawdown > 0.0 {
        annualized_return / max_drawdown
    } else {
        0.0
    };

    let (skewness, kurtosis) = higher_moments(&returns, mean, daily_std);
    let (var_95, cvar_95) = tail_risk(&returns);

    let trade_stats = TradeStats::from_trades(trades);

    let (beta, alpha, information_ratio) = benchmark_returns
        .map(|bench| {
            benchmark_block(&returns, bench, annualized_return, risk_free_rate)
        })
        .unwrap_or((None, None, None));

    let avg_equity = snapshots.iter().map(|s| s.equity).sum::<f64>() / snapshots.len() as f64;
    let gross_entry_notional: f64 = trades
        .iter()
        .map(|t| (t.entry_price * t.quantity as f64).abs())
        .sum();
    let turnover = if avg_equity > 0.0 && years > 0.0 {
        gross_entry_notional / avg_equity / years
    } else {
        0.0
    };

    PerformanceMetrics {
        total_return,
        annualized_return,
        annualized_volatility,
        sharpe_ratio,
        sortino_ratio,
        downside_deviation,
        max_drawdown,
        max_drawdown_duration_days,
        calmar_ratio,
        skewness,
        kurtosis,
        var_95,
        cvar_95,
        total_trades: trade_stats.total,
        winning_trades: trade_stats.winners,
        losing_trades: trade_stats.losers,
        win_rate: trade_stats.win_rate,
        profit_factor: trade_stats.profit_factor,
        avg_trade_return: trade_stats.avg_trade_return,
        avg_winner: trade_stats.avg_winner,
        avg_loser: trade_stats.avg_loser,
        beta,
        alpha,
        information_ratio,
        turnover,
    }
}

/// Arithmetic daily returns from the snapshot equity curve.
pub fn daily_returns(snapshots: &[PortfolioSnapshot]) -> Vec<f64> {
    snapshots
        .windows(2)
        .map(|w| {
            if w[0].equity > 0.0 {
                w[1].equity / w[0].equity - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Max drawdown and the longest peak-to-recovery stretch in snapshots.
fn drawdown_stats(snapshots: &[PortfolioSnapshot]) -> (f64, usize) {
    let mut peak = f64::MIN;
    let mut peak_index = 0usize;
    let mut max_dd = 0.0f64;
    let mut max_duration = 0usize;

    for (i, snap) in snapshots.iter().enumerate() {
        if snap.equity > peak {
            peak = snap.equity;
            max_duration = max_duration.max(i - peak_index);
            peak_index = i;
        } else if peak > 0.0 {
            let dd = 1.0 - snap.equity / peak;
            max_dd = max_dd.max(dd);
        }
    }
    // Unrecovered tail.
    if !snapshots.is_empty() {
        max_duration = max_duration.max(snapshots.len() - 1 - peak_index);
    }
    (max_dd, max_duration)
}

/// Skewness `mean(z^3)` and excess kurtosis `mean(z^4) - 3`.
fn higher_moments(returns: &[f64], mean: f64, daily_std: f64) -> (f64, f64) {
    if daily_std <= 0.0 {
        return (0.0, 0.0);
    }
    let n = returns.len() as f64;
    let mut z3 = 0.0;
    let mut z4 = 0.0;
    for r in returns {
        let z = (r - mean) / daily_std;
        z3 += z.powi(3);
        z4 += z.powi(4);
    }
    (z3 / n, z4 / n - 3.0)
}

/// Historical VaR and CVaR at 95%, as positive loss fractions.
fn tail_risk(returns: &[f64]) -> (f64, f64) {
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let cutoff = (0.05 * sorted.len() as f64).floor() as usize;

    let var_95 = -sorted[cutoff.min(sorted.len() - 1)];
    let tail = &sorted[..cutoff];
    let cvar_95 = if tail.is_empty() {
        0.0
    } else {
        -(tail.iter().sum::<f64>() / tail.len() as f64)
    };
    (var_95, cvar_95)
}

struct TradeStats {
    total: usize,
    winners: usize,
    losers: usize,
    win_rate: f64,
    profit_factor: f64,
    avg_trade_return: f64,
    avg_winner: f64,
    avg_loser: f64,
}

impl TradeStats {
    fn from_trades(trades: &[TradeRecord]) -> Self {
        let total = trades.len();
        if total == 0 {
            return Self {
                total: 0,
                winners: 0,
                losers: 0,
                win_rate: 0.0,
                profit_factor: 0.0,
                avg_trade_return: 0.0,
                avg_winner: 0.0,
                avg_loser: 0.0,
            };
        }

        let winners: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl > 0.0).collect();
        let losers: Vec<&TradeRecord> = trades.iter().filter(|t| t.pnl <= 0.0).collect();

        let sum_wins: f64 = winners.iter().map(|t| t.pnl).sum();
        let sum_losses: f64 = losers.iter().map(|t| t.pnl.abs()).sum();

        let profit_factor = if sum_losses > 0.0 {
            sum_wins / sum_losses
        } else if sum_wins > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        Self {
            total,
            winners: winners.len(),
            losers: losers.len(),
            win_rate: winners.len() as f64 / total as f64,
            profit_factor,
            avg_trade_return: trades.iter().map(|t| t.return_pct).sum::<f64>() / total as f64,
            avg_winner: if winners.is_empty() {
                0.0
            } else {
                sum_wins / winners.len() as f64
            },
            avg_loser: if losers.is_empty() {
                0.0
            } else {
                losers.iter().map(|t| t.pnl).sum::<f64>() / losers.len() as f64
            },
        }
    }
}

/// Beta, alpha, and information ratio against a benchmark daily return
/// series, truncated to the shorter of the two series.
fn benchmark_block(
    returns: &[f64],
    benchmark: &[f64],
    annualized_return: f64,
    risk_free_rate: f64,
) -> (Option<f64>, Option<f64>, Option<f64>) {
    let m = returns.len().min(benchmark.len());
    if m < 2 {
        return (None, None, None);
    }
    let r = &returns[..m];
    let b = &benchmark[..m];

    let mean_r = r.iter().sum::<f64>() / m as f64;
    let mean_b = b.iter().sum::<f64>() / m as f64;

    let cov = r
        .iter()
        .zip(b)
        .map(|(ri, bi)| (ri - mean_r) * (bi - mean_b))
        .sum::<f64>()
        / (m as f64 - 1.0);
    let var_b = b.iter().map(|bi| (bi - mean_b).powi(2)).sum::<f64>() / (m as f64 - 1.0);

    let beta = if var_b > 0.0 { Some(cov / var_b) } else { None };
    let alpha = beta.map(|beta| {
        (annualized_return - risk_free_rate) - beta * (mean_b * TRADING_DAYS - risk_free_rate)
    });

    let diffs: Vec<f64> = r.iter().zip(b).map(|(ri, bi)| ri - bi).collect();
    let mean_diff = diffs.iter().sum::<f64>() / m as f64;
    let te_var = diffs.iter().map(|d| (d - mean_diff).powi(2)).sum::<f64>() / (m as f64 - 1.0);
    let tracking_error = te_var.max(0.0).sqrt() * TRADING_DAYS.sqrt();
    let information_ratio = if tracking_error > 0.0 {
        Some((annualized_return - mean_b * TRADING_DAYS) / tracking_error)
    } else {
        None
    };

    (beta, alpha, information_ratio)
}
