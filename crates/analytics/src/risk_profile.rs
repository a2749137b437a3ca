//! Drawdown-shape and tail risk analytics beyond the headline metrics.
//!
//! Everything here derives from the snapshot equity curve; the drawdown
//! series is recomputed from equity so the functions work on any snapshot
//! slice, filled-in drawdown field or not.

use serde::Serialize;

use backtest_core::PortfolioSnapshot;

use crate::metrics::daily_returns;

const TRADING_DAYS: f64 = 252.0;

/// Window for the rolling Sharpe series, about a quarter.
pub const ROLLING_SHARPE_WINDOW: usize = 63;

/// One point on the rolling Sharpe curve.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RollingSharpePoint {
    pub timestamp: i64,
    pub sharpe: f64,
}

/// Extended risk profile of one run. Fields are `None` when the curve is too
/// short or the statistic degenerates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskProfile {
    /// Gains above the daily risk-free threshold over losses below it.
    pub omega_ratio: Option<f64>,
    /// 95th percentile return over |5th percentile|.
    pub tail_ratio: Option<f64>,
    /// Root-mean-square drawdown; penalizes long shallow valleys.
    pub ulcer_index: Option<f64>,
    /// Mean squared drawdown.
    pub pain_index: Option<f64>,
    /// Mean of the worst 5% of drawdown observations.
    pub cdar_95: Option<f64>,
    pub rolling_sharpe: Vec<RollingSharpePoint>,
}

/// Compute the full extended risk profile for a snapshot series.
pub fn compute_risk_profile(
    snapshots: &[PortfolioSnapshot],
    risk_free_rate: f64,
) -> RiskProfile {
    let returns = daily_returns(snapshots);
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let drawdowns = drawdown_series(snapshots);

    RiskProfile {
        omega_ratio: omega_ratio(&returns, daily_rf),
        tail_ratio: tail_ratio(&returns),
        ulcer_index: ulcer_index(&drawdowns),
        pain_index: pain_index(&drawdowns),
        cdar_95: conditional_drawdown_at_risk(&drawdowns, 0.05),
        rolling_sharpe: rolling_sharpe(snapshots, &returns, daily_rf, ROLLING_SHARPE_WINDOW),
    }
}

/// Per-snapshot drawdown fractions against the running equity peak.
pub fn drawdown_series(snapshots: &[PortfolioSnapshot]) -> Vec<f64> {
    let mut peak = f64::MIN;
    snapshots
        .iter()
        .map(|s| {
            if s.equity > peak {
                peak = s.equity;
            }
            if peak > 0.0 {
                (1.0 - s.equity / peak).max(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Omega ratio at `threshold`: sum of excess gains over sum of shortfalls.
pub fn omega_ratio(returns: &[f64], threshold: f64) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }
    let gains: f64 = returns.iter().map(|r| (r - threshold).max(0.0)).sum();
    let losses: f64 = returns.iter().map(|r| (threshold - r).max(0.0)).sum();
    if losses > 1e-15 {
        Some(gains / losses)
    } else {
        None
    }
}

/// Tail ratio: p95 / |p5|. Needs at least 20 returns to mean anything.
pub fn tail_ratio(returns: &[f64]) -> Option<f64> {
    if returns.len() < 20 {
        return None;
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let p95 = percentile_sorted(&sorted, 95.0);
    let p5 = percentile_sorted(&sorted, 5.0);
    if p5.abs() > 1e-15 {
        Some(p95 / p5.abs())
    } else {
        None
    }
}

/// Ulcer index: sqrt(mean(drawdown^2)).
pub fn ulcer_index(drawdowns: &[f64]) -> Option<f64> {
    if drawdowns.len() < 3 {
        return None;
    }
    let mean_sq = drawdowns.iter().map(|d| d * d).sum::<f64>() / drawdowns.len() as f64;
    Some(mean_sq.sqrt())
}

/// Pain index: mean(drawdown^2), the ulcer index without the square root.
pub fn pain_index(drawdowns: &[f64]) -> Option<f64> {
    if drawdowns.is_empty() {
        return None;
    }
    Some(drawdowns.iter().map(|d| d * d).sum::<f64>() / drawdowns.len() as f64)
}

/// Conditional drawdown at risk: mean of the worst `alpha` fraction of
/// drawdown observations.
pub fn conditional_drawdown_at_risk(drawdowns: &[f64], alpha: f64) -> Option<f64> {
    if drawdowns.len() < 10 {
        return None;
    }
    let mut sorted = drawdowns.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let cutoff = ((alpha * sorted.len() as f64).ceil() as usize).clamp(1, sorted.len());
    let worst = &sorted[..cutoff];
    Some(worst.iter().sum::<f64>() / worst.len() as f64)
}

fn rolling_sharpe(
    snapshots: &[PortfolioSnapshot],
    returns: &[f64],
    daily_rf: f64,
    window: usize,
) -> Vec<RollingSharpePoint> {
    if returns.len() < window || window < 2 {
        return Vec::new();
    }
    let mut points = Vec::with_capacity(returns.len() - window + 1);
    for end in window..=returns.len() {
        let slice = &returns[end - window..end];
        let n = slice.len() as f64;
        let mean = slice.iter().sum::<f64>() / n;
        let var = slice.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std = var.max(0.0).sqrt();
        let sharpe = if std > 0.0 {
            (mean - daily_rf) / std * TRADING_DAYS.sqrt()
        } else {
            0.0
        };
        // Return k covers snapshots k..k+1; stamp with the window's last bar.
        points.push(RollingSharpePoint {
            timestamp: snapshots[end].timestamp,
            sharpe,
        });
    }
    points
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
