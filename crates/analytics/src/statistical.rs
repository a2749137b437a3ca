//! Resampling and significance statistics for backtest results.

use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use backtest_core::TradeRecord;

const TRADING_DAYS: f64 = 252.0;

/// Bootstrap 95% confidence intervals on the headline trade statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceIntervals {
    pub sharpe_lower: f64,
    pub sharpe_upper: f64,
    pub win_rate_lower: f64,
    pub win_rate_upper: f64,
    pub profit_factor_lower: f64,
    pub profit_factor_upper: f64,
    pub bootstrap_samples: usize,
}

/// Resample the trades with replacement `num_samples` times and report the
/// 2.5th/97.5th percentile band of each statistic. Resamples run in
/// parallel. `None` with fewer than 5 trades or zero samples.
pub fn bootstrap_confidence_intervals(
    trades: &[TradeRecord],
    num_samples: usize,
) -> Option<ConfidenceIntervals> {
    if trades.len() < 5 || num_samples == 0 {
        return None;
    }
    let n = trades.len();

    let draws: Vec<(f64, f64, f64)> = (0..num_samples)
        .into_par_iter()
        .map(|_| {
            let mut rng = rand::thread_rng();
            let mut returns = Vec::with_capacity(n);
            let mut wins = 0usize;
            let mut gross_win = 0.0;
            let mut gross_loss = 0.0;
            for _ in 0..n {
                let t = &trades[rng.gen_range(0..n)];
                returns.push(t.return_pct);
                if t.pnl > 0.0 {
                    wins += 1;
                    gross_win += t.pnl;
                } else {
                    gross_loss += t.pnl.abs();
                }
            }

            let win_rate = wins as f64 / n as f64;
            let profit_factor = if gross_loss > 0.0 {
                gross_win / gross_loss
            } else if gross_win > 0.0 {
                999.0
            } else {
                0.0
            };

            let mean = returns.iter().sum::<f64>() / n as f64;
            let var =
                returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0).max(1.0);
            let std = var.sqrt();
            let sharpe = if std > 1e-12 {
                mean / std * (TRADING_DAYS / n as f64).sqrt()
            } else {
                0.0
            };

            (sharpe, win_rate, profit_factor)
        })
        .collect();

    let mut sharpes: Vec<f64> = draws.iter().map(|d| d.0).collect();
    let mut win_rates: Vec<f64> = draws.iter().map(|d| d.1).collect();
    let mut profit_factors: Vec<f64> = draws.iter().map(|d| d.2).collect();

    let band = |samples: &mut Vec<f64>| -> (f64, f64) {
        samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        (
            percentile_sorted(samples, 2.5),
            percentile_sorted(samples, 97.5),
        )
    };
    let (sharpe_lower, sharpe_upper) = band(&mut sharpes);
    let (win_rate_lower, win_rate_upper) = band(&mut win_rates);
    let (profit_factor_lower, profit_factor_upper) = band(&mut profit_factors);

    Some(ConfidenceIntervals {
        sharpe_lower,
        sharpe_upper,
        win_rate_lower,
        win_rate_upper,
        profit_factor_lower,
        profit_factor_upper,
        bootstrap_samples: num_samples,
    })
}

/// Two-tailed p-value for the null hypothesis that the true Sharpe is zero,
/// using the asymptotic standard error `sqrt((1 + SR^2 / 2) / n)`.
pub fn sharpe_p_value(sharpe: f64, num_returns: usize) -> f64 {
    if num_returns < 3 {
        return 1.0;
    }
    let n = num_returns as f64;
    let se = ((1.0 + 0.5 * sharpe * sharpe) / n).sqrt();
    let z = (sharpe / se).abs();

    let normal = Normal::new(0.0, 1.0).expect("unit normal");
    2.0 * (1.0 - normal.cdf(z))
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
