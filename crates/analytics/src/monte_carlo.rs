use rand::seq::SliceRandom;
use rand::thread_rng;

use backtest_core::TradeRecord;

/// Distribution of outcomes from reshuffled trade sequences.
#[derive(Debug, Clone, Default)]
pub struct MonteCarloSummary {
    pub simulations: usize,
    pub mean_return: f64,
    pub median_return: f64,
    pub percentile_5: f64,
    pub percentile_95: f64,
    pub median_max_drawdown: f64,
    /// Fraction of simulations ending above initial capital.
    pub probability_of_profit: f64,
}

/// Reshuffle the completed run's trade returns `num_simulations` times and
/// replay each ordering against `initial_capital`.
///
/// Path-dependent statistics (max drawdown) vary with ordering even though
/// the terminal compound return does not move much; the percentile bands are
/// the useful output.
pub fn run_monte_carlo(
    trades: &[TradeRecord],
    initial_capital: f64,
    num_simulations: usize,
) -> MonteCarloSummary {
    if trades.is_empty() || num_simulations == 0 || initial_capital <= 0.0 {
        return MonteCarloSummary::default();
    }

    let trade_returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();

    let mut rng = thread_rng();
    let mut final_returns = Vec::with_capacity(num_simulations);
    let mut max_drawdowns = Vec::with_capacity(num_simulations);
    let mut profitable = 0usize;

    for _ in 0..num_simulations {
        let mut shuffled = trade_returns.clone();
        shuffled.shuffle(&mut rng);

        let mut equity = initial_capital;
        let mut peak = initial_capital;
        let mut max_dd = 0.0f64;
        for r in &shuffled {
            equity *= 1.0 + r;
            if equity > peak {
                peak = equity;
            }
            if peak > 0.0 {
                max_dd = max_dd.max(1.0 - equity / peak);
            }
        }

        let total = equity / initial_capital - 1.0;
        final_returns.push(total);
        max_drawdowns.push(max_dd);
        if total > 0.0 {
            profitable += 1;
        }
    }

    final_returns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    max_drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    MonteCarloSummary {
        simulations: num_simulations,
        mean_return: final_returns.iter().sum::<f64>() / num_simulations as f64,
        median_return: percentile_sorted(&final_returns, 50.0),
        percentile_5: percentile_sorted(&final_returns, 5.0),
        percentile_95: percentile_sorted(&final_returns, 95.0),
        median_max_drawdown: percentile_sorted(&max_drawdowns, 50.0),
        probability_of_profit: profitable as f64 / num_simulations as f64,
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
