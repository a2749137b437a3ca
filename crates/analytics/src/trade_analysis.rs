//! Per-trade quality analytics: expectancy, Kelly sizing, streak behavior.

use serde::Serialize;

use backtest_core::TradeRecord;

/// Minimum closed trades before any of these statistics are reported.
const MIN_TRADES: usize = 5;

/// Expected value per trade and the sizing numbers that follow from it.
#[derive(Debug, Clone, Serialize)]
pub struct ExpectancyAnalysis {
    /// win_rate * avg_win - loss_rate * avg_loss, in currency.
    pub expectancy: f64,
    /// Expectancy over average entry notional.
    pub expectancy_pct: f64,
    /// Kelly criterion optimal fraction, clamped to [0, 1].
    pub kelly_fraction: f64,
    /// avg_win / avg_loss.
    pub payoff_ratio: f64,
    /// System quality number: sqrt(n) * mean(trade return) / std(trade return).
    pub sqn: f64,
}

/// Win/loss streak behavior across the trade sequence.
#[derive(Debug, Clone, Serialize)]
pub struct StreakDistribution {
    pub max_win_streak: usize,
    pub max_loss_streak: usize,
    pub avg_win_streak: f64,
    pub avg_loss_streak: f64,
    /// Probability a win follows a win.
    pub prob_win_after_win: f64,
    /// Probability a win follows a loss.
    pub prob_win_after_loss: f64,
}

/// Expectancy analysis over the closed trades; `None` under `MIN_TRADES`.
pub fn compute_expectancy(trades: &[TradeRecord]) -> Option<ExpectancyAnalysis> {
    if trades.len() < MIN_TRADES {
        return None;
    }

    let n = trades.len() as f64;
    let wins: Vec<f64> = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).collect();
    let losses: Vec<f64> = trades
        .iter()
        .filter(|t| t.pnl < 0.0)
        .map(|t| t.pnl.abs())
        .collect();
    if wins.is_empty() && losses.is_empty() {
        return None;
    }

    let win_rate = wins.len() as f64 / n;
    let loss_rate = losses.len() as f64 / n;
    let avg_win = mean(&wins);
    let avg_loss = mean(&losses);

    let expectancy = win_rate * avg_win - loss_rate * avg_loss;

    let avg_entry_notional = trades
        .iter()
        .map(|t| (t.entry_price * t.quantity as f64).abs())
        .sum::<f64>()
        / n;
    let expectancy_pct = if avg_entry_notional > 0.0 {
        expectancy / avg_entry_notional
    } else {
        0.0
    };

    let payoff_ratio = if avg_loss > 0.0 { avg_win / avg_loss } else { 0.0 };

    // Kelly: f* = (p*b - q) / b with b the payoff ratio.
    let kelly_fraction = if avg_loss > 0.0 && payoff_ratio > 0.0 {
        ((win_rate * payoff_ratio - loss_rate) / payoff_ratio).clamp(0.0, 1.0)
    } else if win_rate > 0.0 {
        1.0
    } else {
        0.0
    };

    let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
    let mean_ret = mean(&returns);
    let var = returns.iter().map(|r| (r - mean_ret).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.max(0.0).sqrt();
    let sqn = if std > 1e-12 {
        n.sqrt() * mean_ret / std
    } else {
        0.0
    };

    Some(ExpectancyAnalysis {
        expectancy,
        expectancy_pct,
        kelly_fraction,
        payoff_ratio,
        sqn,
    })
}

/// Streak lengths and the conditional win probabilities; `None` under
/// `MIN_TRADES`. A trade with pnl <= 0 counts as a loss.
pub fn analyze_streaks(trades: &[TradeRecord]) -> Option<StreakDistribution> {
    if trades.len() < MIN_TRADES {
        return None;
    }

    let outcomes: Vec<bool> = trades.iter().map(|t| t.pnl > 0.0).collect();

    let mut win_streaks: Vec<usize> = Vec::new();
    let mut loss_streaks: Vec<usize> = Vec::new();
    let mut current_len = 1usize;
    for i in 1..=outcomes.len() {
        if i < outcomes.len() && outcomes[i] == outcomes[i - 1] {
            current_len += 1;
            continue;
        }
        if outcomes[i - 1] {
            win_streaks.push(current_len);
        } else {
            loss_streaks.push(current_len);
        }
        current_len = 1;
    }

    let mut win_after_win = 0usize;
    let mut after_win = 0usize;
    let mut win_after_loss = 0usize;
    let mut after_loss = 0usize;
    for pair in outcomes.windows(2) {
        if pair[0] {
            after_win += 1;
            if pair[1] {
                win_after_win += 1;
            }
        } else {
            after_loss += 1;
            if pair[1] {
                win_after_loss += 1;
            }
        }
    }

    Some(StreakDistribution {
        max_win_streak: win_streaks.iter().copied().max().unwrap_or(0),
        max_loss_streak: loss_streaks.iter().copied().max().unwrap_or(0),
        avg_win_streak: mean_usize(&win_streaks),
        avg_loss_streak: mean_usize(&loss_streaks),
        prob_win_after_win: ratio(win_after_win, after_win),
        prob_win_after_loss: ratio(win_after_loss, after_loss),
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn mean_usize(values: &[usize]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<usize>() as f64 / values.len() as f64
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}
