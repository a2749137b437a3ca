use backtest_core::{OrderSide, PortfolioSnapshot, TradeRecord};

use crate::metrics::{compute_metrics, daily_returns, DEFAULT_RISK_FREE_RATE};
use crate::monte_carlo::run_monte_carlo;
use crate::risk_profile::{
    compute_risk_profile, conditional_drawdown_at_risk, drawdown_series,
};
use crate::statistical::{bootstrap_confidence_intervals, sharpe_p_value};
use crate::trade_analysis::{analyze_streaks, compute_expectancy};

/// Helper: snapshot rows from an equity path, one day apart.
fn snapshots_from_equity(equities: &[f64]) -> Vec<PortfolioSnapshot> {
    equities
        .iter()
        .enumerate()
        .map(|(i, &equity)| PortfolioSnapshot {
            timestamp: 86_400 * i as i64,
            equity,
            cash: equity,
            positions_value: 0.0,
            daily_return: 0.0,
            drawdown: 0.0,
            num_positions: 0,
        })
        .collect()
}

/// Helper: snapshot rows compounding the given daily returns from 100.
fn snapshots_from_returns(returns: &[f64]) -> Vec<PortfolioSnapshot> {
    let mut equities = vec![100.0];
    for r in returns {
        let prev = *equities.last().unwrap();
        equities.push(prev * (1.0 + r));
    }
    snapshots_from_equity(&equities)
}

/// Helper: a closed trade with the given P&L.
fn trade(pnl: f64, entry_price: f64, quantity: i64) -> TradeRecord {
    TradeRecord {
        symbol: "TEST".to_string(),
        side: OrderSide::Sell,
        quantity,
        entry_price,
        exit_price: entry_price + pnl / quantity as f64,
        pnl,
        return_pct: pnl / (entry_price * quantity as f64),
        holding_days: 0,
        entry_time: 0,
        exit_time: 1,
    }
}

// =============================================================================
// Degenerate inputs
// =============================================================================

#[test]
fn fewer_than_two_returns_yields_all_zero_record() {
    let m = compute_metrics(&snapshots_from_equity(&[100.0, 101.0]), &[], None, 0.04);
    assert_eq!(m.total_return, 0.0);
    assert_eq!(m.sharpe_ratio, 0.0);
    assert_eq!(m.total_trades, 0);
    assert!(m.beta.is_none());

    let empty = compute_metrics(&[], &[], None, 0.04);
    assert_eq!(empty.max_drawdown, 0.0);
}

#[test]
fn constant_equity_has_zero_sharpe_and_volatility() {
    let m = compute_metrics(
        &snapshots_from_equity(&[100.0; 50]),
        &[],
        None,
        DEFAULT_RISK_FREE_RATE,
    );
    assert_eq!(m.annualized_volatility, 0.0);
    assert_eq!(m.sharpe_ratio, 0.0);
    assert_eq!(m.sortino_ratio, 0.0);
    assert_eq!(m.max_drawdown, 0.0);
    assert_eq!(m.skewness, 0.0);
    assert_eq!(m.kurtosis, 0.0);
}

// =============================================================================
// Scenario: metrics on a ramp (253-bar linear growth 100 -> 110)
// =============================================================================

#[test]
fn linear_ramp_metrics() {
    let equities: Vec<f64> = (0..253).map(|i| 100.0 + 10.0 * i as f64 / 252.0).collect();
    let m = compute_metrics(&snapshots_from_equity(&equities), &[], None, 0.04);

    assert!((m.total_return - 0.10).abs() < 1e-9);
    assert!((m.annualized_return - 0.10).abs() < 1e-3);
    assert!(m.sharpe_ratio > 0.0, "sharpe {}", m.sharpe_ratio);
    assert!(m.max_drawdown < 0.005);
    assert!(m.annualized_volatility > 0.0);
}

// =============================================================================
// Drawdown
// =============================================================================

#[test]
fn max_drawdown_and_duration() {
    // Peak 110 at index 1, trough 105, recovery at index 4.
    let m = compute_metrics(
        &snapshots_from_equity(&[100.0, 110.0, 105.0, 108.0, 112.0, 111.0]),
        &[],
        None,
        0.04,
    );
    assert!((m.max_drawdown - (1.0 - 105.0 / 110.0)).abs() < 1e-12);
    assert_eq!(m.max_drawdown_duration_days, 3);
}

#[test]
fn unrecovered_drawdown_counts_toward_duration() {
    let m = compute_metrics(
        &snapshots_from_equity(&[100.0, 120.0, 95.0, 96.0, 97.0]),
        &[],
        None,
        0.04,
    );
    // Peak at index 1, never recovered: 3 snapshots of tail.
    assert_eq!(m.max_drawdown_duration_days, 3);
    assert!((m.max_drawdown - (1.0 - 95.0 / 120.0)).abs() < 1e-12);
}

// =============================================================================
// Tail risk
// =============================================================================

#[test]
fn var_and_cvar_from_sorted_tail() {
    // 20 returns: worst -10%, second worst -5%; floor(0.05 * 20) = 1.
    let mut returns = vec![0.001; 18];
    returns.push(-0.10);
    returns.push(-0.05);
    let m = compute_metrics(&snapshots_from_returns(&returns), &[], None, 0.04);

    assert!((m.var_95 - 0.05).abs() < 1e-9, "var {}", m.var_95);
    assert!((m.cvar_95 - 0.10).abs() < 1e-9, "cvar {}", m.cvar_95);
}

#[test]
fn cvar_zero_when_tail_slice_empty() {
    // 10 returns: floor(0.05 * 10) = 0 -> empty tail slice.
    let returns = vec![0.01, -0.02, 0.01, 0.0, 0.01, -0.01, 0.02, 0.0, 0.01, -0.005];
    let m = compute_metrics(&snapshots_from_returns(&returns), &[], None, 0.04);
    assert_eq!(m.cvar_95, 0.0);
    // VaR falls on the worst return.
    assert!((m.var_95 - 0.02).abs() < 1e-9);
}

// =============================================================================
// Trade statistics
// =============================================================================

#[test]
fn trade_win_rate_and_profit_factor() {
    let trades = vec![
        trade(200.0, 100.0, 10),
        trade(200.0, 100.0, 10),
        trade(-200.0, 100.0, 10),
    ];
    let m = compute_metrics(&snapshots_from_equity(&[100.0; 10]), &trades, None, 0.04);

    assert_eq!(m.total_trades, 3);
    assert_eq!(m.winning_trades, 2);
    assert_eq!(m.losing_trades, 1);
    assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-12);
    assert!((m.profit_factor - 2.0).abs() < 1e-12);
    assert!((m.avg_winner - 200.0).abs() < 1e-12);
    assert!((m.avg_loser + 200.0).abs() < 1e-12);
}

#[test]
fn profit_factor_sentinel_with_no_losses() {
    let trades = vec![trade(50.0, 100.0, 5), trade(10.0, 100.0, 5)];
    let m = compute_metrics(&snapshots_from_equity(&[100.0; 10]), &trades, None, 0.04);
    assert_eq!(m.profit_factor, 999.0);

    // Breakeven-only trades: zero, not a sentinel.
    let flat = vec![trade(0.0, 100.0, 5)];
    let m = compute_metrics(&snapshots_from_equity(&[100.0; 10]), &flat, None, 0.04);
    assert_eq!(m.profit_factor, 0.0);
    assert_eq!(m.losing_trades, 1);
}

#[test]
fn turnover_scales_entry_notional_by_equity_and_years() {
    // 2 returns -> years = 2/252; one entry of 100 notional on 100 equity.
    let trades = vec![trade(0.0, 10.0, 10)];
    let m = compute_metrics(&snapshots_from_equity(&[100.0; 3]), &trades, None, 0.04);
    let expected = 100.0 / 100.0 / (2.0 / 252.0);
    assert!((m.turnover - expected).abs() < 1e-9);
}

// =============================================================================
// Benchmark-relative
// =============================================================================

#[test]
fn beta_alpha_information_ratio() {
    let bench: Vec<f64> = (0..100)
        .map(|i| if i % 2 == 0 { 0.01 } else { -0.008 })
        .collect();
    let strat: Vec<f64> = bench.iter().map(|b| 2.0 * b).collect();

    let m = compute_metrics(&snapshots_from_returns(&strat), &[], Some(&bench), 0.04);

    let beta = m.beta.expect("beta");
    assert!((beta - 2.0).abs() < 1e-9, "beta {beta}");

    let mean_b = bench.iter().sum::<f64>() / bench.len() as f64;
    let expected_alpha = (m.annualized_return - 0.04) - beta * (mean_b * 252.0 - 0.04);
    assert!((m.alpha.unwrap() - expected_alpha).abs() < 1e-9);
    assert!(m.information_ratio.is_some());
}

#[test]
fn benchmark_absent_disables_relative_metrics() {
    let m = compute_metrics(&snapshots_from_returns(&[0.01; 30]), &[], None, 0.04);
    assert!(m.beta.is_none());
    assert!(m.alpha.is_none());
    assert!(m.information_ratio.is_none());
}

#[test]
fn benchmark_truncated_to_shorter_series() {
    let bench = vec![0.01, -0.01];
    let strat = vec![0.02, -0.02, 0.01, 0.005, -0.003];
    let m = compute_metrics(&snapshots_from_returns(&strat), &[], Some(&bench), 0.04);
    // Two paired points is enough to regress.
    assert!(m.beta.is_some());
}

#[test]
fn zero_variance_benchmark_yields_no_beta() {
    let bench = vec![0.01; 30];
    let strat = vec![0.02; 30];
    let m = compute_metrics(&snapshots_from_returns(&strat), &[], Some(&bench), 0.04);
    assert!(m.beta.is_none());
    assert!(m.alpha.is_none());
}

// =============================================================================
// Daily return extraction
// =============================================================================

#[test]
fn daily_returns_recover_inputs() {
    let input = [0.01, -0.02, 0.03];
    let snaps = snapshots_from_returns(&input);
    let out = daily_returns(&snaps);
    assert_eq!(out.len(), 3);
    for (a, b) in input.iter().zip(&out) {
        assert!((a - b).abs() < 1e-12);
    }
}

// =============================================================================
// Monte Carlo
// =============================================================================

#[test]
fn monte_carlo_terminal_return_is_order_invariant() {
    let trades = vec![
        trade(100.0, 100.0, 10),
        trade(-50.0, 100.0, 10),
        trade(30.0, 100.0, 10),
    ];
    let summary = run_monte_carlo(&trades, 100_000.0, 200);

    assert_eq!(summary.simulations, 200);
    // Compound product does not depend on ordering.
    let expected = (1.0 + 0.10) * (1.0 - 0.05) * (1.0 + 0.03) - 1.0;
    assert!((summary.mean_return - expected).abs() < 1e-9);
    assert!((summary.median_return - expected).abs() < 1e-9);
    assert_eq!(summary.probability_of_profit, 1.0);
    assert!(summary.median_max_drawdown >= 0.0);
}

#[test]
fn monte_carlo_empty_inputs() {
    let summary = run_monte_carlo(&[], 100_000.0, 100);
    assert_eq!(summary.simulations, 0);
    let summary = run_monte_carlo(&[trade(1.0, 100.0, 1)], 100_000.0, 0);
    assert_eq!(summary.simulations, 0);
}

// =============================================================================
// Trade analysis
// =============================================================================

#[test]
fn expectancy_matches_hand_computation() {
    let trades = vec![
        trade(100.0, 100.0, 10),
        trade(100.0, 100.0, 10),
        trade(-50.0, 100.0, 10),
        trade(100.0, 100.0, 10),
        trade(-50.0, 100.0, 10),
    ];
    let exp = compute_expectancy(&trades).expect("expectancy");

    // 0.6 * 100 - 0.4 * 50 = 40 per trade on a 1000 average notional.
    assert!((exp.expectancy - 40.0).abs() < 1e-12);
    assert!((exp.expectancy_pct - 0.04).abs() < 1e-12);
    assert!((exp.payoff_ratio - 2.0).abs() < 1e-12);
    assert!((exp.kelly_fraction - 0.4).abs() < 1e-12);
    assert!(exp.sqn > 0.0);
}

#[test]
fn expectancy_needs_enough_trades() {
    let trades = vec![trade(10.0, 100.0, 1); 4];
    assert!(compute_expectancy(&trades).is_none());
}

#[test]
fn streaks_and_conditional_probabilities() {
    // W W L L L W
    let trades = vec![
        trade(10.0, 100.0, 1),
        trade(10.0, 100.0, 1),
        trade(-10.0, 100.0, 1),
        trade(-10.0, 100.0, 1),
        trade(-10.0, 100.0, 1),
        trade(10.0, 100.0, 1),
    ];
    let s = analyze_streaks(&trades).expect("streaks");

    assert_eq!(s.max_win_streak, 2);
    assert_eq!(s.max_loss_streak, 3);
    assert!((s.avg_win_streak - 1.5).abs() < 1e-12);
    assert!((s.avg_loss_streak - 3.0).abs() < 1e-12);
    assert!((s.prob_win_after_win - 0.5).abs() < 1e-12);
    assert!((s.prob_win_after_loss - 1.0 / 3.0).abs() < 1e-12);
}

// =============================================================================
// Risk profile
// =============================================================================

#[test]
fn drawdown_series_tracks_running_peak() {
    let snaps = snapshots_from_equity(&[100.0, 110.0, 99.0, 110.0]);
    let dd = drawdown_series(&snaps);
    assert!((dd[0] - 0.0).abs() < 1e-12);
    assert!((dd[1] - 0.0).abs() < 1e-12);
    assert!((dd[2] - 0.1).abs() < 1e-12);
    assert!((dd[3] - 0.0).abs() < 1e-12);
}

#[test]
fn cdar_averages_the_worst_tail() {
    let mut dd = vec![0.0; 9];
    dd.push(0.2);
    // ceil(0.05 * 10) = 1 -> just the worst observation.
    assert!((conditional_drawdown_at_risk(&dd, 0.05).unwrap() - 0.2).abs() < 1e-12);
    assert!(conditional_drawdown_at_risk(&dd[..5], 0.05).is_none());
}

#[test]
fn risk_profile_on_choppy_curve() {
    let returns: Vec<f64> = (0..80)
        .map(|i| if i % 2 == 0 { 0.01 } else { -0.005 })
        .collect();
    let snaps = snapshots_from_returns(&returns);
    let profile = compute_risk_profile(&snaps, DEFAULT_RISK_FREE_RATE);

    let omega = profile.omega_ratio.expect("omega");
    assert!(omega > 1.0, "omega {omega}");
    let tail = profile.tail_ratio.expect("tail");
    assert!((tail - 2.0).abs() < 0.2, "tail {tail}");
    assert!(profile.ulcer_index.expect("ulcer") > 0.0);
    assert!(profile.pain_index.expect("pain") > 0.0);
    assert!(profile.cdar_95.expect("cdar") > 0.0);
    // 80 returns, 63-bar window: 18 rolling points.
    assert_eq!(profile.rolling_sharpe.len(), 18);
}

#[test]
fn risk_profile_short_curve_is_mostly_empty() {
    let snaps = snapshots_from_returns(&[0.01, -0.01]);
    let profile = compute_risk_profile(&snaps, DEFAULT_RISK_FREE_RATE);
    assert!(profile.tail_ratio.is_none());
    assert!(profile.cdar_95.is_none());
    assert!(profile.rolling_sharpe.is_empty());
}

// =============================================================================
// Resampling statistics
// =============================================================================

#[test]
fn bootstrap_bands_are_ordered() {
    let mut trades = Vec::new();
    for _ in 0..6 {
        trades.push(trade(100.0, 100.0, 10));
    }
    for _ in 0..4 {
        trades.push(trade(-50.0, 100.0, 10));
    }
    let ci = bootstrap_confidence_intervals(&trades, 500).expect("ci");

    assert_eq!(ci.bootstrap_samples, 500);
    assert!(ci.sharpe_lower <= ci.sharpe_upper);
    assert!(ci.win_rate_lower <= ci.win_rate_upper);
    assert!(ci.profit_factor_lower <= ci.profit_factor_upper);
    assert!(ci.win_rate_lower >= 0.0 && ci.win_rate_upper <= 1.0);
}

#[test]
fn bootstrap_requires_trades_and_samples() {
    assert!(bootstrap_confidence_intervals(&[], 100).is_none());
    assert!(bootstrap_confidence_intervals(&vec![trade(1.0, 100.0, 1); 10], 0).is_none());
}

#[test]
fn sharpe_p_value_behaves() {
    assert_eq!(sharpe_p_value(1.5, 2), 1.0);
    assert!((sharpe_p_value(0.0, 252) - 1.0).abs() < 1e-9);
    let p_weak = sharpe_p_value(0.5, 252);
    let p_strong = sharpe_p_value(2.0, 252);
    assert!(p_strong < p_weak);
    assert!(p_strong < 0.05);
}
