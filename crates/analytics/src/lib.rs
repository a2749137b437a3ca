//! Performance analytics for completed backtest runs.
//!
//! The metrics calculator borrows the snapshot and trade slices produced by
//! the simulation loop; it owns nothing and never mutates its inputs. Beyond
//! the headline record there are drawdown-shape analytics, per-trade quality
//! statistics, and resampling significance tools.

pub mod metrics;
pub mod monte_carlo;
pub mod risk_profile;
pub mod statistical;
pub mod trade_analysis;

#[cfg(test)]
mod tests;

pub use metrics::{compute_metrics, PerformanceMetrics, DEFAULT_RISK_FREE_RATE};
pub use monte_carlo::{run_monte_carlo, MonteCarloSummary};
pub use risk_profile::{compute_risk_profile, RiskProfile};
pub use statistical::{bootstrap_confidence_intervals, sharpe_p_value, ConfidenceIntervals};
pub use trade_analysis::{
    analyze_streaks, compute_expectancy, ExpectancyAnalysis, StreakDistribution,
};
