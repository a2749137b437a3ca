use backtest_core::{BacktestConfig, Signal};
use market_data::MarketDataStore;

use crate::strategy::Strategy;

/// Short-horizon mean reversion: on each rebalance bar, z-score the latest
/// adjusted close against a trailing window and go long the oversold names
/// (z below the entry threshold), equally weighted.
#[derive(Debug)]
pub struct MeanReversionStrategy {
    window: usize,
    entry_z: f64,
    last_selection: Vec<String>,
}

impl MeanReversionStrategy {
    pub fn new(window: usize, entry_z: f64) -> Self {
        Self {
            window,
            entry_z,
            last_selection: Vec::new(),
        }
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new(20, -1.0)
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn signals(
        &mut self,
        market: &MarketDataStore,
        bar_index: usize,
        config: &BacktestConfig,
    ) -> Vec<Signal> {
        let rebalance = config.rebalance_frequency.max(1);
        if bar_index % rebalance != 0 {
            return Vec::new();
        }
        if bar_index + 1 < self.window {
            self.last_selection.clear();
            return Vec::new();
        }

        let benchmark = market.benchmark_symbol().to_string();
        let mut oversold: Vec<(String, f64)> = Vec::new();
        for symbol in market.symbols() {
            if symbol == benchmark {
                continue;
            }
            let Ok(bars) = market.bars(symbol) else {
                continue;
            };
            if bars.len() <= bar_index {
                continue;
            }
            let window = &bars[bar_index + 1 - self.window..=bar_index];
            let n = window.len() as f64;
            let mean = window.iter().map(|b| b.adj_close).sum::<f64>() / n;
            let var = window
                .iter()
                .map(|b| (b.adj_close - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0);
            if var <= 0.0 {
                continue;
            }
            let z = (bars[bar_index].adj_close - mean) / var.sqrt();
            if z < self.entry_z {
                oversold.push((symbol.to_string(), z));
            }
        }

        if oversold.is_empty() {
            return self
                .last_selection
                .drain(..)
                .map(|s| Signal::flat(s, bar_index))
                .collect();
        }

        // Most oversold first.
        oversold.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let weight = 1.0 / oversold.len() as f64;
        self.last_selection = oversold.iter().map(|(s, _)| s.clone()).collect();

        oversold
            .into_iter()
            .map(|(symbol, z)| {
                let strength = ((-z) / 3.0).clamp(0.0, 1.0);
                Signal::long(symbol, weight, strength, bar_index)
            })
            .collect()
    }
}
