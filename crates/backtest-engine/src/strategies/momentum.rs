use backtest_core::{BacktestConfig, Signal};
use market_data::MarketDataStore;

use crate::strategy::Strategy;

/// Cross-sectional momentum: on each rebalance bar, rank the universe by
/// trailing `lookback_window` return and go long the top quartile of
/// positive-momentum names, equally weighted.
///
/// The benchmark symbol is excluded from the tradeable universe.
#[derive(Debug, Default)]
pub struct MomentumStrategy {
    last_selection: Vec<String>,
}

impl MomentumStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        "momentum"
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
        let lookback = config.lookback_window;
        if bar_index < lookback {
            self.last_selection.clear();
            return Vec::new();
        }

        let benchmark = market.benchmark_symbol().to_string();
        let mut ranked: Vec<(String, f64)> = market
            .symbols()
            .into_iter()
            .filter(|s| *s != benchmark)
            .map(|s| (s.to_string(), market.rolling_return(s, bar_index, lookback)))
            .filter(|(_, r)| *r > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let take = (ranked.len() / 4).max(1).min(ranked.len());
        if take == 0 {
            // No positive momentum anywhere: flatten whatever we held.
            return self
                .last_selection
                .drain(..)
                .map(|s| Signal::flat(s, bar_index))
                .collect();
        }

        let top_return = ranked[0].1;
        let weight = 1.0 / take as f64;
        let selected = &ranked[..take];
        self.last_selection = selected.iter().map(|(s, _)| s.clone()).collect();

        selected
            .iter()
            .map(|(symbol, r)| {
                let strength = if top_return > 0.0 {
                    (r / top_return).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                Signal::long(symbol.clone(), weight, strength, bar_index)
            })
            .collect()
    }
}
