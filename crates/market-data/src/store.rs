use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use backtest_core::{Bar, DataError};

/// Trading days per year; the annualisation factor for all rolling stats.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Benchmark symbol assumed when none is configured.
pub const DEFAULT_BENCHMARK_SYMBOL: &str = "SPY";

/// Owns the per-symbol ordered bar sequences and answers point and rolling
/// window queries.
///
/// Symbols iterate in sorted order, so `symbols()` is stable across calls.
#[derive(Debug, Clone, Default)]
pub struct MarketDataStore {
    series: BTreeMap<String, Vec<Bar>>,
    benchmark: Option<String>,
}

impl MarketDataStore {
    /// Empty store with the default benchmark symbol ("SPY").
    pub fn new() -> Self {
        Self {
            series: BTreeMap::new(),
            benchmark: None,
        }
    }

    /// Empty store with an explicit benchmark symbol.
    pub fn with_benchmark(symbol: impl Into<String>) -> Self {
        Self {
            series: BTreeMap::new(),
            benchmark: Some(symbol.into()),
        }
    }

    /// The designated benchmark symbol. Its absence from the registered
    /// universe disables benchmark-relative metrics but never fails a run.
    pub fn benchmark_symbol(&self) -> &str {
        self.benchmark.as_deref().unwrap_or(DEFAULT_BENCHMARK_SYMBOL)
    }

    /// Whether bars are registered for the benchmark symbol.
    pub fn has_benchmark(&self) -> bool {
        self.series.contains_key(self.benchmark_symbol())
    }

    /// Register one symbol's bars. Bars are sorted by timestamp on insertion;
    /// duplicate timestamps or invariant-violating bars reject the whole
    /// symbol (nothing is partially registered).
    pub fn add_symbol(&mut self, symbol: impl Into<String>, mut bars: Vec<Bar>) -> Result<(), DataError> {
        let symbol = symbol.into();
        for bar in &bars {
            bar.validate()?;
        }
        bars.sort_by_key(|b| b.timestamp);
        for w in bars.windows(2) {
            if w[1].timestamp <= w[0].timestamp {
                return Err(DataError::MalformedInput(format!(
                    "{symbol}: duplicate bar timestamp {}",
                    w[1].timestamp
                )));
            }
        }
        debug!(symbol = %symbol, bars = bars.len(), "registered symbol");
        self.series.insert(symbol, bars);
        Ok(())
    }

    /// The ordered bar sequence for one symbol.
    pub fn bars(&self, symbol: &str) -> Result<&[Bar], DataError> {
        self.series
            .get(symbol)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()))
    }

    /// Sorted, stable list of registered symbols.
    pub fn symbols(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Adjusted close per symbol at `bar_index`. Symbols whose sequence is
    /// too short are silently omitted.
    pub fn prices_at(&self, bar_index: usize) -> HashMap<String, f64> {
        self.series
            .iter()
            .filter_map(|(symbol, bars)| {
                bars.get(bar_index)
                    .map(|b| (symbol.clone(), b.adj_close))
            })
            .collect()
    }

    /// Trailing arithmetic return `adj[end] / adj[end - period] - 1`.
    ///
    /// Returns 0 when the window is not available (including an unregistered
    /// symbol) or the denominator is non-positive.
    pub fn rolling_return(&self, symbol: &str, end_index: usize, period: usize) -> f64 {
        let Some(bars) = self.series.get(symbol) else {
            return 0.0;
        };
        if period == 0 || end_index < period || end_index >= bars.len() {
            return 0.0;
        }
        let base = bars[end_index - period].adj_close;
        if base <= 0.0 {
            return 0.0;
        }
        bars[end_index].adj_close / base - 1.0
    }

    /// Annualised sample standard deviation of the last `period` daily
    /// arithmetic returns ending at `end_index` (variance scaled by 252
    /// before the square root).
    ///
    /// Returns 0 when fewer than 2 returns are available or the variance is
    /// non-positive.
    pub fn rolling_volatility(&self, symbol: &str, end_index: usize, period: usize) -> f64 {
        let Some(bars) = self.series.get(symbol) else {
            return 0.0;
        };
        if period < 2 || end_index < period || end_index >= bars.len() {
            return 0.0;
        }

        let mut returns = Vec::with_capacity(period);
        for i in (end_index - period + 1)..=end_index {
            let prev = bars[i - 1].adj_close;
            if prev > 0.0 {
                returns.push(bars[i].adj_close / prev - 1.0);
            } else {
                returns.push(0.0);
            }
        }
        if returns.len() < 2 {
            return 0.0;
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        if variance <= 0.0 {
            return 0.0;
        }
        (variance * TRADING_DAYS_PER_YEAR).sqrt()
    }

    /// Inclusive `(first, last)` bar indices valid for every registered
    /// symbol, which is the simulation horizon. `None` when the store is empty or
    /// any symbol has no bars.
    pub fn common_range(&self) -> Option<(usize, usize)> {
        let shortest = self.series.values().map(Vec::len).min()?;
        if shortest == 0 {
            return None;
        }
        Some((0, shortest - 1))
    }
}
