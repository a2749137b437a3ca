//! Synthetic daily bar generation.
//!
//! Geometric Brownian motion with per-symbol drift/volatility jitter. One
//! possible source of bars for demos and benchmarks; the engine consumes
//! them exactly like loaded history.

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Normal;

use backtest_core::Bar;
use market_data::MarketDataStore;

const TRADING_DAYS: f64 = 252.0;
const SECONDS_PER_DAY: i64 = 86_400;

/// Parameters for one symbol's GBM path.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticConfig {
    pub start_price: f64,
    /// Annualised drift.
    pub drift: f64,
    /// Annualised volatility.
    pub volatility: f64,
    pub bars: usize,
    /// Epoch seconds of the first bar.
    pub start_timestamp: i64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start_price: 100.0,
            drift: 0.07,
            volatility: 0.20,
            bars: 504,
            start_timestamp: 1_577_836_800, // 2020-01-01
        }
    }
}

/// Generate one GBM bar path. Bars satisfy the OHLC sandwich invariant and
/// carry strictly increasing daily timestamps.
pub fn generate_bars<R: Rng>(config: &SyntheticConfig, rng: &mut R) -> Vec<Bar> {
    let normal = Normal::new(0.0, 1.0).expect("unit normal");
    let dt = 1.0 / TRADING_DAYS;
    let sigma = config.volatility;
    let step_drift = (config.drift - 0.5 * sigma * sigma) * dt;
    let step_vol = sigma * dt.sqrt();

    let mut bars = Vec::with_capacity(config.bars);
    let mut price = config.start_price;

    for i in 0..config.bars {
        let z: f64 = normal.sample(rng);
        let open = price;
        let close = open * (step_drift + step_vol * z).exp();

        let wick_up: f64 = rng.gen_range(0.0..0.5) * step_vol;
        let wick_down: f64 = rng.gen_range(0.0..0.5) * step_vol;
        let high = open.max(close) * (1.0 + wick_up);
        let low = open.min(close) * (1.0 - wick_down);

        let volume = rng.gen_range(500_000.0..2_000_000.0);

        bars.push(Bar {
            timestamp: config.start_timestamp + SECONDS_PER_DAY * i as i64,
            open,
            high,
            low,
            close,
            volume,
            adj_close: close,
        });
        price = close;
    }
    bars
}

/// Populate a store with one GBM path per symbol, each with its own drift
/// and volatility jitter. The benchmark symbol, when listed, gets a calmer
/// index-like path.
pub fn generate_universe<R: Rng>(
    symbols: &[String],
    bars: usize,
    rng: &mut R,
) -> anyhow::Result<MarketDataStore> {
    let mut store = MarketDataStore::new();
    for symbol in symbols {
        let index_like = symbol == store.benchmark_symbol();
        let config = SyntheticConfig {
            start_price: rng.gen_range(20.0..400.0),
            drift: if index_like {
                0.07
            } else {
                rng.gen_range(-0.05..0.20)
            },
            volatility: if index_like {
                0.15
            } else {
                rng.gen_range(0.15..0.45)
            },
            bars,
            ..SyntheticConfig::default()
        };
        store.add_symbol(symbol.clone(), generate_bars(&config, rng))?;
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_bars_satisfy_invariants() {
        let mut rng = rand::thread_rng();
        let config = SyntheticConfig {
            bars: 300,
            ..SyntheticConfig::default()
        };
        let bars = generate_bars(&config, &mut rng);

        assert_eq!(bars.len(), 300);
        for bar in &bars {
            bar.validate().unwrap();
            assert!(bar.volume > 0.0);
        }
        assert!(bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn universe_registers_every_symbol() {
        let mut rng = rand::thread_rng();
        let symbols = vec!["AAA".to_string(), "BBB".to_string(), "SPY".to_string()];
        let store = generate_universe(&symbols, 100, &mut rng).unwrap();

        assert_eq!(store.symbols().len(), 3);
        assert!(store.has_benchmark());
        assert_eq!(store.common_range(), Some((0, 99)));
    }
}
