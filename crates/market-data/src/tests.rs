use std::io::Write as _;

use backtest_core::{Bar, DataError};

use crate::loader::{load_bars_csv, read_bars};
use crate::store::MarketDataStore;

/// Helper: a flat bar at the given price.
fn bar(ts: i64, price: f64) -> Bar {
    Bar {
        timestamp: ts,
        open: price,
        high: price,
        low: price,
        close: price,
        volume: 1_000_000.0,
        adj_close: price,
    }
}

/// Helper: bars with the given adjusted closes, one day apart.
fn series(prices: &[f64]) -> Vec<Bar> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| bar(86_400 * i as i64, p))
        .collect()
}

fn store_with(symbol: &str, prices: &[f64]) -> MarketDataStore {
    let mut store = MarketDataStore::new();
    store.add_symbol(symbol, series(prices)).unwrap();
    store
}

// =============================================================================
// Store queries
// =============================================================================

#[test]
fn symbols_are_sorted_and_stable() {
    let mut store = MarketDataStore::new();
    store.add_symbol("MSFT", series(&[10.0])).unwrap();
    store.add_symbol("AAPL", series(&[10.0])).unwrap();
    store.add_symbol("GOOG", series(&[10.0])).unwrap();

    assert_eq!(store.symbols(), vec!["AAPL", "GOOG", "MSFT"]);
    assert_eq!(store.symbols(), store.symbols());
}

#[test]
fn bars_unknown_symbol_errors() {
    let store = store_with("AAPL", &[10.0, 11.0]);
    match store.bars("TSLA") {
        Err(DataError::UnknownSymbol(s)) => assert_eq!(s, "TSLA"),
        other => panic!("expected UnknownSymbol, got {other:?}"),
    }
}

#[test]
fn prices_at_omits_short_series() {
    let mut store = MarketDataStore::new();
    store.add_symbol("AAPL", series(&[1.0, 2.0, 3.0])).unwrap();
    store.add_symbol("MSFT", series(&[5.0, 6.0])).unwrap();

    let prices = store.prices_at(2);
    assert_eq!(prices.len(), 1);
    assert_eq!(prices["AAPL"], 3.0);

    let prices = store.prices_at(1);
    assert_eq!(prices.len(), 2);
    assert_eq!(prices["MSFT"], 6.0);
}

#[test]
fn bars_are_sorted_on_insertion() {
    let mut store = MarketDataStore::new();
    let mut bars = series(&[1.0, 2.0, 3.0]);
    bars.reverse();
    store.add_symbol("AAPL", bars).unwrap();

    let stored = store.bars("AAPL").unwrap();
    assert!(stored.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[test]
fn duplicate_timestamps_rejected() {
    let mut store = MarketDataStore::new();
    let bars = vec![bar(0, 1.0), bar(0, 2.0)];
    assert!(matches!(
        store.add_symbol("AAPL", bars),
        Err(DataError::MalformedInput(_))
    ));
    // Nothing partially registered.
    assert!(store.is_empty());
}

#[test]
fn invalid_ohlc_rejected() {
    let mut store = MarketDataStore::new();
    let mut b = bar(0, 100.0);
    b.low = 101.0; // low above close
    assert!(matches!(
        store.add_symbol("AAPL", vec![b]),
        Err(DataError::MalformedInput(_))
    ));
}

#[test]
fn common_range_tracks_shortest_symbol() {
    let mut store = MarketDataStore::new();
    assert_eq!(store.common_range(), None);

    store.add_symbol("AAPL", series(&[1.0, 2.0, 3.0, 4.0])).unwrap();
    store.add_symbol("MSFT", series(&[1.0, 2.0, 3.0])).unwrap();
    assert_eq!(store.common_range(), Some((0, 2)));
}

// =============================================================================
// Rolling analytics
// =============================================================================

#[test]
fn rolling_return_matches_hand_computation() {
    let store = store_with("AAPL", &[100.0, 105.0, 110.0, 99.0]);

    // 110 / 100 - 1
    let r = store.rolling_return("AAPL", 2, 2);
    assert!((r - 0.10).abs() < 1e-12);

    // Window not available.
    assert_eq!(store.rolling_return("AAPL", 1, 2), 0.0);
    assert_eq!(store.rolling_return("AAPL", 10, 2), 0.0);
    assert_eq!(store.rolling_return("NOPE", 2, 2), 0.0);
}

#[test]
fn rolling_return_zero_on_nonpositive_base() {
    let mut store = MarketDataStore::new();
    let mut bars = series(&[0.0, 100.0, 110.0]);
    bars[0].adj_close = 0.0;
    store.add_symbol("AAPL", bars).unwrap();
    assert_eq!(store.rolling_return("AAPL", 2, 2), 0.0);
}

#[test]
fn rolling_volatility_matches_sample_std() {
    // Returns: +10%, -10%, +10%, -10%
    let store = store_with("AAPL", &[100.0, 110.0, 99.0, 108.9, 98.01]);
    let vol = store.rolling_volatility("AAPL", 4, 4);

    let rets = [0.10, -0.10, 0.10, -0.10];
    let mean: f64 = rets.iter().sum::<f64>() / 4.0;
    let var: f64 = rets.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 3.0;
    let expected = (var * 252.0).sqrt();
    assert!((vol - expected).abs() < 1e-9, "vol {vol} != {expected}");
}

#[test]
fn rolling_volatility_degenerate_cases() {
    let store = store_with("AAPL", &[100.0, 100.0, 100.0, 100.0]);
    // Constant prices: zero variance.
    assert_eq!(store.rolling_volatility("AAPL", 3, 3), 0.0);
    // Fewer than 2 returns.
    assert_eq!(store.rolling_volatility("AAPL", 3, 1), 0.0);
    // Window not available.
    assert_eq!(store.rolling_volatility("AAPL", 2, 3), 0.0);
    assert_eq!(store.rolling_volatility("NOPE", 3, 2), 0.0);
}

// =============================================================================
// Benchmark designation
// =============================================================================

#[test]
fn benchmark_defaults_to_spy() {
    let mut store = MarketDataStore::new();
    assert_eq!(store.benchmark_symbol(), "SPY");
    assert!(!store.has_benchmark());

    store.add_symbol("SPY", series(&[400.0, 401.0])).unwrap();
    assert!(store.has_benchmark());

    let custom = MarketDataStore::with_benchmark("QQQ");
    assert_eq!(custom.benchmark_symbol(), "QQQ");
}

// =============================================================================
// CSV ingestion
// =============================================================================

const CSV_HEADER: &str = "timestamp,open,high,low,close,volume,adj_close\n";

#[test]
fn read_bars_parses_valid_csv() {
    let data = format!(
        "{CSV_HEADER}86400,100.0,105.0,99.0,103.0,1000000,103.0\n172800,103.5,108.0,102.0,106.0,1200000,106.0\n"
    );
    let bars = read_bars(data.as_bytes()).unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].timestamp, 86_400);
    assert_eq!(bars[1].adj_close, 106.0);
}

#[test]
fn read_bars_rejects_malformed_row() {
    let data = format!("{CSV_HEADER}86400,100.0,105.0,99.0,not_a_number,1000000,103.0\n");
    assert!(matches!(
        read_bars(data.as_bytes()),
        Err(DataError::MalformedInput(_))
    ));
}

#[test]
fn read_bars_rejects_invariant_violation() {
    // high below open
    let data = format!("{CSV_HEADER}86400,100.0,95.0,90.0,94.0,1000000,94.0\n");
    assert!(matches!(
        read_bars(data.as_bytes()),
        Err(DataError::MalformedInput(_))
    ));
}

#[test]
fn load_bars_csv_roundtrip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "{CSV_HEADER}86400,10.0,11.0,9.0,10.5,500000,10.5\n"
    )
    .unwrap();

    let bars = load_bars_csv(file.path()).unwrap();
    assert_eq!(bars.len(), 1);
    assert_eq!(bars[0].volume, 500_000.0);
}

#[test]
fn load_bars_csv_missing_file_errors() {
    assert!(matches!(
        load_bars_csv(std::path::Path::new("/nonexistent/bars.csv")),
        Err(DataError::MalformedInput(_))
    ));
}
