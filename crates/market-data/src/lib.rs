//! Per-symbol daily bar storage and rolling analytics.
//!
//! The store owns its bar sequences for the lifetime of a backtest and hands
//! out borrow-style views; the simulation loop and strategies query prices
//! and rolling statistics without allocating per call (beyond the per-bar
//! price map the loop itself asks for).

pub mod loader;
pub mod store;

#[cfg(test)]
mod tests;

pub use loader::{load_bars_csv, read_bars};
pub use store::{MarketDataStore, DEFAULT_BENCHMARK_SYMBOL};
