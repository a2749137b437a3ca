use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use analytics::{compute_metrics, PerformanceMetrics, DEFAULT_RISK_FREE_RATE};
use backtest_core::{
    BacktestConfig, EngineError, Order, OrderSide, PortfolioSnapshot, Position, Signal,
    SignalDirection, TradeRecord,
};
use market_data::MarketDataStore;

use crate::circuit_breaker::CircuitBreaker;
use crate::execution::ExecutionModel;
use crate::portfolio::Portfolio;
use crate::strategy::Strategy;

/// Bar volume assumed when a symbol has no bar at the current index, a
/// fallback for ragged series tails.
pub const DEFAULT_BAR_VOLUME: f64 = 1_000_000.0;

/// Lookback, in bars, for the sizing volatility estimate.
pub const VOL_SIZING_WINDOW: usize = 60;

/// Everything a completed run hands to callers: the snapshot series, the
/// trade history, the benchmark daily returns (when the benchmark symbol was
/// registered), and the computed metrics record.
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub strategy_name: String,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub trades: Vec<TradeRecord>,
    /// Positions still open when the run ended, sorted by symbol.
    pub final_positions: Vec<Position>,
    pub benchmark_returns: Option<Vec<f64>>,
    pub metrics: PerformanceMetrics,
}

/// The per-bar orchestrator. Owns nothing mutable between runs: each `run`
/// builds a fresh portfolio and circuit breaker, so one engine can evaluate
/// many ranges over the same shared market data.
pub struct BacktestEngine<'m> {
    config: BacktestConfig,
    market: &'m MarketDataStore,
    execution: ExecutionModel,
}

impl<'m> BacktestEngine<'m> {
    pub fn new(config: BacktestConfig, market: &'m MarketDataStore) -> Self {
        let execution = ExecutionModel::from_config(&config);
        Self {
            config,
            market,
            execution,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Simulate `strategy` over `range` (inclusive bar indices), defaulting
    /// to the market's common range.
    pub fn run(
        &self,
        strategy: &mut dyn Strategy,
        range: Option<(usize, usize)>,
    ) -> Result<BacktestRun, EngineError> {
        let (first, last) = self.market.common_range().ok_or(EngineError::EmptyMarket)?;
        let (start, end) = range.unwrap_or((first, last));
        if start > end || end > last {
            return Err(EngineError::InvalidRange { start, end, last });
        }

        let mut portfolio = Portfolio::new(self.config.initial_capital);
        let mut breaker = CircuitBreaker::new(self.config.max_drawdown_pct);
        let mut snapshots = Vec::with_capacity(end - start + 1);
        let benchmark_returns = self.benchmark_returns(start, end);

        let mut previous_equity = self.config.initial_capital;
        let mut peak_equity = self.config.initial_capital;

        for bar in start..=end {
            let prices = self.market.prices_at(bar);
            let current_equity = portfolio.equity(&prices);

            if breaker.check(current_equity) {
                warn!(
                    bar,
                    equity = current_equity,
                    "circuit breaker tripped; liquidating"
                );
                self.liquidate_all(&mut portfolio, &prices, bar);
                portfolio.mark_to_market(&prices);
                let snap = self.finish_snapshot(
                    &portfolio,
                    &prices,
                    bar,
                    previous_equity,
                    &mut peak_equity,
                );
                snapshots.push(snap);
                break;
            }

            let signals = strategy.signals(self.market, bar, &self.config);
            validate_signals(&signals)?;

            // An empty batch means "no change"; a non-empty batch restates
            // the book, so held symbols it omits default to a zero target.
            if !signals.is_empty() {
                let targets = self.target_weights(&portfolio, &signals);
                self.rebalance_to(&mut portfolio, &targets, &prices, current_equity, bar)?;
            }

            portfolio.mark_to_market(&prices);
            let snap =
                self.finish_snapshot(&portfolio, &prices, bar, previous_equity, &mut peak_equity);
            previous_equity = snap.equity;
            snapshots.push(snap);
        }

        let mut final_positions: Vec<Position> = portfolio.positions().cloned().collect();
        final_positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let trades = portfolio.into_trades();
        let metrics = compute_metrics(
            &snapshots,
            &trades,
            benchmark_returns.as_deref(),
            DEFAULT_RISK_FREE_RATE,
        );
        info!(
            strategy = strategy.name(),
            bars = snapshots.len(),
            trades = trades.len(),
            total_return = metrics.total_return,
            sharpe = metrics.sharpe_ratio,
            "run complete"
        );

        Ok(BacktestRun {
            strategy_name: strategy.name().to_string(),
            snapshots,
            trades,
            final_positions,
            benchmark_returns,
            metrics,
        })
    }

    /// Target weight per symbol: held symbols default to close (weight 0),
    /// LONG signals override with their weight, FLAT signals force 0. SHORT
    /// is currently unsupported and leaves the map untouched.
    fn target_weights(&self, portfolio: &Portfolio, signals: &[Signal]) -> BTreeMap<String, f64> {
        let mut targets: BTreeMap<String, f64> = portfolio
            .positions()
            .map(|p| (p.symbol.clone(), 0.0))
            .collect();
        for signal in signals {
            match signal.direction {
                SignalDirection::Long => {
                    targets.insert(signal.symbol.clone(), signal.target_weight);
                }
                SignalDirection::Flat => {
                    targets.insert(signal.symbol.clone(), 0.0);
                }
                SignalDirection::Short => {
                    debug!(symbol = %signal.symbol, "SHORT signal ignored (unsupported)");
                }
            }
        }
        targets
    }

    /// Diff targets against holdings and route the deltas through the
    /// execution model. A BUY rejected for cash is dropped; the bar goes on.
    fn rebalance_to(
        &self,
        portfolio: &mut Portfolio,
        targets: &BTreeMap<String, f64>,
        prices: &HashMap<String, f64>,
        current_equity: f64,
        bar: usize,
    ) -> Result<(), EngineError> {
        for (symbol, &weight) in targets {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            if price <= 0.0 {
                continue;
            }

            let current_qty = portfolio.position_qty(symbol);
            let target_qty = if self.config.volatility_sizing && weight > 0.0 {
                let vol = self
                    .market
                    .rolling_volatility(symbol, bar, VOL_SIZING_WINDOW);
                ExecutionModel::volatility_sized_qty(
                    current_equity,
                    price,
                    vol,
                    self.config.vol_target,
                    self.config.max_position_pct,
                )
            } else {
                (current_equity * weight / price).floor() as i64
            };

            let delta = target_qty - current_qty;
            if delta == 0 {
                continue;
            }

            let volume = self.bar_volume(symbol, bar);
            let slippage = self.execution.slippage_fraction(volume, delta);
            let commission = self.execution.commission(price, delta.abs());
            let order = Order {
                symbol: symbol.clone(),
                side: if delta > 0 {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                },
                quantity: delta.abs(),
                limit_price: price,
                timestamp: bar,
            };

            match portfolio.execute_fill(&order, price, slippage, commission) {
                Ok(fill) => {
                    debug!(
                        symbol = %fill.symbol,
                        side = %fill.side,
                        qty = fill.quantity,
                        price = fill.fill_price,
                        "filled"
                    );
                }
                Err(EngineError::InsufficientCash {
                    required,
                    available,
                }) => {
                    warn!(
                        symbol = %symbol,
                        bar,
                        required,
                        available,
                        "order dropped: insufficient cash"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Best-effort close of every open position at the bar's reference
    /// price. Positions without a price this bar are left open.
    fn liquidate_all(
        &self,
        portfolio: &mut Portfolio,
        prices: &HashMap<String, f64>,
        bar: usize,
    ) {
        let mut symbols: Vec<String> = portfolio.positions().map(|p| p.symbol.clone()).collect();
        symbols.sort();

        for symbol in symbols {
            let qty = portfolio.position_qty(&symbol);
            if qty == 0 {
                continue;
            }
            let Some(&price) = prices.get(&symbol) else {
                warn!(symbol = %symbol, bar, "no price to liquidate against; leaving open");
                continue;
            };
            if price <= 0.0 {
                continue;
            }

            let volume = self.bar_volume(&symbol, bar);
            let slippage = self.execution.slippage_fraction(volume, qty);
            let commission = self.execution.commission(price, qty.abs());
            let order = Order {
                symbol: symbol.clone(),
                side: if qty > 0 {
                    OrderSide::Sell
                } else {
                    OrderSide::Buy
                },
                quantity: qty.abs(),
                limit_price: price,
                timestamp: bar,
            };
            if let Err(err) = portfolio.execute_fill(&order, price, slippage, commission) {
                warn!(symbol = %symbol, bar, %err, "liquidation fill failed");
            }
        }
    }

    fn finish_snapshot(
        &self,
        portfolio: &Portfolio,
        prices: &HashMap<String, f64>,
        bar: usize,
        previous_equity: f64,
        peak_equity: &mut f64,
    ) -> PortfolioSnapshot {
        let mut snap = portfolio.snapshot(self.snapshot_timestamp(bar), prices, previous_equity);
        if snap.equity > *peak_equity {
            *peak_equity = snap.equity;
        }
        snap.drawdown = if *peak_equity > 0.0 {
            (1.0 - snap.equity / *peak_equity).max(0.0)
        } else {
            0.0
        };
        snap
    }

    /// The first (sorted) symbol's bar timestamp at this index; the index
    /// itself when no symbol has a bar there.
    fn snapshot_timestamp(&self, bar: usize) -> i64 {
        for symbol in self.market.symbols() {
            if let Ok(bars) = self.market.bars(symbol) {
                if let Some(b) = bars.get(bar) {
                    return b.timestamp;
                }
            }
        }
        bar as i64
    }

    fn bar_volume(&self, symbol: &str, bar: usize) -> f64 {
        self.market
            .bars(symbol)
            .ok()
            .and_then(|bars| bars.get(bar))
            .map(|b| b.volume)
            .unwrap_or(DEFAULT_BAR_VOLUME)
    }

    /// Arithmetic daily returns of the benchmark over `[start+1, end]`, or
    /// `None` when the benchmark symbol is absent or does not cover the
    /// range. Absence disables benchmark-relative metrics without failing
    /// the run.
    fn benchmark_returns(&self, start: usize, end: usize) -> Option<Vec<f64>> {
        if !self.market.has_benchmark() {
            return None;
        }
        let bars = self.market.bars(self.market.benchmark_symbol()).ok()?;
        if bars.len() <= end {
            return None;
        }
        let returns = (start + 1..=end)
            .map(|i| {
                let prev = bars[i - 1].adj_close;
                if prev > 0.0 {
                    bars[i].adj_close / prev - 1.0
                } else {
                    0.0
                }
            })
            .collect();
        Some(returns)
    }
}

/// Structural checks on a signal batch: unique symbols, non-negative finite
/// weights. Violations are fatal to the run, never silently corrected.
fn validate_signals(signals: &[Signal]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for signal in signals {
        if !seen.insert(signal.symbol.as_str()) {
            return Err(EngineError::InvalidSignal(format!(
                "duplicate symbol {} in batch",
                signal.symbol
            )));
        }
        if !signal.target_weight.is_finite() || signal.target_weight < 0.0 {
            return Err(EngineError::InvalidSignal(format!(
                "negative or non-finite target weight for {}",
                signal.symbol
            )));
        }
    }
    Ok(())
}
