use serde::{Deserialize, Serialize};

use crate::errors::DataError;

/// One OHLCV record for one symbol for one trading day.
///
/// `adj_close` is the split/dividend-adjusted close and is the engine's
/// canonical price for returns, sizing, and fills.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Seconds since epoch; strictly increasing within one symbol.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub adj_close: f64,
}

impl Bar {
    /// Check the OHLC sandwich invariant and non-negativity.
    pub fn validate(&self) -> Result<(), DataError> {
        let lo = self.open.min(self.close);
        let hi = self.open.max(self.close);
        if !(self.low <= lo && hi <= self.high) {
            return Err(DataError::MalformedInput(format!(
                "bar at {} violates low <= open/close <= high (o={} h={} l={} c={})",
                self.timestamp, self.open, self.high, self.low, self.close
            )));
        }
        if self.open < 0.0
            || self.high < 0.0
            || self.low < 0.0
            || self.close < 0.0
            || self.adj_close < 0.0
            || self.volume < 0.0
        {
            return Err(DataError::MalformedInput(format!(
                "bar at {} has a negative field",
                self.timestamp
            )));
        }
        Ok(())
    }
}

// --- Signals and orders ---

/// Direction of a strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Long,
    /// Declared but not acted on by the v1 simulation loop.
    Short,
    Flat,
}

/// A directive emitted by a strategy for one symbol on one bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    /// Desired fraction of equity; 0 when direction is FLAT.
    pub target_weight: f64,
    /// Informational conviction in 0..1.
    pub strength: f64,
    /// Bar index the signal was generated on.
    pub timestamp: usize,
}

impl Signal {
    pub fn long(symbol: impl Into<String>, target_weight: f64, strength: f64, bar: usize) -> Self {
        Self {
            symbol: symbol.into(),
            direction: SignalDirection::Long,
            target_weight,
            strength,
            timestamp: bar,
        }
    }

    pub fn flat(symbol: impl Into<String>, bar: usize) -> Self {
        Self {
            symbol: symbol.into(),
            direction: SignalDirection::Flat,
            target_weight: 0.0,
            strength: 0.0,
            timestamp: bar,
        }
    }
}

/// Order side. Serialized as the literal `BUY` / `SELL` in trade exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// An instruction to transact on the current bar. Orders are always market
/// orders; `limit_price` is the reference price (the bar's adj_close), not a
/// limit constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    /// Positive share count.
    pub quantity: i64,
    pub limit_price: f64,
    /// Bar index.
    pub timestamp: usize,
}

/// The realization of an order. Fills are complete or rejected; there are no
/// partial fills.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: i64,
    /// Reference price adjusted adversely for slippage.
    pub fill_price: f64,
    /// Absolute slippage cost in currency.
    pub slippage_cost: f64,
    pub commission: f64,
    /// Bar index.
    pub timestamp: usize,
}

// --- Portfolio state ---

/// Net holding in one symbol. Removed from the ledger when quantity is zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed share count: positive = long, negative = short.
    pub quantity: i64,
    /// Basis for the open quantity; only meaningful while quantity != 0.
    pub avg_cost: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    /// Bar index the open quantity was first established on.
    pub entry_timestamp: usize,
}

/// Emitted on every close or partial close of a position.
///
/// Field order matches the `trades.csv` column layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    /// The closing side: SELL closes a long, BUY covers a short.
    pub side: OrderSide,
    pub quantity: i64,
    /// The average cost that was being closed.
    pub entry_price: f64,
    pub exit_price: f64,
    /// Realized P&L on the closed portion, net of nothing (costs are cash
    /// effects, not trade attributes).
    pub pnl: f64,
    /// Signed fraction: pnl / (entry_price * quantity).
    pub return_pct: f64,
    /// Always zero in-core; computed externally.
    pub holding_days: i64,
    /// Bar index of entry.
    pub entry_time: usize,
    /// Bar index of exit.
    pub exit_time: usize,
}

/// One row per simulated bar.
///
/// Field order matches the `equity_curve.csv` column layout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Epoch seconds of the first symbol's bar at this index.
    pub timestamp: i64,
    /// Cash plus positions marked to bar close.
    pub equity: f64,
    pub cash: f64,
    /// Sum of |quantity * price| over open positions.
    pub positions_value: f64,
    /// Arithmetic return vs the previous snapshot's equity.
    pub daily_return: f64,
    /// 1 - equity / running peak, in [0, 1].
    pub drawdown: f64,
    pub num_positions: usize,
}

// --- Configuration ---

/// Recognised configuration for a backtest run. All keys optional in JSON;
/// unspecified keys take the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    /// Fraction of |price * qty| charged per fill.
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,
    /// Base participation-free slippage in basis points.
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: f64,
    /// Upper bound on |position notional| / equity.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,
    /// Drawdown fraction that trips the circuit breaker.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    /// When true, size positions by inverse volatility; when false, by
    /// signal target weight.
    #[serde(default = "default_volatility_sizing")]
    pub volatility_sizing: bool,
    /// Annualised portfolio vol target used as the sizing numerator.
    #[serde(default = "default_vol_target")]
    pub vol_target: f64,
    /// Informational default for strategies.
    #[serde(default = "default_lookback_window")]
    pub lookback_window: usize,
    /// Informational default for strategies, in bars.
    #[serde(default = "default_rebalance_frequency")]
    pub rebalance_frequency: usize,
}

fn default_initial_capital() -> f64 {
    1_000_000.0
}
fn default_commission_rate() -> f64 {
    0.001
}
fn default_slippage_bps() -> f64 {
    5.0
}
fn default_max_position_pct() -> f64 {
    0.10
}
fn default_max_drawdown_pct() -> f64 {
    0.20
}
fn default_volatility_sizing() -> bool {
    true
}
fn default_vol_target() -> f64 {
    0.15
}
fn default_lookback_window() -> usize {
    252
}
fn default_rebalance_frequency() -> usize {
    21
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            commission_rate: default_commission_rate(),
            slippage_bps: default_slippage_bps(),
            max_position_pct: default_max_position_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            volatility_sizing: default_volatility_sizing(),
            vol_target: default_vol_target(),
            lookback_window: default_lookback_window(),
            rebalance_frequency: default_rebalance_frequency(),
        }
    }
}

// --- Walk-forward ---

/// One (train, test) window pair. All bounds are inclusive bar indices with
/// `train_start <= train_end < test_start <= test_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub window_id: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
}

impl WalkForwardWindow {
    pub fn train_len(&self) -> usize {
        self.train_end - self.train_start + 1
    }

    pub fn test_len(&self) -> usize {
        self.test_end - self.test_start + 1
    }
}
