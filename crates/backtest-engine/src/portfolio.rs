use std::collections::HashMap;

use backtest_core::{
    EngineError, Fill, Order, OrderSide, PortfolioSnapshot, Position, TradeRecord,
};

/// The single source of truth for cash, open positions, and realized trades.
///
/// Fills are applied atomically: a rejected BUY leaves cash and positions
/// untouched. Positions whose quantity reaches zero are removed.
#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: f64,
    positions: HashMap<String, Position>,
    trades: Vec<TradeRecord>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            cash: initial_capital,
            positions: HashMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Signed share count for a symbol; 0 when not held.
    pub fn position_qty(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    /// Closed-trade records, append-only within a run.
    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<TradeRecord> {
        self.trades
    }

    /// Clear all positions and trade history; set cash to `new_capital`.
    pub fn reset(&mut self, new_capital: f64) {
        self.cash = new_capital;
        self.positions.clear();
        self.trades.clear();
    }

    /// Apply an order against the ledger.
    ///
    /// The fill price is the reference price moved adversely by
    /// `slippage_fraction` (up on BUY, down on SELL). A BUY whose total cost
    /// exceeds current cash fails with `InsufficientCash` and changes
    /// nothing. A SELL never fails on cash: shorting is funded by its own
    /// proceeds.
    pub fn execute_fill(
        &mut self,
        order: &Order,
        reference_price: f64,
        slippage_fraction: f64,
        commission: f64,
    ) -> Result<Fill, EngineError> {
        let qty = order.quantity;
        debug_assert!(qty > 0, "order quantity must be positive");

        let fill_price = match order.side {
            OrderSide::Buy => reference_price * (1.0 + slippage_fraction),
            OrderSide::Sell => reference_price * (1.0 - slippage_fraction),
        };
        let slippage_cost = (fill_price - reference_price).abs() * qty as f64;

        match order.side {
            OrderSide::Buy => {
                let cost = fill_price * qty as f64 + commission;
                if cost > self.cash {
                    return Err(EngineError::InsufficientCash {
                        required: cost,
                        available: self.cash,
                    });
                }
                self.apply_buy(order, fill_price, qty);
                self.cash -= cost;
            }
            OrderSide::Sell => {
                let proceeds = fill_price * qty as f64 - commission;
                self.apply_sell(order, fill_price, qty);
                self.cash += proceeds;
            }
        }

        self.positions.retain(|_, p| p.quantity != 0);

        Ok(Fill {
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: qty,
            fill_price,
            slippage_cost,
            commission,
            timestamp: order.timestamp,
        })
    }

    fn apply_buy(&mut self, order: &Order, fill_price: f64, qty: i64) {
        let trade = {
            let pos = self.entry(order);
            let prev_qty = pos.quantity;
            let mut trade = None;

            if prev_qty >= 0 {
                // Adding to (or opening) a long: weighted-average basis.
                let total = prev_qty + qty;
                pos.avg_cost =
                    (pos.avg_cost * prev_qty as f64 + fill_price * qty as f64) / total as f64;
                if prev_qty == 0 {
                    pos.entry_timestamp = order.timestamp;
                }
            } else {
                // Covering a short: realize on the covered portion.
                let covered = qty.min(-prev_qty);
                let pnl = (pos.avg_cost - fill_price) * covered as f64;
                pos.realized_pnl += pnl;
                trade = Some(TradeRecord {
                    symbol: order.symbol.clone(),
                    side: OrderSide::Buy,
                    quantity: covered,
                    entry_price: pos.avg_cost,
                    exit_price: fill_price,
                    pnl,
                    return_pct: trade_return(pnl, pos.avg_cost, covered),
                    holding_days: 0,
                    entry_time: pos.entry_timestamp,
                    exit_time: order.timestamp,
                });
                if qty > -prev_qty {
                    // The buy exceeds the short: the remainder opens a long.
                    pos.avg_cost = fill_price;
                    pos.entry_timestamp = order.timestamp;
                }
            }
            pos.quantity = prev_qty + qty;
            trade
        };
        if let Some(trade) = trade {
            self.trades.push(trade);
        }
    }

    fn apply_sell(&mut self, order: &Order, fill_price: f64, qty: i64) {
        let trade = {
            let pos = self.entry(order);
            let prev_qty = pos.quantity;
            let mut trade = None;

            if prev_qty > 0 {
                // Closing (part of) a long.
                let closed = qty.min(prev_qty);
                let pnl = (fill_price - pos.avg_cost) * closed as f64;
                pos.realized_pnl += pnl;
                trade = Some(TradeRecord {
                    symbol: order.symbol.clone(),
                    side: OrderSide::Sell,
                    quantity: closed,
                    entry_price: pos.avg_cost,
                    exit_price: fill_price,
                    pnl,
                    return_pct: trade_return(pnl, pos.avg_cost, closed),
                    holding_days: 0,
                    entry_time: pos.entry_timestamp,
                    exit_time: order.timestamp,
                });
                if qty > prev_qty {
                    // The sell exceeds the long: the excess opens a short.
                    pos.avg_cost = fill_price;
                    pos.entry_timestamp = order.timestamp;
                }
            } else {
                // Extending (or opening) a short: weighted-average basis.
                let total = -prev_qty + qty;
                pos.avg_cost =
                    (pos.avg_cost * -prev_qty as f64 + fill_price * qty as f64) / total as f64;
                if prev_qty == 0 {
                    pos.entry_timestamp = order.timestamp;
                }
            }
            pos.quantity = prev_qty - qty;
            trade
        };
        if let Some(trade) = trade {
            self.trades.push(trade);
        }
    }

    fn entry(&mut self, order: &Order) -> &mut Position {
        self.positions
            .entry(order.symbol.clone())
            .or_insert_with(|| Position {
                symbol: order.symbol.clone(),
                quantity: 0,
                avg_cost: 0.0,
                realized_pnl: 0.0,
                unrealized_pnl: 0.0,
                entry_timestamp: order.timestamp,
            })
    }

    /// Cash plus signed position value. Symbols missing from `prices`
    /// contribute zero; the caller supplies prices for the holdings it cares
    /// about.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let positions: f64 = self
            .positions
            .values()
            .filter_map(|p| prices.get(&p.symbol).map(|price| p.quantity as f64 * price))
            .sum();
        self.cash + positions
    }

    /// Gross exposure: sum of |quantity * price|.
    pub fn positions_value(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .filter_map(|p| {
                prices
                    .get(&p.symbol)
                    .map(|price| (p.quantity as f64 * price).abs())
            })
            .sum()
    }

    /// Refresh each open position's unrealized P&L against current prices.
    pub fn mark_to_market(&mut self, prices: &HashMap<String, f64>) {
        for pos in self.positions.values_mut() {
            if let Some(price) = prices.get(&pos.symbol) {
                pos.unrealized_pnl = (price - pos.avg_cost) * pos.quantity as f64;
            }
        }
    }

    /// Build the per-bar snapshot row. `drawdown` is left at zero for the
    /// simulation loop to fill against its running peak.
    pub fn snapshot(
        &self,
        timestamp: i64,
        prices: &HashMap<String, f64>,
        previous_equity: f64,
    ) -> PortfolioSnapshot {
        let equity = self.equity(prices);
        let daily_return = if previous_equity > 0.0 {
            equity / previous_equity - 1.0
        } else {
            0.0
        };
        PortfolioSnapshot {
            timestamp,
            equity,
            cash: self.cash,
            positions_value: self.positions_value(prices),
            daily_return,
            drawdown: 0.0,
            num_positions: self.positions.len(),
        }
    }
}

fn trade_return(pnl: f64, entry_price: f64, quantity: i64) -> f64 {
    let basis = entry_price * quantity as f64;
    if basis > 0.0 {
        pnl / basis
    } else {
        0.0
    }
}
