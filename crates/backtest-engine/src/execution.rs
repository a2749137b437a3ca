use backtest_core::BacktestConfig;

/// Hard cap on the slippage fraction, regardless of participation.
pub const MAX_SLIPPAGE_FRACTION: f64 = 0.01;

/// Participation assumed when a bar reports no volume.
const FALLBACK_PARTICIPATION: f64 = 0.01;

const TRADING_DAYS: f64 = 252.0;

/// Per-order slippage and commission, plus volatility-adaptive sizing.
///
/// Slippage scales with the square root of participation (order size over
/// bar volume), the standard impact shape for equity fills.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionModel {
    slippage_bps: f64,
    commission_rate: f64,
}

impl ExecutionModel {
    pub fn new(slippage_bps: f64, commission_rate: f64) -> Self {
        Self {
            slippage_bps,
            commission_rate,
        }
    }

    pub fn from_config(config: &BacktestConfig) -> Self {
        Self::new(config.slippage_bps, config.commission_rate)
    }

    /// Fractional price penalty for an order of `quantity` shares against a
    /// bar of `bar_volume` shares. Non-decreasing in |quantity| and capped
    /// at 1%.
    pub fn slippage_fraction(&self, bar_volume: f64, quantity: i64) -> f64 {
        let base = self.slippage_bps / 10_000.0;
        let participation = if bar_volume <= 0.0 {
            FALLBACK_PARTICIPATION
        } else {
            quantity.unsigned_abs() as f64 / bar_volume
        };
        let fraction = base * (1.0 + 2.0 * participation.sqrt());
        fraction.min(MAX_SLIPPAGE_FRACTION)
    }

    /// Commission charged on the order's gross notional.
    pub fn commission(&self, price: f64, quantity: i64) -> f64 {
        self.commission_rate * (price * quantity as f64).abs()
    }

    /// Shares targeting a constant daily dollar-volatility budget.
    ///
    /// The annualised vol target is converted to a daily dollar budget, the
    /// notional that spends it at the symbol's volatility is capped at
    /// `max_position_pct` of equity, and the result floors to whole shares.
    /// Returns 0 on non-positive price or volatility.
    pub fn volatility_sized_qty(
        equity: f64,
        price: f64,
        annualized_vol: f64,
        vol_target: f64,
        max_position_pct: f64,
    ) -> i64 {
        if price <= 0.0 || annualized_vol <= 0.0 {
            return 0;
        }
        let target_dollar_vol = equity * vol_target / TRADING_DAYS.sqrt();
        let target_notional = target_dollar_vol / annualized_vol;
        let notional = target_notional.min(equity * max_position_pct);
        if notional <= 0.0 {
            return 0;
        }
        (notional / price).floor() as i64
    }
}
