use backtest_core::{BacktestConfig, Signal};
use market_data::MarketDataStore;

/// The contract between the simulation loop and a trading strategy.
///
/// `signals` is called exactly once per bar. It must not mutate the market
/// data store (it only gets a shared borrow) but may mutate internal
/// strategy state. Returning an empty set means "no change": the loop places
/// no orders on that bar. A non-empty batch is a full restatement: any held
/// symbol it does not mention is closed.
pub trait Strategy {
    /// Stable name for the lifetime of the instance.
    fn name(&self) -> &str;

    /// Signals for one bar. Symbols within a batch must be unique and
    /// target weights non-negative; violations abort the run.
    fn signals(
        &mut self,
        market: &MarketDataStore,
        bar_index: usize,
        config: &BacktestConfig,
    ) -> Vec<Signal>;
}

/// Constructor used by the walk-forward orchestrator: every window evaluation
/// builds its own fresh strategy instance.
pub type StrategyFactory = dyn Fn(&BacktestConfig) -> Box<dyn Strategy> + Send + Sync;
