//! Built-in strategies: instances of the [`Strategy`](crate::Strategy)
//! contract used by the CLI and the test suite. Both are rebalance-gated:
//! off-schedule bars return the empty set, which the loop treats as "hold".

mod mean_reversion;
mod momentum;

pub use mean_reversion::MeanReversionStrategy;
pub use momentum::MomentumStrategy;
