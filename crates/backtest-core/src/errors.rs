use thiserror::Error;

/// Errors raised by the market data layer.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// A query referenced a symbol that was never registered.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// A bar failed to parse or violated a bar invariant. The offending
    /// symbol is never partially registered.
    #[error("malformed bar input: {0}")]
    MalformedInput(String),
}

/// Errors raised by the simulation engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A BUY order's cost exceeds current cash. Recovered locally by the
    /// simulation loop: the offending order is dropped and the bar continues.
    #[error("insufficient cash: order requires {required:.2}, available {available:.2}")]
    InsufficientCash { required: f64, available: f64 },

    /// The market data store has no common bar range to simulate over.
    #[error("market data store is empty or has no common bar range")]
    EmptyMarket,

    /// An explicit bar range does not fit the store's common range.
    #[error("invalid bar range: [{start}, {end}] outside common range ending at {last}")]
    InvalidRange {
        start: usize,
        end: usize,
        last: usize,
    },

    /// A strategy emitted a structurally invalid signal batch (duplicate
    /// symbol, negative weight). Fatal: surfaced, never silently corrected.
    #[error("invalid signal batch: {0}")]
    InvalidSignal(String),

    #[error(transparent)]
    Data(#[from] DataError),
}
