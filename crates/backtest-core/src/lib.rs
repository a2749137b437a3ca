//! Shared model types and error kinds for the backtesting workspace.
//!
//! Every other crate consumes these: bars and signals flow in, orders and
//! fills move through the portfolio ledger, snapshots and trade records flow
//! out to the metrics calculator and the CSV exporters.

pub mod errors;
pub mod models;

pub use errors::{DataError, EngineError};
pub use models::*;
