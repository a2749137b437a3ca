use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use backtest_core::{Bar, DataError};

/// One CSV row. Header order is `timestamp,open,high,low,close,volume,adj_close`
/// but deserialization matches by header name, so column order is free.
#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    adj_close: f64,
}

impl From<BarRow> for Bar {
    fn from(row: BarRow) -> Self {
        Bar {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            adj_close: row.adj_close,
        }
    }
}

/// Parse one symbol's bars from a CSV file.
///
/// Any malformed row fails the whole load: the caller registers the returned
/// bars only on success, so a partial symbol never enters the store.
pub fn load_bars_csv(path: &Path) -> Result<Vec<Bar>, DataError> {
    let file = File::open(path).map_err(|e| {
        DataError::MalformedInput(format!("{}: {e}", path.display()))
    })?;
    let bars = read_bars(file)?;
    debug!(path = %path.display(), bars = bars.len(), "loaded bar csv");
    Ok(bars)
}

/// Parse bars from any reader. Rows are validated against the bar invariants
/// before being returned.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>, DataError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();
    for (i, record) in csv_reader.deserialize::<BarRow>().enumerate() {
        let row = record.map_err(|e| {
            DataError::MalformedInput(format!("row {}: {e}", i + 1))
        })?;
        let bar = Bar::from(row);
        bar.validate()?;
        bars.push(bar);
    }
    Ok(bars)
}
