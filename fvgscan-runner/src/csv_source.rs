//! File-backed candle source: one CSV per (symbol, timeframe).
//!
//! Layout: `<dir>/<SYMBOL>_<timeframe>.csv`, with `/` in the symbol replaced
//! by `_` (so `BTC/USDT` on 1h is `BTC_USDT_1h.csv`). Columns:
//! `open_time,open,high,low,close,volume`, open time in RFC 3339.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use fvgscan_core::data::{find_missing_ranges, CandleRange, CandleSource, DataError};
use fvgscan_core::domain::{Candle, Timeframe};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CandleRow {
    open_time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// File name for one partition.
pub fn candle_file_name(symbol: &str, timeframe: Timeframe) -> String {
    let safe: String = symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{safe}_{timeframe}.csv")
}

#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.dir.join(candle_file_name(symbol, timeframe))
    }

    /// Every candle in one file, validated for order and sanity.
    pub fn read_all(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>, DataError> {
        let path = self.path_for(symbol, timeframe);
        if !path.exists() {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                timeframe,
            });
        }
        let mut reader = csv::Reader::from_path(&path)
            .map_err(|e| DataError::Io(format!("{}: {e}", path.display())))?;

        let mut candles: Vec<Candle> = Vec::new();
        for row in reader.deserialize::<CandleRow>() {
            let row = row.map_err(|e| DataError::Invalid(format!("{}: {e}", path.display())))?;
            let candle = Candle {
                symbol: symbol.to_string(),
                timeframe,
                open_time: row.open_time,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            };
            if !candle.is_sane() {
                return Err(DataError::Invalid(format!(
                    "{}: inconsistent OHLCV at {}",
                    path.display(),
                    candle.open_time
                )));
            }
            if candles.last().is_some_and(|prev| prev.open_time >= candle.open_time) {
                return Err(DataError::OutOfOrder {
                    symbol: symbol.to_string(),
                    timeframe,
                    at: candle.open_time,
                });
            }
            candles.push(candle);
        }
        debug!(symbol, timeframe = %timeframe, count = candles.len(), "read candle file");
        Ok(candles)
    }
}

impl CandleSource for CsvCandleSource {
    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleRange, DataError> {
        let mut candles = self.read_all(symbol, timeframe)?;
        if start >= end {
            return Ok(CandleRange::default());
        }
        candles.retain(|c| c.open_time >= start && c.open_time < end);
        let missing = find_missing_ranges(symbol, timeframe, &candles, start, end);
        Ok(CandleRange { candles, missing })
    }
}

/// Write candles of one partition to `<dir>/<file>`, replacing the file.
pub fn write_candles_csv(dir: &Path, candles: &[Candle]) -> anyhow::Result<Option<PathBuf>> {
    let Some(first) = candles.first() else {
        return Ok(None);
    };
    std::fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    let path = dir.join(candle_file_name(&first.symbol, first.timeframe));
    let mut writer =
        csv::Writer::from_path(&path).with_context(|| format!("create {}", path.display()))?;
    for c in candles {
        writer.serialize(CandleRow {
            open_time: c.open_time,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
        })?;
    }
    writer.flush().with_context(|| format!("flush {}", path.display()))?;
    Ok(Some(path))
}
