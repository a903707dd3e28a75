//! Candle source trait and structured error types.
//!
//! The `CandleSource` trait abstracts over where candles come from (in-memory
//! store, CSV files) so the pipeline never performs I/O itself.

use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A contiguous run of expected candles that the source does not have.
/// `start` is the first missing open time, `end` the open time after the last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRange {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub missing_bars: usize,
}

/// Structured error types for candle access.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("no candles for {symbol} {timeframe}")]
    NoData { symbol: String, timeframe: Timeframe },

    #[error("{symbol} {timeframe}: {} missing range(s) in candle data", .ranges.len())]
    DataGap {
        symbol: String,
        timeframe: Timeframe,
        ranges: Vec<MissingRange>,
    },

    #[error("{symbol} {timeframe}: candle at {at} is out of order")]
    OutOfOrder {
        symbol: String,
        timeframe: Timeframe,
        at: DateTime<Utc>,
    },

    #[error("invalid candle data: {0}")]
    Invalid(String),

    #[error("candle I/O error: {0}")]
    Io(String),
}

/// Candles for one (symbol, timeframe) over a half-open time range, with any
/// missing stretches made explicit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandleRange {
    pub candles: Vec<Candle>,
    pub missing: Vec<MissingRange>,
}

impl CandleRange {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Earliest missing open time, if any.
    pub fn first_missing(&self) -> Option<DateTime<Utc>> {
        self.missing.iter().map(|r| r.start).min()
    }

    /// Fail with `DataError::DataGap` unless every expected candle is present.
    pub fn require_complete(self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Candle>, DataError> {
        if self.is_complete() {
            Ok(self.candles)
        } else {
            Err(DataError::DataGap {
                symbol: symbol.to_string(),
                timeframe,
                ranges: self.missing,
            })
        }
    }
}

/// Read access to stored candles.
pub trait CandleSource: Send + Sync {
    /// Candles with `start <= open_time < end`, oldest first.
    fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CandleRange, DataError>;
}
