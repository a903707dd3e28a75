//! Candle: the fundamental market data unit.

use crate::domain::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle for one symbol on one timeframe.
///
/// `open_time` is unique and strictly increasing within a (symbol, timeframe)
/// partition. A candle is immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// The instant the candle closes; it is only visible to analysis from then on.
    pub fn close_time(&self) -> DateTime<Utc> {
        self.open_time + self.timeframe.duration()
    }

    /// Returns true if any OHLCV field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLCV sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    /// Whether `price` lies within [low, high].
    pub fn contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_candle() -> Candle {
        Candle {
            symbol: "BTC/USDT".into(),
            timeframe: Timeframe::M5,
            open_time: Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut candle = sample_candle();
        candle.open = f64::NAN;
        assert!(candle.is_void());
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_detects_insane_high_low() {
        let mut candle = sample_candle();
        candle.high = 97.0; // below low
        assert!(!candle.is_sane());
    }

    #[test]
    fn close_time_adds_timeframe() {
        let candle = sample_candle();
        assert_eq!(
            candle.close_time(),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 35, 0).unwrap()
        );
    }

    #[test]
    fn contains_is_inclusive() {
        let candle = sample_candle();
        assert!(candle.contains(98.0));
        assert!(candle.contains(105.0));
        assert!(!candle.contains(105.01));
    }

    #[test]
    fn candle_serialization_roundtrip() {
        let candle = sample_candle();
        let json = serde_json::to_string(&candle).unwrap();
        let deser: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(candle, deser);
    }
}
