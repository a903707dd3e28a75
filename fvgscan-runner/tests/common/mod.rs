//! Shared fixtures for runner integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use fvgscan_core::data::InMemoryCandleStore;
use fvgscan_core::domain::{Candle, Timeframe};
use fvgscan_core::params::{ParameterSet, ParameterStore};
use fvgscan_runner::synthetic::resample;

pub const SYMBOL: &str = "BTC/USDT";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Steady 1m uptrend: close rises by exactly 1.0 per bar, so every triple on
/// every timeframe leaves an unfilled bullish gap and each bar's low touches
/// the previous close.
pub fn trend_candles(symbol: &str, bars: usize) -> Vec<Candle> {
    (0..bars)
        .map(|i| {
            let close = 100.0 + i as f64;
            Candle {
                symbol: symbol.to_string(),
                timeframe: Timeframe::M1,
                open_time: t0() + chrono::Duration::minutes(i as i64),
                open: close - 0.8,
                high: close + 0.2,
                low: close - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Store holding the 1m trend and its 5m resample.
pub fn trend_store(symbols: &[&str], bars: usize) -> InMemoryCandleStore {
    let mut store = InMemoryCandleStore::new();
    for symbol in symbols {
        let m1 = trend_candles(symbol, bars);
        store.extend(resample(&m1, Timeframe::M5));
        store.extend(m1);
    }
    store
}

/// Defaults with a two-timeframe quorum.
pub fn two_tf_params() -> ParameterStore {
    ParameterStore::new(ParameterSet {
        min_timeframe_confluence: 2,
        ..Default::default()
    })
    .unwrap()
}
