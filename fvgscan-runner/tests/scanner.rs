//! Live scanner delivering setups to a sink.

mod common;

use std::sync::Arc;

use chrono::Duration;
use fvgscan_core::domain::Timeframe;
use fvgscan_core::params::ParameterStore;
use fvgscan_core::setup::FixedEquity;
use fvgscan_core::sink::CollectingSink;
use fvgscan_runner::scanner::Scanner;
use fvgscan_runner::synthetic::resample;

use common::{t0, trend_candles, trend_store, two_tf_params, SYMBOL};

fn scanner(sink: Arc<CollectingSink>) -> Scanner {
    Scanner::new(
        &[SYMBOL.to_string(), "ETH/USDT".to_string()],
        &[Timeframe::M1, Timeframe::M5],
        sink,
        Box::new(FixedEquity(10_000.0)),
    )
}

#[test]
fn confluence_reaches_sink() {
    let sink = Arc::new(CollectingSink::new());
    let s = scanner(sink.clone());
    let params = two_tf_params();
    let m1 = trend_candles(SYMBOL, 30);
    let mut batch = resample(&m1, Timeframe::M5);
    batch.extend(m1);

    let report = s.ingest(&params, batch, t0() + Duration::minutes(30));
    assert_eq!(report.candles_pushed, 36);
    assert_eq!(report.signals.len(), 1);
    assert_eq!(report.setups.len(), 1);
    assert_eq!(sink.len(), 1);

    let (signal, setup) = &sink.received()[0];
    assert_eq!(signal.id, setup.signal_id);
    assert_eq!(setup.entry, 129.0);
    assert!(setup.stop_loss < setup.entry && setup.entry < setup.take_profit);
}

#[test]
fn unchanged_state_does_not_reemit() {
    let sink = Arc::new(CollectingSink::new());
    let s = scanner(sink.clone());
    let params = two_tf_params();
    let m1 = trend_candles(SYMBOL, 30);
    let mut batch = resample(&m1, Timeframe::M5);
    batch.extend(m1);
    let at = t0() + Duration::minutes(30);

    s.ingest(&params, batch.clone(), at);
    let again = s.ingest(&params, batch, at);
    assert_eq!(again.candles_pushed, 0);
    assert!(again.signals.is_empty());
    assert_eq!(sink.len(), 1);
}

#[test]
fn incremental_ingest_signals_once_higher_timeframe_confirms() {
    let sink = Arc::new(CollectingSink::new());
    let s = scanner(sink.clone());
    let params = two_tf_params();
    let m1 = trend_candles(SYMBOL, 20);
    let m5 = resample(&m1, Timeframe::M5);

    let mut first_signal_at = None;
    for (i, c) in m1.iter().enumerate() {
        let at = c.close_time();
        let mut batch = vec![c.clone()];
        batch.extend(m5.iter().filter(|h| h.close_time() == at).cloned());
        let report = s.ingest(&params, batch, at);
        if first_signal_at.is_none() && !report.signals.is_empty() {
            first_signal_at = Some(i);
        }
    }
    assert_eq!(first_signal_at, Some(14));
}

#[test]
fn scan_from_source_matches_direct_ingest() {
    let store = trend_store(&[SYMBOL], 30);
    let params = two_tf_params();
    let sink = Arc::new(CollectingSink::new());
    let s = scanner(sink.clone());
    let report = s
        .scan_source(&store, &params, t0(), t0() + Duration::minutes(30))
        .unwrap();
    assert_eq!(report.signals.len(), 1);
    assert_eq!(sink.len(), 1);
}

#[test]
fn default_quorum_needs_three_timeframes() {
    let sink = Arc::new(CollectingSink::new());
    let s = scanner(sink.clone());
    let params = ParameterStore::default();
    let m1 = trend_candles(SYMBOL, 30);
    let mut batch = resample(&m1, Timeframe::M5);
    batch.extend(m1);
    let report = s.ingest(&params, batch, t0() + Duration::minutes(30));
    assert!(report.signals.is_empty());
    assert!(sink.is_empty());
}
