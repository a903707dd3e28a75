//! Artifact export and reload.

mod common;

use chrono::Duration;
use fvgscan_core::domain::Timeframe;
use fvgscan_runner::export::{
    export_json, export_positions_csv, export_signals_csv, import_json, load_artifacts,
    save_artifacts,
};
use fvgscan_runner::runner::{BacktestResult, BacktestSettings, Backtester};

use common::{t0, trend_store, two_tf_params, SYMBOL};

fn run() -> BacktestResult {
    let store = trend_store(&[SYMBOL], 120);
    let params = two_tf_params();
    let settings = BacktestSettings {
        timeframes: vec![Timeframe::M1, Timeframe::M5],
        ..Default::default()
    };
    Backtester::new(&store, &params, settings)
        .run_backtest(SYMBOL, Timeframe::M1, t0(), t0() + Duration::minutes(120), None)
        .unwrap()
}

#[test]
fn json_reload_preserves_result() {
    let result = run();
    let json = export_json(&result).unwrap();
    assert_eq!(import_json(&json).unwrap(), result);
}

#[test]
fn newer_schema_rejected() {
    let mut result = run();
    result.schema_version = 99;
    let json = export_json(&result).unwrap();
    assert!(import_json(&json).is_err());
}

#[test]
fn missing_schema_version_defaults() {
    let result = run();
    let mut value = serde_json::to_value(&result).unwrap();
    value.as_object_mut().unwrap().remove("schema_version");
    let reloaded = import_json(&value.to_string()).unwrap();
    assert_eq!(reloaded.schema_version, 1);
}

#[test]
fn csv_has_one_row_per_record() {
    let result = run();
    let positions = export_positions_csv(&result.positions).unwrap();
    assert_eq!(positions.lines().count(), result.positions.len() + 1);
    assert!(positions.starts_with("symbol,direction,signal_id"));
    assert!(positions.contains("take_profit"));

    let signals = export_signals_csv(&result.signals).unwrap();
    assert_eq!(signals.lines().count(), result.signals.len() + 1);
    assert!(signals.contains("1m|5m"));
}

#[test]
fn artifacts_saved_and_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let result = run();
    let run_dir = save_artifacts(&result, dir.path()).unwrap();
    assert!(run_dir.join("manifest.json").exists());
    assert!(run_dir.join("positions.csv").exists());
    assert!(run_dir.join("signals.csv").exists());
    let report = std::fs::read_to_string(run_dir.join("report.md")).unwrap();
    assert!(report.contains("# Backtest Report"));
    assert!(report.contains(SYMBOL));
    assert_eq!(load_artifacts(&run_dir).unwrap(), result);
}
