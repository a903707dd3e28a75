//! FVG Scan Runner: backtesting, live scanning, metrics, config and export.
//!
//! This crate builds on `fvgscan-core` to provide:
//! - Per-symbol backtest simulation with limit entries and stop/target exits
//! - Backtest orchestration over a candle source, parallel across symbols
//! - A live scanner that routes setups to a notification sink
//! - Performance metrics
//! - TOML configuration and JSON parameter-override persistence
//! - CSV candle files, synthetic data, and JSON/CSV/Markdown artifacts

pub mod config;
pub mod csv_source;
pub mod export;
pub mod metrics;
pub mod overrides;
pub mod position;
pub mod runner;
pub mod scanner;
pub mod simulator;
pub mod synthetic;

pub use config::{ConfigError, ScanConfig};
pub use csv_source::{write_candles_csv, CsvCandleSource};
pub use metrics::PerformanceMetrics;
pub use position::{ExitReason, Position};
pub use runner::{BacktestResult, BacktestSettings, Backtester, RunError, RunStatus};
pub use scanner::{ScanReport, Scanner};
pub use simulator::{SimulationOutcome, SimulatorSettings, SymbolSimulator};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn performance_metrics_is_send_sync() {
        assert_send::<PerformanceMetrics>();
        assert_sync::<PerformanceMetrics>();
    }

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn backtester_is_sync() {
        assert_sync::<Backtester<'static>>();
    }

    #[test]
    fn scanner_is_send_sync() {
        assert_send::<Scanner>();
        assert_sync::<Scanner>();
    }

    #[test]
    fn simulator_is_send() {
        assert_send::<SymbolSimulator>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<ScanConfig>();
        assert_sync::<ScanConfig>();
        assert_send::<CsvCandleSource>();
        assert_sync::<CsvCandleSource>();
    }
}
