//! Backtest runner: wires together candle source, parameters, simulator and metrics.
//!
//! Two entry points:
//! - `Backtester::run_backtest()`: one symbol over `[start, end)`.
//! - `Backtester::run_backtests()`: many symbols, one rayon task per symbol.
//!
//! Missing candles never abort a run: the replay stops at the first missing
//! bar on any timeframe and the result is marked `Partial`.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use fvgscan_core::confluence::Signal;
use fvgscan_core::data::{CandleSource, DataError, MissingRange};
use fvgscan_core::detector::SequenceError;
use fvgscan_core::domain::{Candle, RunId, Timeframe, DEFAULT_TIMEFRAMES};
use fvgscan_core::params::{ParamError, ParameterSet, ParameterStore, PartialParameterSet};
use fvgscan_core::setup::Setup;

use crate::metrics::{PerformanceMetrics, DEFAULT_ANNUALIZATION};
use crate::position::Position;
use crate::simulator::{SimError, SimulatorSettings, SymbolSimulator};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid backtest window: start {start} is not before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("parameter error: {0}")]
    Params(#[from] ParamError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("candle sequence error: {0}")]
    Sequence(#[from] SequenceError),
    #[error("run cancelled")]
    Cancelled,
}

impl From<SimError> for RunError {
    fn from(e: SimError) -> Self {
        match e {
            SimError::Sequence(e) => RunError::Sequence(e),
            SimError::Cancelled => RunError::Cancelled,
        }
    }
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Whether the whole requested window was replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    /// Replay stopped at the first missing bar; see `data_gaps`.
    Partial,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub symbol: String,
    pub base_timeframe: Timeframe,
    pub timeframes: Vec<Timeframe>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Effective parameters per timeframe, overlay included.
    pub parameters: BTreeMap<Timeframe, ParameterSet>,
    pub initial_capital: f64,
    pub positions: Vec<Position>,
    pub signals: Vec<Signal>,
    pub setups: Vec<Setup>,
    pub skipped_setups: usize,
    pub metrics: PerformanceMetrics,
    pub status: RunStatus,
    pub data_gaps: Vec<MissingRange>,
    pub open_position_discarded: bool,
    pub bars_processed: usize,
    pub dataset_hash: String,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Account and replay settings shared by every run of a `Backtester`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSettings {
    pub initial_capital: f64,
    pub pending_entry_bars: Option<usize>,
    pub annualization: f64,
    /// Timeframes taking part in confluence. Those below the base are ignored.
    pub timeframes: Vec<Timeframe>,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            pending_entry_bars: None,
            annualization: DEFAULT_ANNUALIZATION,
            timeframes: DEFAULT_TIMEFRAMES.to_vec(),
        }
    }
}

pub struct Backtester<'a> {
    source: &'a dyn CandleSource,
    params: &'a ParameterStore,
    settings: BacktestSettings,
}

impl<'a> Backtester<'a> {
    pub fn new(
        source: &'a dyn CandleSource,
        params: &'a ParameterStore,
        settings: BacktestSettings,
    ) -> Self {
        Self {
            source,
            params,
            settings,
        }
    }

    pub fn settings(&self) -> &BacktestSettings {
        &self.settings
    }

    /// Replay `symbol` on base `timeframe` over `[start, end)`.
    ///
    /// `params_override` is layered on top of every resolved parameter set
    /// for this run only; the store is not modified.
    pub fn run_backtest(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        params_override: Option<&PartialParameterSet>,
    ) -> Result<BacktestResult, RunError> {
        self.run_with_cancel(symbol, timeframe, start, end, params_override, None)
    }

    /// Like `run_backtest`, checking `cancel` between bars.
    pub fn run_with_cancel(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        params_override: Option<&PartialParameterSet>,
        cancel: Option<&AtomicBool>,
    ) -> Result<BacktestResult, RunError> {
        if start >= end {
            return Err(RunError::InvalidWindow { start, end });
        }
        let mut resolver = self.params.resolver();
        if let Some(overlay) = params_override {
            overlay.validate()?;
            resolver = resolver.with_overlay(overlay);
        }

        // ─── Load ───
        let mut series: BTreeMap<Timeframe, Vec<Candle>> = BTreeMap::new();
        let mut data_gaps: Vec<MissingRange> = Vec::new();
        for tf in self.timeframes_for(timeframe) {
            // Higher-timeframe candles still open at `end` are never visible.
            let tf_end = if tf == timeframe { end } else { tf.floor(end) };
            let range = match self.source.get_candles(symbol, tf, tf.floor(start), tf_end) {
                Ok(range) => range,
                Err(DataError::NoData { .. }) if tf != timeframe => {
                    warn!(symbol, timeframe = %tf, "no candles, timeframe left out of confluence");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if tf != timeframe && range.candles.is_empty() {
                warn!(symbol, timeframe = %tf, "no candles in window, timeframe left out of confluence");
                continue;
            }
            data_gaps.extend(range.missing);
            series.insert(tf, range.candles);
        }
        let timeframes: Vec<Timeframe> = series.keys().copied().collect();
        let parameters: BTreeMap<Timeframe, ParameterSet> = timeframes
            .iter()
            .map(|tf| (*tf, resolver.resolve(symbol, *tf)))
            .collect();
        if series.get(&timeframe).map_or(true, |c| c.is_empty()) {
            return Err(DataError::NoData {
                symbol: symbol.to_string(),
                timeframe,
            }
            .into());
        }

        let status = if data_gaps.is_empty() {
            RunStatus::Complete
        } else {
            let (replay_from, cutoff) = complete_span(&series, &data_gaps);
            warn!(
                symbol,
                ranges = data_gaps.len(),
                from = ?replay_from,
                cutoff = ?cutoff,
                "missing candles, replaying the complete span only"
            );
            for candles in series.values_mut() {
                candles.retain(|c| {
                    replay_from.map_or(true, |from| c.open_time >= from)
                        && cutoff.map_or(true, |cut| c.close_time() <= cut)
                });
            }
            RunStatus::Partial
        };
        let dataset_hash = compute_dataset_hash(&series);

        // ─── Replay ───
        let mut sim = SymbolSimulator::new(
            symbol,
            timeframe,
            &timeframes,
            &resolver,
            SimulatorSettings {
                initial_capital: self.settings.initial_capital,
                pending_entry_bars: self.settings.pending_entry_bars,
            },
        );
        sim.run(&series, cancel)?;
        let outcome = sim.finish();

        let metrics = PerformanceMetrics::compute(
            &outcome.positions,
            self.settings.initial_capital,
            self.settings.annualization,
        );
        let run_id = compute_run_id(
            symbol,
            timeframe,
            &timeframes,
            start,
            end,
            &parameters,
            &self.settings,
            &dataset_hash,
        );

        info!(
            symbol,
            timeframe = %timeframe,
            bars = outcome.bars_processed,
            signals = outcome.signals.len(),
            trades = outcome.positions.len(),
            total_pnl = metrics.total_pnl,
            status = ?status,
            "backtest finished"
        );

        Ok(BacktestResult {
            schema_version: SCHEMA_VERSION,
            run_id,
            symbol: symbol.to_string(),
            base_timeframe: timeframe,
            timeframes,
            start,
            end,
            parameters,
            initial_capital: self.settings.initial_capital,
            positions: outcome.positions,
            signals: outcome.signals,
            setups: outcome.setups,
            skipped_setups: outcome.skipped_setups,
            metrics,
            status,
            data_gaps,
            open_position_discarded: outcome.open_position_discarded,
            bars_processed: outcome.bars_processed,
            dataset_hash,
        })
    }

    /// Backtest every symbol independently, in parallel.
    ///
    /// Results keep the order of `symbols`; one symbol's failure does not
    /// affect the others.
    pub fn run_backtests(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        params_override: Option<&PartialParameterSet>,
    ) -> Vec<(String, Result<BacktestResult, RunError>)> {
        symbols
            .par_iter()
            .map(|symbol| {
                let result = self.run_backtest(symbol, timeframe, start, end, params_override);
                (symbol.clone(), result)
            })
            .collect()
    }

    fn timeframes_for(&self, base: Timeframe) -> Vec<Timeframe> {
        let mut tfs: Vec<Timeframe> = self
            .settings
            .timeframes
            .iter()
            .copied()
            .filter(|tf| *tf >= base)
            .collect();
        tfs.push(base);
        tfs.sort();
        tfs.dedup();
        tfs
    }
}

/// Bounds of the complete span around missing ranges.
///
/// A range ending at or before its timeframe's first candle precedes the data
/// and only moves the replay start forward. Any other range cuts the replay at
/// its start.
fn complete_span(
    series: &BTreeMap<Timeframe, Vec<Candle>>,
    gaps: &[MissingRange],
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let leading = |g: &MissingRange| {
        series
            .get(&g.timeframe)
            .and_then(|c| c.first())
            .map_or(false, |first| g.end <= first.open_time)
    };
    let replay_from = gaps.iter().filter(|g| leading(g)).map(|g| g.end).max();
    let cutoff = gaps.iter().filter(|g| !leading(g)).map(|g| g.start).min();
    (replay_from, cutoff)
}

/// Deterministic BLAKE3 hash over every replayed candle, in timeframe order.
fn compute_dataset_hash(series: &BTreeMap<Timeframe, Vec<Candle>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (tf, candles) in series {
        hasher.update(tf.as_str().as_bytes());
        for c in candles {
            hasher.update(&c.open_time.timestamp().to_le_bytes());
            hasher.update(&c.open.to_le_bytes());
            hasher.update(&c.high.to_le_bytes());
            hasher.update(&c.low.to_le_bytes());
            hasher.update(&c.close.to_le_bytes());
            hasher.update(&c.volume.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Serialize)]
struct RunFingerprint<'a> {
    symbol: &'a str,
    base_timeframe: Timeframe,
    timeframes: &'a [Timeframe],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    parameters: &'a BTreeMap<Timeframe, ParameterSet>,
    settings: &'a BacktestSettings,
}

#[allow(clippy::too_many_arguments)]
fn compute_run_id(
    symbol: &str,
    base_timeframe: Timeframe,
    timeframes: &[Timeframe],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    parameters: &BTreeMap<Timeframe, ParameterSet>,
    settings: &BacktestSettings,
    dataset_hash: &str,
) -> RunId {
    let fingerprint = RunFingerprint {
        symbol,
        base_timeframe,
        timeframes,
        start,
        end,
        parameters,
        settings,
    };
    // Serializing plain structs and BTreeMaps cannot fail.
    let json = serde_json::to_string(&fingerprint).unwrap_or_default();
    let mut bytes = json.into_bytes();
    bytes.extend_from_slice(dataset_hash.as_bytes());
    RunId::from_bytes(&bytes)
}
