//! Live multi-symbol scanner.
//!
//! Each symbol owns its trackers and confluence aggregator behind a `Mutex`,
//! so one symbol's state has a single writer while different symbols are
//! processed in parallel. Only candles closed by the evaluation time are
//! ever pushed. Trackers are compacted after every pass, so history held per
//! symbol stays bounded by the ATR and volume lookbacks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use fvgscan_core::confluence::{ActiveGaps, ConfluenceAggregator, ConfluenceParams, Signal};
use fvgscan_core::data::{CandleSource, DataError};
use fvgscan_core::detector::GapTracker;
use fvgscan_core::domain::{Candle, Timeframe};
use fvgscan_core::params::{ParameterResolver, ParameterStore};
use fvgscan_core::setup::{generate, CandleContext, EquityProvider, Setup};
use fvgscan_core::sink::NotificationSink;

#[derive(Debug)]
struct SymbolState {
    trackers: BTreeMap<Timeframe, GapTracker>,
    aggregator: ConfluenceAggregator,
}

impl SymbolState {
    fn new(symbol: &str, timeframes: &[Timeframe]) -> Self {
        Self {
            trackers: timeframes
                .iter()
                .map(|tf| (*tf, GapTracker::new(symbol, *tf)))
                .collect(),
            aggregator: ConfluenceAggregator::new(symbol),
        }
    }
}

/// What one scan pass produced across all symbols.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub candles_pushed: usize,
    pub gaps_formed: usize,
    pub signals: Vec<Signal>,
    pub setups: Vec<Setup>,
    pub skipped_setups: usize,
}

impl ScanReport {
    fn merge(mut self, other: ScanReport) -> ScanReport {
        self.candles_pushed += other.candles_pushed;
        self.gaps_formed += other.gaps_formed;
        self.signals.extend(other.signals);
        self.setups.extend(other.setups);
        self.skipped_setups += other.skipped_setups;
        self
    }
}

pub struct Scanner {
    timeframes: Vec<Timeframe>,
    states: BTreeMap<String, Mutex<SymbolState>>,
    sink: Arc<dyn NotificationSink>,
    equity: Box<dyn EquityProvider + Send + Sync>,
}

impl Scanner {
    pub fn new(
        symbols: &[String],
        timeframes: &[Timeframe],
        sink: Arc<dyn NotificationSink>,
        equity: Box<dyn EquityProvider + Send + Sync>,
    ) -> Self {
        let mut timeframes = timeframes.to_vec();
        timeframes.sort();
        timeframes.dedup();
        let states = symbols
            .iter()
            .map(|s| (s.clone(), Mutex::new(SymbolState::new(s, &timeframes))))
            .collect();
        Self {
            timeframes,
            states,
            sink,
            equity,
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Feed newly available candles and evaluate confluence at `at`.
    ///
    /// Candles not yet closed at `at`, already seen, or for unknown
    /// symbols/timeframes are ignored. Symbols are processed in parallel.
    pub fn ingest(&self, params: &ParameterStore, candles: Vec<Candle>, at: DateTime<Utc>) -> ScanReport {
        let mut by_symbol: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
        for c in candles {
            if c.close_time() > at {
                continue;
            }
            if self.states.contains_key(&c.symbol) {
                by_symbol.entry(c.symbol.clone()).or_default().push(c);
            }
        }

        self.states
            .par_iter()
            .map(|(symbol, state)| {
                let batch = by_symbol.get(symbol).cloned().unwrap_or_default();
                self.scan_symbol(symbol, state, params, batch, at)
            })
            .reduce(ScanReport::default, ScanReport::merge)
    }

    /// Pull candles in `[since, at)` for every symbol and timeframe from
    /// `source` and ingest them.
    pub fn scan_source(
        &self,
        source: &dyn CandleSource,
        params: &ParameterStore,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<ScanReport, DataError> {
        let mut candles = Vec::new();
        for symbol in self.states.keys() {
            for tf in &self.timeframes {
                match source.get_candles(symbol, *tf, tf.floor(since), at) {
                    Ok(range) => candles.extend(range.candles),
                    Err(DataError::NoData { .. }) => {
                        debug!(symbol = %symbol, timeframe = %tf, "no candles to scan");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(self.ingest(params, candles, at))
    }

    fn scan_symbol(
        &self,
        symbol: &str,
        state: &Mutex<SymbolState>,
        params: &ParameterStore,
        mut batch: Vec<Candle>,
        at: DateTime<Utc>,
    ) -> ScanReport {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = ScanReport::default();
        let resolver = params.resolver();

        // Older candles first; within one instant, lower timeframes first.
        batch.sort_by_key(|c| (c.close_time(), c.timeframe));
        for candle in batch {
            let tf = candle.timeframe;
            let Some(tracker) = state.trackers.get_mut(&tf) else {
                continue;
            };
            if tracker
                .last_candle()
                .is_some_and(|last| last.open_time >= candle.open_time)
            {
                continue;
            }
            match tracker.push(candle, &resolver.resolve(symbol, tf)) {
                Ok(outcome) => {
                    report.candles_pushed += 1;
                    report.gaps_formed += outcome.formed;
                }
                Err(e) => warn!(symbol, timeframe = %tf, error = %e, "candle rejected"),
            }
        }

        let active: ActiveGaps = state
            .trackers
            .iter()
            .map(|(tf, t)| (*tf, t.active_gaps().cloned().collect::<Vec<_>>()))
            .filter(|(_, gaps)| !gaps.is_empty())
            .collect();
        let confluence_params = ConfluenceParams::resolve(&resolver, symbol, &self.timeframes);
        let signals = state.aggregator.aggregate(&active, &confluence_params, at);

        let Some(base) = self.timeframes.first().copied() else {
            compact(symbol, &mut state, &resolver);
            report.signals = signals;
            return report;
        };
        let base_params = resolver.resolve(symbol, base);
        for signal in &signals {
            let context = state
                .trackers
                .get(&base)
                .and_then(|t| CandleContext::from_candles(t.candles(), base_params.atr_period));
            let Some(context) = context else {
                report.skipped_setups += 1;
                continue;
            };
            match generate(signal, &context, &base_params, self.equity.as_ref()) {
                Ok(setup) => {
                    self.sink.notify(signal, &setup);
                    report.setups.push(setup);
                }
                Err(e) => {
                    warn!(symbol, error = %e, "setup skipped");
                    report.skipped_setups += 1;
                }
            }
        }
        if !signals.is_empty() {
            info!(symbol, signals = signals.len(), at = %at, "scan produced signals");
        }
        compact(symbol, &mut state, &resolver);
        report.signals = signals;
        report
    }
}

fn compact(symbol: &str, state: &mut SymbolState, resolver: &ParameterResolver<'_>) {
    for (tf, tracker) in state.trackers.iter_mut() {
        let keep = resolver.resolve(symbol, *tf).atr_period + 1;
        let dropped = tracker.compact(keep);
        if dropped > 0 {
            debug!(symbol, timeframe = %tf, dropped, "tracker compacted");
        }
    }
}
