//! Per-symbol backtest simulator.
//!
//! State machine: `Idle → AwaitingEntry → InPosition → Idle`.
//!
//! Each base bar runs four phases in order:
//! 1. Position management on the new bar (entry fill, pending expiry, exits)
//! 2. Detection: the base candle and every higher-timeframe candle that has
//!    closed by the base bar's close time are pushed into their trackers
//! 3. Confluence aggregation at the base bar's close time
//! 4. Setup generation for new signals when flat
//!
//! Phase 1 runs before the bar is visible to detection, so a setup created
//! at the close of bar t can fill no earlier than bar t+1. A bar that fills
//! the entry and also reaches the stop exits at the stop on that bar; its
//! target side is not taken.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use fvgscan_core::confluence::{ActiveGaps, ConfluenceAggregator, ConfluenceParams, Signal};
use fvgscan_core::detector::{GapTracker, SequenceError};
use fvgscan_core::domain::{Candle, Direction, Timeframe};
use fvgscan_core::params::{ParameterResolver, ParameterSet};
use fvgscan_core::setup::{generate, CandleContext, EquityProvider, Setup};

use crate::position::{realized_pnl, ExitReason, Position};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("candle sequence error: {0}")]
    Sequence(#[from] SequenceError),
    #[error("run cancelled")]
    Cancelled,
}

/// Account and order settings for one simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorSettings {
    pub initial_capital: f64,
    /// Bars a setup may wait for its entry. `None` uses the base timeframe's
    /// `max_gap_age`.
    pub pending_entry_bars: Option<usize>,
}

#[derive(Debug, Clone)]
struct OpenPosition {
    setup: Setup,
    entry_time: DateTime<Utc>,
    entry_index: usize,
    equity_at_entry: f64,
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    AwaitingEntry { setup: Setup, bars_waited: usize },
    InPosition(OpenPosition),
}

/// Everything a finished simulation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutcome {
    pub positions: Vec<Position>,
    pub signals: Vec<Signal>,
    pub setups: Vec<Setup>,
    pub skipped_setups: usize,
    pub bars_processed: usize,
    /// A position was still open when data ran out and was discarded.
    pub open_position_discarded: bool,
}

/// Exit triggered by `bar` for an open setup, if any.
///
/// Stop is checked before target: a bar touching both exits at the stop.
/// A stop that the bar opens through fills at the open; a target fills at
/// the target price.
pub fn exit_for(setup: &Setup, bar: &Candle) -> Option<(ExitReason, f64)> {
    match setup.direction {
        Direction::Bullish => {
            if bar.low <= setup.stop_loss {
                Some((ExitReason::StopLoss, bar.open.min(setup.stop_loss)))
            } else if bar.high >= setup.take_profit {
                Some((ExitReason::TakeProfit, setup.take_profit))
            } else {
                None
            }
        }
        Direction::Bearish => {
            if bar.high >= setup.stop_loss {
                Some((ExitReason::StopLoss, bar.open.max(setup.stop_loss)))
            } else if bar.low <= setup.take_profit {
                Some((ExitReason::TakeProfit, setup.take_profit))
            } else {
                None
            }
        }
    }
}

fn stop_touched(setup: &Setup, bar: &Candle) -> bool {
    match setup.direction {
        Direction::Bullish => bar.low <= setup.stop_loss,
        Direction::Bearish => bar.high >= setup.stop_loss,
    }
}

pub struct SymbolSimulator {
    symbol: String,
    base: Timeframe,
    params: BTreeMap<Timeframe, ParameterSet>,
    confluence_params: ConfluenceParams,
    trackers: BTreeMap<Timeframe, GapTracker>,
    aggregator: ConfluenceAggregator,
    settings: SimulatorSettings,
    state: State,
    realized_pnl: f64,
    bar_index: usize,
    positions: Vec<Position>,
    signals: Vec<Signal>,
    setups: Vec<Setup>,
    skipped_setups: usize,
}

impl EquityProvider for SymbolSimulator {
    fn get_equity(&self) -> f64 {
        self.settings.initial_capital + self.realized_pnl
    }
}

impl SymbolSimulator {
    /// `timeframes` must include `base`; parameters are resolved once up front.
    pub fn new(
        symbol: impl Into<String>,
        base: Timeframe,
        timeframes: &[Timeframe],
        resolver: &ParameterResolver<'_>,
        settings: SimulatorSettings,
    ) -> Self {
        let symbol = symbol.into();
        let mut tfs: Vec<Timeframe> = timeframes.to_vec();
        if !tfs.contains(&base) {
            tfs.push(base);
        }
        tfs.sort();
        tfs.dedup();

        let params = tfs
            .iter()
            .map(|tf| (*tf, resolver.resolve(&symbol, *tf)))
            .collect();
        let trackers = tfs
            .iter()
            .map(|tf| (*tf, GapTracker::new(symbol.clone(), *tf)))
            .collect();
        Self {
            confluence_params: ConfluenceParams::resolve(resolver, &symbol, &tfs),
            aggregator: ConfluenceAggregator::new(symbol.clone()),
            symbol,
            base,
            params,
            trackers,
            settings,
            state: State::Idle,
            realized_pnl: 0.0,
            bar_index: 0,
            positions: Vec::new(),
            signals: Vec::new(),
            setups: Vec::new(),
            skipped_setups: 0,
        }
    }

    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.trackers.keys().copied().collect()
    }

    fn base_params(&self) -> ParameterSet {
        self.params.get(&self.base).cloned().unwrap_or_default()
    }

    fn pending_limit(&self) -> usize {
        self.settings
            .pending_entry_bars
            .unwrap_or_else(|| self.base_params().max_gap_age)
            .max(1)
    }

    /// Replay every series bar by bar, joined on the base timeframe's close time.
    ///
    /// `series` holds one ordered candle list per timeframe. Timeframes below
    /// the base or absent from the simulator are ignored.
    pub fn run(
        &mut self,
        series: &BTreeMap<Timeframe, Vec<Candle>>,
        cancel: Option<&AtomicBool>,
    ) -> Result<(), SimError> {
        let Some(base_series) = series.get(&self.base) else {
            return Ok(());
        };
        let mut cursors: BTreeMap<Timeframe, usize> = self
            .trackers
            .keys()
            .filter(|tf| **tf > self.base)
            .map(|tf| (*tf, 0))
            .collect();

        for bar in base_series {
            if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                return Err(SimError::Cancelled);
            }
            let close = bar.close_time();
            let mut visible: Vec<Candle> = Vec::new();
            for (tf, cursor) in cursors.iter_mut() {
                let Some(candles) = series.get(tf) else {
                    continue;
                };
                while *cursor < candles.len() && candles[*cursor].close_time() <= close {
                    visible.push(candles[*cursor].clone());
                    *cursor += 1;
                }
            }
            self.step(bar, &visible)?;
        }
        Ok(())
    }

    /// Process one base bar plus the higher-timeframe candles that closed with it.
    pub fn step(&mut self, bar: &Candle, higher: &[Candle]) -> Result<(), SimError> {
        // ─── Phase 1: Position management ───
        self.manage(bar);

        // ─── Phase 2: Detection ───
        self.push(bar.clone())?;
        for candle in higher {
            self.push(candle.clone())?;
        }

        // ─── Phase 3: Confluence ───
        let active: ActiveGaps = self
            .trackers
            .iter()
            .map(|(tf, t)| (*tf, t.active_gaps().cloned().collect::<Vec<_>>()))
            .filter(|(_, gaps)| !gaps.is_empty())
            .collect();
        let signals =
            self.aggregator
                .aggregate(&active, &self.confluence_params, bar.close_time());

        // ─── Phase 4: Setups ───
        for signal in signals {
            self.on_signal(&signal);
            self.signals.push(signal);
        }

        self.bar_index += 1;
        Ok(())
    }

    fn push(&mut self, candle: Candle) -> Result<(), SequenceError> {
        let tf = candle.timeframe;
        let params = self.params.get(&tf).cloned().unwrap_or_default();
        if let Some(tracker) = self.trackers.get_mut(&tf) {
            tracker.push(candle, &params)?;
        }
        Ok(())
    }

    fn manage(&mut self, bar: &Candle) {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {}
            State::AwaitingEntry { setup, bars_waited } => {
                if bar.contains(setup.entry) {
                    debug!(
                        symbol = %self.symbol,
                        direction = %setup.direction,
                        entry = setup.entry,
                        at = %bar.open_time,
                        "entry filled"
                    );
                    let open = OpenPosition {
                        entry_time: bar.open_time,
                        entry_index: self.bar_index,
                        equity_at_entry: self.get_equity(),
                        setup,
                    };
                    if stop_touched(&open.setup, bar) {
                        let stop = open.setup.stop_loss;
                        self.close(open, bar, ExitReason::StopLoss, stop);
                    } else {
                        self.state = State::InPosition(open);
                    }
                } else if bars_waited + 1 >= self.pending_limit() {
                    debug!(symbol = %self.symbol, waited = bars_waited + 1, "pending setup expired");
                } else {
                    self.state = State::AwaitingEntry {
                        setup,
                        bars_waited: bars_waited + 1,
                    };
                }
            }
            State::InPosition(open) => match exit_for(&open.setup, bar) {
                Some((reason, price)) => self.close(open, bar, reason, price),
                None => self.state = State::InPosition(open),
            },
        }
    }

    fn close(&mut self, open: OpenPosition, bar: &Candle, reason: ExitReason, price: f64) {
        let setup = open.setup;
        let pnl = realized_pnl(setup.direction, setup.entry, price, setup.position_size);
        self.realized_pnl += pnl;
        debug!(
            symbol = %self.symbol,
            reason = %reason,
            exit = price,
            pnl,
            "position closed"
        );
        self.positions.push(Position {
            symbol: setup.symbol,
            direction: setup.direction,
            signal_id: setup.signal_id,
            entry_time: open.entry_time,
            entry_price: setup.entry,
            stop_loss: setup.stop_loss,
            take_profit: setup.take_profit,
            size: setup.position_size,
            exit_time: bar.open_time,
            exit_price: price,
            exit_reason: reason,
            pnl,
            return_pct: pnl / open.equity_at_entry,
            equity_at_entry: open.equity_at_entry,
            bars_held: self.bar_index - open.entry_index,
        });
    }

    fn on_signal(&mut self, signal: &Signal) {
        if !matches!(self.state, State::Idle) {
            debug!(symbol = %self.symbol, id = signal.id.short(), "already engaged, signal not traded");
            return;
        }
        let params = self.base_params();
        let Some(context) = self
            .trackers
            .get(&self.base)
            .and_then(|t| CandleContext::from_candles(t.candles(), params.atr_period))
        else {
            return;
        };
        match generate(signal, &context, &params, &*self) {
            Ok(setup) => {
                self.setups.push(setup.clone());
                self.state = State::AwaitingEntry {
                    setup,
                    bars_waited: 0,
                };
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "setup skipped");
                self.skipped_setups += 1;
            }
        }
    }

    pub fn finish(self) -> SimulationOutcome {
        let open_position_discarded = matches!(self.state, State::InPosition(_));
        if open_position_discarded {
            debug!(symbol = %self.symbol, "discarding open position at end of data");
        }
        SimulationOutcome {
            positions: self.positions,
            signals: self.signals,
            setups: self.setups,
            skipped_setups: self.skipped_setups,
            bars_processed: self.bar_index,
            open_position_discarded,
        }
    }
}
