//! Incremental gap tracking over an append-only candle arena.

use super::gap::{FillState, Gap};
use crate::domain::{Candle, Direction, Timeframe};
use crate::indicators::{average_volume_before, VOLUME_LOOKBACK};
use crate::params::ParameterSet;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// A candle that does not belong at the end of the tracked partition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequenceError {
    #[error("candle for {got_symbol} {got_timeframe} pushed into {symbol} {timeframe} tracker")]
    WrongPartition {
        symbol: String,
        timeframe: Timeframe,
        got_symbol: String,
        got_timeframe: Timeframe,
    },

    #[error("candle at {got} is not after the last candle at {last}")]
    NotIncreasing {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

/// What a single `push` changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    pub formed: usize,
    pub filled: usize,
    pub expired: usize,
}

/// Fewest candles `compact` keeps: the volume window plus one triple.
pub const MIN_RETAINED_CANDLES: usize = VOLUME_LOOKBACK + 3;

/// Per (symbol, timeframe) detector state.
///
/// Candles and gaps are only ever appended; `cursor` indexes the first gap
/// that may still change, so each push touches only live gaps. Long-lived
/// trackers call `compact` to release history; `offset` keeps gap indices
/// absolute across it.
#[derive(Debug, Clone)]
pub struct GapTracker {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
    gaps: Vec<Gap>,
    cursor: usize,
    offset: usize,
}

impl GapTracker {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles: Vec::new(),
            gaps: Vec::new(),
            cursor: 0,
            offset: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Retained candles, oldest first. Every candle seen unless compacted.
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Retained gaps in formation order, with current state. Every gap ever
    /// detected unless compacted.
    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// Candles pushed since creation, including compacted ones.
    pub fn total_candles(&self) -> usize {
        self.offset + self.candles.len()
    }

    /// Release history: keep the newest `keep` candles (at least
    /// `MIN_RETAINED_CANDLES`) and drop gaps that can no longer change.
    /// Returns the number of candles dropped.
    pub fn compact(&mut self, keep: usize) -> usize {
        let keep = keep.max(MIN_RETAINED_CANDLES);
        let dropped = self.candles.len().saturating_sub(keep);
        self.candles.drain(..dropped);
        self.offset += dropped;
        self.gaps.drain(..self.cursor);
        self.cursor = 0;
        dropped
    }

    pub fn last_candle(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn active_gaps(&self) -> impl Iterator<Item = &Gap> {
        self.gaps[self.cursor..].iter().filter(|g| g.is_active())
    }

    /// Most recently formed active gap in `direction`.
    pub fn latest_active(&self, direction: Direction) -> Option<&Gap> {
        self.active_gaps()
            .filter(|g| g.direction == direction)
            .max_by_key(|g| g.start_index)
    }

    /// Append the next closed candle: age and fill existing gaps, then test
    /// the newly completed triple.
    pub fn push(
        &mut self,
        candle: Candle,
        params: &ParameterSet,
    ) -> Result<PushOutcome, SequenceError> {
        if candle.symbol != self.symbol || candle.timeframe != self.timeframe {
            return Err(SequenceError::WrongPartition {
                symbol: self.symbol.clone(),
                timeframe: self.timeframe,
                got_symbol: candle.symbol,
                got_timeframe: candle.timeframe,
            });
        }
        if let Some(last) = self.candles.last() {
            if candle.open_time <= last.open_time {
                return Err(SequenceError::NotIncreasing {
                    last: last.open_time,
                    got: candle.open_time,
                });
            }
        }

        let mut outcome = PushOutcome::default();

        // ─── Update existing gaps ───
        for gap in &mut self.gaps[self.cursor..] {
            if !gap.is_active() {
                continue;
            }
            gap.observe(&candle, params.max_gap_age);
            if gap.fill == FillState::Filled {
                outcome.filled += 1;
            } else if gap.expired {
                outcome.expired += 1;
            }
        }
        while self.cursor < self.gaps.len() && !self.gaps[self.cursor].is_active() {
            self.cursor += 1;
        }

        self.candles.push(candle);

        // ─── Scan the new triple ───
        if let Some(gap) = self.scan_latest(params) {
            debug!(
                symbol = %gap.symbol,
                timeframe = %gap.timeframe,
                direction = %gap.direction,
                lower = gap.lower,
                upper = gap.upper,
                size_percent = gap.size_percent,
                volume_confirmed = ?gap.volume_confirmed,
                "gap formed"
            );
            self.gaps.push(gap);
            outcome.formed += 1;
        }

        Ok(outcome)
    }

    fn scan_latest(&self, params: &ParameterSet) -> Option<Gap> {
        let n = self.candles.len();
        if n < 3 {
            return None;
        }
        let start = n - 3;
        let first = &self.candles[start];
        let middle = &self.candles[start + 1];
        let third = &self.candles[start + 2];

        let (direction, lower, upper) = Gap::bounds(first, third)?;
        let size_percent = (upper - lower) / lower * 100.0;
        if !size_percent.is_finite() || size_percent < params.min_gap_percent {
            return None;
        }

        let volume_confirmed = params.volume_confirmation.then(|| {
            average_volume_before(&self.candles, start + 1, VOLUME_LOOKBACK)
                .is_some_and(|avg| middle.volume > avg * params.volume_multiplier)
        });

        Some(Gap {
            id: Gap::id_for(&self.symbol, self.timeframe, direction, third.open_time),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            direction,
            start_index: self.offset + start,
            upper,
            lower,
            size_percent,
            formed_at: third.open_time,
            confirmed_at: third.close_time(),
            age: 0,
            fill: FillState::Open,
            expired: false,
            volume_confirmed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_candles, make_ohlc_candles};

    fn no_volume_params() -> ParameterSet {
        ParameterSet {
            volume_confirmation: false,
            ..Default::default()
        }
    }

    #[test]
    fn push_detects_on_third_candle() {
        let candles = make_ohlc_candles(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 104.0, 100.5, 103.5),
            (103.5, 105.0, 102.0, 104.5),
        ]);
        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        let params = no_volume_params();
        assert_eq!(tracker.push(candles[0].clone(), &params).unwrap().formed, 0);
        assert_eq!(tracker.push(candles[1].clone(), &params).unwrap().formed, 0);
        assert_eq!(tracker.push(candles[2].clone(), &params).unwrap().formed, 1);
        let gap = &tracker.gaps()[0];
        assert_eq!(gap.volume_confirmed, None);
        assert_eq!(gap.formed_at, candles[2].open_time);
        assert_eq!(tracker.latest_active(Direction::Bullish), Some(gap));
        assert_eq!(tracker.latest_active(Direction::Bearish), None);
    }

    #[test]
    fn rejects_out_of_order_candle() {
        let candles = make_candles(&[100.0, 101.0]);
        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        let params = ParameterSet::default();
        tracker.push(candles[1].clone(), &params).unwrap();
        let err = tracker.push(candles[0].clone(), &params).unwrap_err();
        assert!(matches!(err, SequenceError::NotIncreasing { .. }));
        assert_eq!(tracker.candles().len(), 1);
    }

    #[test]
    fn rejects_foreign_partition() {
        let mut candle = make_candles(&[100.0])[0].clone();
        candle.timeframe = Timeframe::M5;
        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        let err = tracker.push(candle, &ParameterSet::default()).unwrap_err();
        assert!(matches!(err, SequenceError::WrongPartition { .. }));
    }

    #[test]
    fn volume_flag_set_when_enabled() {
        let mut candles = make_ohlc_candles(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 104.0, 100.5, 103.5),
            (103.5, 105.0, 102.0, 104.5),
        ]);
        candles[2].volume = 5000.0;
        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        let params = ParameterSet::default();
        for c in candles.iter().cloned() {
            tracker.push(c, &params).unwrap();
        }
        let gap = tracker.gaps().last().unwrap();
        assert_eq!(gap.volume_confirmed, Some(true));

        let strict = ParameterSet {
            volume_multiplier: 10.0,
            ..Default::default()
        };
        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        for c in candles {
            tracker.push(c, &strict).unwrap();
        }
        // Unconfirmed gaps are still recorded.
        let gap = tracker.gaps().last().unwrap();
        assert_eq!(gap.volume_confirmed, Some(false));
    }

    #[test]
    fn compaction_bounds_memory_and_keeps_detection() {
        let closes: Vec<f64> = (0..200).map(|i| 100.0 + i as f64).collect();
        let mut candles = make_candles(&closes);
        for c in &mut candles {
            c.high = c.close + 0.2;
            c.low = c.close - 1.0;
        }
        let params = ParameterSet {
            volume_confirmation: false,
            max_gap_age: 5,
            ..Default::default()
        };
        let batch = crate::detector::detect(&candles, &params).unwrap();

        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        for c in candles.iter().cloned() {
            tracker.push(c, &params).unwrap();
            tracker.compact(30);
            assert!(tracker.candles().len() <= 30);
            assert!(tracker.gaps().len() <= params.max_gap_age + 2);
        }
        assert_eq!(tracker.total_candles(), 200);
        assert_eq!(tracker.last_candle(), candles.last());

        // Retained gaps match the batch detector, absolute indices included.
        let retained = &batch[batch.len() - tracker.gaps().len()..];
        assert_eq!(tracker.gaps(), retained);
        assert_eq!(
            tracker.active_gaps().collect::<Vec<_>>(),
            batch.iter().filter(|g| g.is_active()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn compaction_keeps_volume_window() {
        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        let candles = make_candles(&(0..50).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        for c in candles {
            tracker.push(c, &ParameterSet::default()).unwrap();
        }
        assert_eq!(tracker.compact(3), 50 - MIN_RETAINED_CANDLES);
        assert_eq!(tracker.candles().len(), MIN_RETAINED_CANDLES);
    }

    #[test]
    fn cursor_skips_dead_gaps() {
        let candles = make_ohlc_candles(&[
            (100.0, 101.0, 99.0, 100.5),
            (100.5, 104.0, 100.5, 103.5),
            (103.5, 105.0, 102.0, 104.5),
            (104.5, 104.6, 100.0, 100.2), // fills the gap
        ]);
        let mut tracker = GapTracker::new("TEST", Timeframe::M1);
        let params = no_volume_params();
        let mut filled = 0;
        for c in candles {
            filled += tracker.push(c, &params).unwrap().filled;
        }
        assert_eq!(filled, 1);
        assert_eq!(tracker.gaps().len(), 1);
        assert_eq!(tracker.active_gaps().count(), 0);
    }
}
